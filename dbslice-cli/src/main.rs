//! dbslice-cli — export filtered, referentially-consistent slices of a
//! relational database by walking a root table's foreign-key dependency
//! tree and negotiating the download with the export service.

mod api;
mod cli;
mod config;
mod engine;

use anyhow::Result;
use clap::Parser;
use is_terminal::IsTerminal;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = cli::Cli::parse();
    if cli.no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    cli::run(cli).await
}
