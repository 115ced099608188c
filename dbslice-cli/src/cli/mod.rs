//! Command-line interface

pub mod commands;

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use crate::api::SliceClient;
use crate::config::{self, Config};

use commands::CommandContext;

#[derive(Parser)]
#[command(
    name = "dbslice-cli",
    version,
    about = "Export filtered, referentially-consistent slices of a relational database"
)]
pub struct Cli {
    /// Service base URL (overrides config and DBSLICE_URL)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Target dataset (overrides config and DBSLICE_DATASET)
    #[arg(long, global = true)]
    pub dataset: Option<String>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a root table's dependency tree and dry-run the export
    Preview(commands::preview::PreviewArgs),
    /// Preview and, if the slice fits the row ceiling, commit the export
    Export(commands::export::ExportArgs),
    /// Closure-select whole tables and export them without row filters
    Bulk(commands::bulk::BulkArgs),
    /// List exportable tables, or show one table's columns and foreign keys
    Tables(commands::tables::TablesArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

pub async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(url) = &cli.url {
        config.service_url = url.clone();
    }
    if let Some(dataset) = &cli.dataset {
        config.dataset = dataset.clone();
    }
    config::init_global(config.clone());

    let client = SliceClient::new(&config.service_url, Duration::from_secs(config.timeout_secs))?;
    let ctx = CommandContext {
        client,
        format: cli.format,
    };

    match cli.command {
        Commands::Preview(args) => commands::preview::handle(&ctx, args).await,
        Commands::Export(args) => commands::export::handle(&ctx, args).await,
        Commands::Bulk(args) => commands::bulk::handle(&ctx, args).await,
        Commands::Tables(args) => commands::tables::handle(&ctx, args).await,
    }
}
