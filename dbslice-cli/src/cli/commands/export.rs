//! `export` — preview, then commit if the slice fits

use std::fs::{self, OpenOptions};
use std::io::Write;

use anyhow::{Context, Result, bail};
use colored::*;

use crate::api::models::DownloadResponse;
use crate::cli::OutputFormat;
use crate::config::Config;
use crate::engine::DownloadTarget;

use super::{CommandContext, SliceArgs, escalate_until_fit, prepare_slice, print_download_response};

#[derive(clap::Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub slice: SliceArgs,
}

pub async fn handle(ctx: &CommandContext, args: ExportArgs) -> Result<()> {
    let (resolver, mut negotiator) = prepare_slice(ctx, &args.slice).await?;
    let target = DownloadTarget::tree(
        resolver
            .tree()
            .expect("tree was resolved by prepare_slice")
            .clone(),
    );

    negotiator.preview(&ctx.client, &target).await?;
    if args.slice.escalate {
        escalate_until_fit(ctx, &mut negotiator, &target).await?;
    }

    if !negotiator.can_commit() {
        match negotiator.warning() {
            Some(warning) => bail!("{warning} (re-run with --escalate or a higher --max-rows)"),
            None => bail!("nothing to export: the preview selected no rows"),
        }
    }

    let response = negotiator.commit(&ctx.client, &target).await?;
    append_history(&args.slice.root, &response)?;

    if ctx.format == OutputFormat::Table {
        println!(
            "{}",
            format!("export committed: {} rows", response.row_count)
                .green()
                .bold()
        );
    }
    print_download_response(&response, ctx.format)
}

/// One line per committed export, for `history.log` next to the config.
fn append_history(root: &str, response: &DownloadResponse) -> Result<()> {
    fs::create_dir_all(Config::config_dir()).context("Failed to create config directory")?;
    let line = format!(
        "{} dataset={} root={} rows={} skipped={}\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        crate::config::global().dataset,
        root,
        response.row_count,
        response.rows_skipped,
    );
    OpenOptions::new()
        .append(true)
        .create(true)
        .open(Config::history_path())
        .context("Failed to open export history")?
        .write_all(line.as_bytes())
        .context("Failed to append export history")
}
