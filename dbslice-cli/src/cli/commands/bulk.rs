//! `bulk` — closure-select whole tables and export them without filters

use anyhow::{Result, bail};
use clap::ValueEnum;
use colored::*;

use crate::api::SliceApi;
use crate::api::models::TableInfo;
use crate::cli::OutputFormat;
use crate::engine::{
    BulkMode, BulkSelection, DownloadNegotiator, DownloadTarget, StatusEvent, TableName,
};

use super::{CommandContext, escalate_until_fit, print_download_response};

#[derive(clap::Args)]
pub struct BulkArgs {
    /// Table to select; its transitive dependencies come along (repeatable)
    #[arg(long = "table", value_name = "TABLE", required = true)]
    pub tables: Vec<String>,

    /// Drop exactly this table from the selection afterwards; tables it
    /// pulled in stay selected (repeatable)
    #[arg(long = "except", value_name = "TABLE")]
    pub except: Vec<String>,

    /// Bulk endpoint to export through
    #[arg(long, value_enum, default_value_t = BulkModeArg::Bulk)]
    pub mode: BulkModeArg,

    /// Starting row ceiling for the preview negotiation
    #[arg(long)]
    pub max_rows: Option<u64>,

    /// Keep raising the ceiling until the preview fits
    #[arg(long)]
    pub escalate: bool,

    /// Preview only; do not write the export
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BulkModeArg {
    Model,
    Bulk,
}

impl From<BulkModeArg> for BulkMode {
    fn from(mode: BulkModeArg) -> Self {
        match mode {
            BulkModeArg::Model => BulkMode::Model,
            BulkModeArg::Bulk => BulkMode::Bulk,
        }
    }
}

pub async fn handle(ctx: &CommandContext, args: BulkArgs) -> Result<()> {
    let config = crate::config::global();
    let (catalog, datasets) =
        futures::try_join!(ctx.client.content(), ctx.client.datasets())?;
    if !datasets.iter().any(|d| d == &config.dataset) {
        bail!(
            "unknown dataset '{}' (available: {})",
            config.dataset,
            datasets.join(", ")
        );
    }

    let mut selection = BulkSelection::new();
    for raw in &args.tables {
        let table = TableName::parse(raw)?;
        if !catalog.iter().any(|info| info.table_name == table) {
            bail!("table '{table}' is not exportable");
        }
        selection = selection.with_table(&table, &catalog);
    }
    for raw in &args.except {
        selection = selection.without_table(&TableName::parse(raw)?);
    }
    if selection.is_empty() {
        bail!("selection is empty after --except");
    }

    if ctx.format == OutputFormat::Table {
        print_selection(&selection, &catalog);
    }

    let mut negotiator = DownloadNegotiator::new(&config.dataset)
        .with_max_rows(args.max_rows.unwrap_or(config.max_rows));
    negotiator.subscribe(|event| {
        if let StatusEvent::CeilingRaised { max_rows } = event {
            eprintln!("{}", format!("raising row ceiling to {max_rows}").dimmed());
        }
    });
    let target = DownloadTarget::tables(selection.tables().to_vec(), args.mode.into());

    negotiator.preview(&ctx.client, &target).await?;
    if args.escalate {
        escalate_until_fit(ctx, &mut negotiator, &target).await?;
    }

    if args.dry_run {
        if let Some(warning) = negotiator.warning() {
            eprintln!("{}", warning.yellow());
        }
        let preview = negotiator
            .last_preview()
            .expect("preview completed without error");
        return print_download_response(preview, ctx.format);
    }

    if !negotiator.can_commit() {
        match negotiator.warning() {
            Some(warning) => bail!("{warning} (re-run with --escalate or a higher --max-rows)"),
            None => bail!("nothing to export: the preview selected no rows"),
        }
    }
    let response = negotiator.commit(&ctx.client, &target).await?;

    if ctx.format == OutputFormat::Table {
        println!(
            "{}",
            format!(
                "bulk export ({}) committed: {} rows",
                BulkMode::from(args.mode).label(),
                response.row_count
            )
            .green()
            .bold()
        );
    }
    print_download_response(&response, ctx.format)
}

fn print_selection(selection: &BulkSelection, catalog: &[TableInfo]) {
    println!(
        "{} ({} tables)",
        "selection".bold(),
        selection.len()
    );
    for table in selection.tables() {
        match catalog.iter().find(|info| &info.table_name == table) {
            Some(info) => println!(
                "  {:<40} {:>10} rows",
                table.fq_name(),
                info.source_row_count.to_string()
            ),
            None => println!("  {:<40} {:>10}", table.fq_name(), "?"),
        }
    }
}
