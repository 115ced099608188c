//! Command handlers

pub mod bulk;
pub mod export;
pub mod preview;
pub mod tables;

use anyhow::{Context, Result, bail};
use colored::*;

use crate::api::SliceClient;
use crate::api::models::DownloadResponse;
use crate::engine::{
    DownloadNegotiator, DownloadTarget, Query, StatusEvent, TableName, TreeResolver,
};

use super::OutputFormat;

/// Safety bound on `--escalate`; each step raises the ceiling by a fixed
/// increment, so runaway slices fail instead of hammering the service.
const ESCALATION_LIMIT: u32 = 50;

pub struct CommandContext {
    pub client: SliceClient,
    pub format: OutputFormat,
}

/// Flags shared by the tree-path commands (`preview`, `export`).
#[derive(clap::Args)]
pub struct SliceArgs {
    /// Root table: `catalog.schema.table`, `schema.table`, or `table`
    pub root: String,

    /// Select an optional branch by its constraint name (repeatable)
    #[arg(long, value_name = "CONSTRAINT")]
    pub include: Vec<String>,

    /// Deselect a recommended branch by its constraint name (repeatable)
    #[arg(long, value_name = "CONSTRAINT")]
    pub exclude: Vec<String>,

    /// Filter the root table: `column=value` (repeatable, ANDed in order)
    #[arg(long, value_name = "COLUMN=VALUE")]
    pub filter: Vec<String>,

    /// Starting row ceiling for the preview negotiation
    #[arg(long)]
    pub max_rows: Option<u64>,

    /// Keep raising the ceiling until the preview fits
    #[arg(long)]
    pub escalate: bool,
}

/// Parse a `column=value` filter flag.
pub fn parse_filter(input: &str) -> Result<Query> {
    match input.split_once('=') {
        Some((column, value)) if !column.trim().is_empty() => {
            Ok(Query::new(column.trim(), value.trim()))
        }
        _ => bail!("expected column=value, got '{input}'"),
    }
}

/// Resolve the tree for `args.root`, apply the requested branch toggles and
/// root filters, and set up the negotiation.
pub async fn prepare_slice(
    ctx: &CommandContext,
    args: &SliceArgs,
) -> Result<(TreeResolver, DownloadNegotiator)> {
    let root = TableName::parse(&args.root)?;

    let mut resolver = TreeResolver::new();
    resolver.set_root(root.clone());
    resolver
        .refresh(&ctx.client)
        .await
        .with_context(|| format!("Failed to resolve dependencies of {root}"))?;

    for constraint in &args.include {
        let key = resolver
            .key_for_constraint(constraint)
            .with_context(|| format!("No branch with constraint '{constraint}'"))?;
        let already_selected = resolver
            .tree()
            .and_then(|tree| tree.find(&key))
            .is_some_and(|node| node.selected);
        if already_selected {
            log::info!("branch '{}' is already included", constraint);
            continue;
        }
        resolver.toggle(&ctx.client, &key).await?;
    }

    for constraint in &args.exclude {
        let key = resolver
            .key_for_constraint(constraint)
            .with_context(|| format!("No branch with constraint '{constraint}'"))?;
        let node = resolver
            .tree()
            .and_then(|tree| tree.find(&key))
            .expect("key was just resolved from this tree")
            .clone();
        if node.mandatory {
            bail!("'{constraint}' is a mandatory relationship and cannot be excluded");
        }
        if !node.selected {
            log::info!("branch '{}' is already excluded", constraint);
            continue;
        }
        resolver.toggle(&ctx.client, &key).await?;
    }

    if !args.filter.is_empty() {
        let queries = args
            .filter
            .iter()
            .map(|f| parse_filter(f))
            .collect::<Result<Vec<_>>>()?;
        resolver.set_filters((root, None), queries);
    }

    let config = crate::config::global();
    let mut negotiator = DownloadNegotiator::new(&config.dataset)
        .with_max_rows(args.max_rows.unwrap_or(config.max_rows));
    negotiator.set_auto_refresh(config.auto_refresh);
    negotiator.subscribe(|event| {
        if let StatusEvent::CeilingRaised { max_rows } = event {
            eprintln!("{}", format!("raising row ceiling to {max_rows}").dimmed());
        }
    });

    Ok((resolver, negotiator))
}

/// Preview, escalating the ceiling until the slice fits (bounded).
pub async fn escalate_until_fit(
    ctx: &CommandContext,
    negotiator: &mut DownloadNegotiator,
    target: &DownloadTarget,
) -> Result<()> {
    let mut attempts = 0;
    while negotiator.warning().is_some() {
        if attempts >= ESCALATION_LIMIT {
            bail!(
                "slice still exceeds the row ceiling after {} escalations (last ceiling: {})",
                attempts,
                negotiator.max_rows()
            );
        }
        negotiator.escalate();
        negotiator.preview(&ctx.client, target).await?;
        attempts += 1;
    }
    Ok(())
}

/// Render a preview/commit outcome in the requested format.
pub fn print_download_response(response: &DownloadResponse, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(response)?);
        }
        OutputFormat::Csv => {
            print!("{}", download_response_csv(response)?);
        }
        OutputFormat::Table => {
            println!(
                "{:<40} {:>12} {:>12}",
                "table".bold(),
                "rows".bold(),
                "skipped".bold()
            );
            for table in &response.table_row_counts {
                println!(
                    "{:<40} {:>12} {:>12}",
                    table.display_name, table.row_count, table.rows_skipped
                );
            }
            println!(
                "{:<40} {:>12} {:>12}",
                "total".bold(),
                response.row_count.to_string().cyan(),
                response.rows_skipped
            );
            if response.max_rows_reached {
                eprintln!("{}", "row ceiling reached; counts are truncated".yellow());
            }
        }
    }
    Ok(())
}

fn download_response_csv(response: &DownloadResponse) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["table", "rows", "rowsSkipped"])?;
    for table in &response.table_row_counts {
        writer.write_record([
            table.table_name.fq_name(),
            table.row_count.to_string(),
            table.rows_skipped.to_string(),
        ])?;
    }
    writer.write_record([
        "total".to_string(),
        response.row_count.to_string(),
        response.rows_skipped.to_string(),
    ])?;
    Ok(String::from_utf8(writer.into_inner()?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::TableRowCount;

    #[test]
    fn test_parse_filter() {
        assert_eq!(parse_filter("id=5").unwrap(), Query::new("id", "5"));
        assert_eq!(
            parse_filter(" status = 'open' ").unwrap(),
            Query::new("status", "'open'")
        );
        // Values may themselves contain '='.
        assert_eq!(parse_filter("note=a=b").unwrap(), Query::new("note", "a=b"));
        assert!(parse_filter("no-separator").is_err());
        assert!(parse_filter("=5").is_err());
    }

    #[test]
    fn test_download_response_csv() {
        let response = DownloadResponse {
            table_row_counts: vec![TableRowCount {
                table_name: TableName::new(None::<String>, Some("dbo"), "Orders"),
                display_name: "dbo.Orders".to_string(),
                row_count: 40,
                rows_skipped: 2,
            }],
            row_count: 40,
            rows_skipped: 2,
            max_rows_reached: false,
        };

        let csv = download_response_csv(&response).unwrap();
        assert_eq!(csv, "table,rows,rowsSkipped\ndbo.Orders,40,2\ntotal,40,2\n");
    }
}
