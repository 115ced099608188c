//! `preview` — resolve a tree, apply toggles and filters, dry-run the export

use anyhow::Result;
use colored::*;

use crate::cli::OutputFormat;
use crate::engine::{
    Dependency, DownloadTarget, SelectionCategory, TableName, TreeResolver, VisibilityFilter,
};

use super::{CommandContext, SliceArgs, escalate_until_fit, prepare_slice, print_download_response};

#[derive(clap::Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub slice: SliceArgs,

    /// Print every branch, not just the recommended ones
    #[arg(long)]
    pub show_all: bool,
}

pub async fn handle(ctx: &CommandContext, args: PreviewArgs) -> Result<()> {
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

    if ctx.format == OutputFormat::Table {
        let visibility = if args.show_all {
            VisibilityFilter::all()
        } else {
            VisibilityFilter::default()
        };
        print_branches(&resolver, &visibility);

        let root_key = (TableName::parse(&args.slice.root)?, None);
        if let Some(summary) = resolver.filter_summary(&root_key) {
            println!("{} {}", "filters:".bold(), summary);
        }
    }
    if let Some(warning) = negotiator.warning() {
        eprintln!("{}", warning.yellow());
    }

    let preview = negotiator
        .last_preview()
        .expect("preview completed without error");
    print_download_response(preview, ctx.format)
}

/// List the resolved branches that pass the visibility filter, with their
/// selection category and any attached filters.
fn print_branches(resolver: &TreeResolver, visibility: &VisibilityFilter) {
    let Some(tree) = resolver.tree() else { return };

    fn walk(
        resolver: &TreeResolver,
        visibility: &VisibilityFilter,
        node: &Dependency,
        depth: usize,
    ) {
        if depth > 0 && visibility.shows(node) {
            let constraint = node.constraint_name.as_deref().unwrap_or("-");
            let mut line = format!(
                "{}{} via {} ({})",
                "  ".repeat(depth),
                node.display_name,
                constraint,
                SelectionCategory::of(node).label()
            );
            if let Some(summary) = resolver.filter_summary(&node.key()) {
                line = format!("{line} [{summary}]");
            }
            println!("{}", line.dimmed());
        }
        if let Some(children) = &node.sub_dependencies {
            for child in children {
                walk(resolver, visibility, child, depth + 1);
            }
        }
    }

    walk(resolver, visibility, tree, 0);
}
