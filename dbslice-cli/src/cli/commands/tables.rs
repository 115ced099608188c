//! `tables` — browse what the service can export

use anyhow::Result;
use colored::*;
use futures::future::try_join_all;

use crate::api::SliceApi;
use crate::api::models::{TableInfo, TableMetadata};
use crate::cli::OutputFormat;
use crate::engine::TableName;

use super::CommandContext;

#[derive(clap::Args)]
pub struct TablesArgs {
    /// Show column/key details for these tables instead of listing all
    pub tables: Vec<String>,
}

pub async fn handle(ctx: &CommandContext, args: TablesArgs) -> Result<()> {
    if args.tables.is_empty() {
        list(ctx).await
    } else {
        details(ctx, &args.tables).await
    }
}

async fn list(ctx: &CommandContext) -> Result<()> {
    let catalog = ctx.client.content().await?;
    match ctx.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&catalog)?),
        OutputFormat::Csv => print!("{}", catalog_csv(&catalog)?),
        OutputFormat::Table => {
            println!(
                "{:<40} {:>10} {:>10} {:>10} {:>6}",
                "table".bold(),
                "source".bold(),
                "static".bold(),
                "base".bold(),
                "deps".bold()
            );
            for info in &catalog {
                println!(
                    "{:<40} {:>10} {:>10} {:>10} {:>6}",
                    info.table_name.fq_name(),
                    info.source_row_count.to_string(),
                    info.static_row_count.to_string(),
                    info.base_row_count.to_string(),
                    info.dependencies.len()
                );
            }
        }
    }
    Ok(())
}

async fn details(ctx: &CommandContext, names: &[String]) -> Result<()> {
    let tables = names
        .iter()
        .map(|name| TableName::parse(name))
        .collect::<Result<Vec<_>>>()?;
    let metadata = try_join_all(tables.iter().map(|table| ctx.client.table_metadata(table))).await?;

    match ctx.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&metadata)?),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            writer.write_record(["table", "column", "type", "nullable"])?;
            for meta in &metadata {
                for column in &meta.columns {
                    writer.write_record([
                        meta.table_name.fq_name(),
                        column.name.clone(),
                        column.data_type.clone(),
                        column.nullable.to_string(),
                    ])?;
                }
            }
            print!("{}", String::from_utf8(writer.into_inner()?)?);
        }
        OutputFormat::Table => {
            for meta in &metadata {
                print_metadata(meta);
            }
        }
    }
    Ok(())
}

fn print_metadata(meta: &TableMetadata) {
    println!("{}", meta.table_name.fq_name().bold());
    for column in &meta.columns {
        let nullable = if column.nullable { "null" } else { "not null" };
        println!("  {:<30} {:<15} {}", column.name, column.data_type, nullable.dimmed());
    }
    if let Some(primary_key) = &meta.primary_key {
        println!(
            "  {} {}",
            "primary key:".cyan(),
            primary_key.columns.join(", ")
        );
    }
    for index in &meta.indexes {
        let unique = if index.unique { " (unique)" } else { "" };
        println!(
            "  {} {} on {}{}",
            "index:".cyan(),
            index.name,
            index.columns.join(", "),
            unique
        );
    }
    for fk in &meta.foreign_keys {
        let kind = if fk.mandatory { "mandatory" } else { "optional" };
        println!(
            "  {} {} -> {} ({})",
            "fk:".cyan(),
            fk.constraint_name,
            fk.referenced_table.fq_name(),
            kind
        );
    }
}

fn catalog_csv(catalog: &[TableInfo]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["table", "source", "static", "base", "dependencies"])?;
    for info in catalog {
        writer.write_record([
            info.table_name.fq_name(),
            info.source_row_count.to_string(),
            info.static_row_count.to_string(),
            info.base_row_count.to_string(),
            info.dependencies.len().to_string(),
        ])?;
    }
    Ok(String::from_utf8(writer.into_inner()?)?)
}
