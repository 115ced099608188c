//! Wire models for the schema-resolver / export-executor service

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::dependency::Dependency;
use crate::engine::table_name::TableName;

/// Body of `POST /download`, `/download/model` and `/download/bulk`.
///
/// The tree path sends a pruned `dependency`; the bulk path sends flat
/// `tableNames`. `queryValues` only carries filters on the legacy flat
/// single-table path — tree filters travel inside the pruned nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub dataset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency: Option<Dependency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_names: Option<Vec<TableName>>,
    pub query_values: HashMap<String, String>,
    pub dry_run: bool,
    pub max_rows: u64,
}

/// Outcome of a preview or commit. For a preview the counts are measured;
/// for a commit they are finalized (the data has been written).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    #[serde(default)]
    pub table_row_counts: Vec<TableRowCount>,
    pub row_count: u64,
    #[serde(default)]
    pub rows_skipped: u64,
    #[serde(default)]
    pub max_rows_reached: bool,
}

/// Per-table slice of a `DownloadResponse`. `rowsSkipped` is the only
/// partial-result signal the service reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRowCount {
    pub table_name: TableName,
    pub display_name: String,
    pub row_count: u64,
    #[serde(default)]
    pub rows_skipped: u64,
}

/// A possibly capped count. `plus` means the true count is at least `rows`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowCount {
    pub rows: u64,
    #[serde(default)]
    pub plus: bool,
}

impl fmt::Display for RowCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.plus {
            write!(f, "{}+", self.rows)
        } else {
            write!(f, "{}", self.rows)
        }
    }
}

/// One entry of `GET /content`, feeding the bulk selection and the table
/// browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub table_name: TableName,
    pub source_row_count: RowCount,
    pub static_row_count: RowCount,
    pub base_row_count: RowCount,
    #[serde(default)]
    pub dependencies: Vec<TableName>,
}

/// Response of `GET /database/tables/{catalog}/{schema}/{table}`; used to
/// populate per-table filter columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadata {
    pub table_name: TableName,
    #[serde(default)]
    pub columns: Vec<ColumnMetadata>,
    #[serde(default)]
    pub indexes: Vec<IndexMetadata>,
    #[serde(default)]
    pub primary_key: Option<PrimaryKeyMetadata>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexMetadata {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryKeyMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyMetadata {
    pub constraint_name: String,
    pub referenced_table: TableName,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub mandatory: bool,
}
