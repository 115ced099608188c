//! Table identity

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a table by its `(catalog, schema, table)` triple.
///
/// The service exposes row counts, table metadata and dependency lists
/// through independent endpoints that do not share object identity, so this
/// triple is the sole key used to correlate records between them. Equality
/// is exact and null-aware: `None` only matches `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableName {
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    pub table: String,
}

impl TableName {
    pub fn new(
        catalog: Option<impl Into<String>>,
        schema: Option<impl Into<String>>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            catalog: catalog.map(Into::into),
            schema: schema.map(Into::into),
            table: table.into(),
        }
    }

    /// A table without catalog or schema qualification.
    pub fn bare(table: impl Into<String>) -> Self {
        Self {
            catalog: None,
            schema: None,
            table: table.into(),
        }
    }

    /// Fully-qualified display name: the non-absent segments joined with `.`.
    pub fn fq_name(&self) -> String {
        let mut segments = Vec::with_capacity(3);
        if let Some(catalog) = &self.catalog {
            segments.push(catalog.as_str());
        }
        if let Some(schema) = &self.schema {
            segments.push(schema.as_str());
        }
        segments.push(self.table.as_str());
        segments.join(".")
    }

    /// Parse a dotted name as typed on the command line.
    ///
    /// One segment is a bare table, two are `schema.table`, three are
    /// `catalog.schema.table`. More than three segments is rejected.
    pub fn parse(input: &str) -> anyhow::Result<Self> {
        let segments: Vec<&str> = input.split('.').map(str::trim).collect();
        if segments.iter().any(|s| s.is_empty()) {
            anyhow::bail!("table name has an empty segment: '{input}'");
        }
        match segments.as_slice() {
            [table] => Ok(Self::bare(*table)),
            [schema, table] => Ok(Self::new(None::<String>, Some(*schema), *table)),
            [catalog, schema, table] => Ok(Self::new(Some(*catalog), Some(*schema), *table)),
            _ => anyhow::bail!("expected at most catalog.schema.table, got '{input}'"),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fq_name())
    }
}
