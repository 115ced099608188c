//! Transitive-closure table selection for bulk export
//!
//! The bulk path has no per-row filtering and no tree: the user picks whole
//! tables and every table they transitively depend on comes along. The
//! asymmetry between add and remove is intentional and load-bearing for the
//! counters built on top of this set: additions are transitive, removals
//! are shallow.

use crate::api::models::TableInfo;

use super::table_name::TableName;

/// An insertion-ordered selection set over `TableName`s, with persistent
/// add/remove (each operation produces a new set; the receiver is never
/// spliced in place).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkSelection {
    tables: Vec<TableName>,
}

impl BulkSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, table: &TableName) -> bool {
        self.tables.iter().any(|t| t == table)
    }

    pub fn tables(&self) -> &[TableName] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Add a table and, recursively, every table listed in its
    /// (server-supplied, already-flattened) `dependencies`. Membership in
    /// the growing set is the cycle and duplicate guard.
    pub fn with_table(&self, table: &TableName, catalog: &[TableInfo]) -> Self {
        let mut next = self.clone();
        next.insert_recursive(table, catalog);
        next
    }

    fn insert_recursive(&mut self, table: &TableName, catalog: &[TableInfo]) {
        if self.contains(table) {
            return;
        }
        self.tables.push(table.clone());
        if let Some(info) = catalog.iter().find(|info| &info.table_name == table) {
            for dependency in &info.dependencies {
                self.insert_recursive(dependency, catalog);
            }
        }
    }

    /// Remove exactly this entry. Tables that were pulled in transitively
    /// stay selected; removal never cascades.
    pub fn without_table(&self, table: &TableName) -> Self {
        Self {
            tables: self
                .tables
                .iter()
                .filter(|t| *t != table)
                .cloned()
                .collect(),
        }
    }
}
