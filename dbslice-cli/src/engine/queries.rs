//! Per-node query filter compilation
//!
//! Filters are opaque `column = value` pairs attached to individual tree
//! nodes and ANDed in entry order by the export executor. The client keeps
//! them in an overlay keyed by `(table_name, constraint_name)` so they
//! survive tree refreshes, in which the resolver may reorder or regenerate
//! nodes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::dependency::{Dependency, NodeKey};

/// A single opaque column filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub column: String,
    pub value: String,
}

impl Query {
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    fn is_empty(&self) -> bool {
        self.value.trim().is_empty()
    }
}

/// Human-readable summary of a filter list: `"<col> = <val>"` joined with
/// `" AND "`, preserving entry order. The exact format is part of the
/// observable contract, not merely cosmetic.
pub fn summarize(queries: &[Query]) -> String {
    queries
        .iter()
        .map(|q| format!("{} = {}", q.column, q.value))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Drop entries whose value carries no content. Applied at the transmission
/// boundary only; the stored lists keep whatever the user typed.
pub fn strip_empty(queries: &[Query]) -> Vec<Query> {
    queries.iter().filter(|q| !q.is_empty()).cloned().collect()
}

/// Same stripping for the flat `queryValues` map used by the legacy
/// single-table download path.
pub fn strip_empty_values(values: &HashMap<String, String>) -> HashMap<String, String> {
    values
        .iter()
        .filter(|(_, v)| !v.trim().is_empty())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Ordered filter lists keyed by node identity.
#[derive(Debug, Clone, Default)]
pub struct QueryOverlay {
    entries: HashMap<NodeKey, Vec<Query>>,
}

impl QueryOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the full list for a node atomically. An empty list clears the
    /// entry; there is no per-field patching.
    pub fn set(&mut self, key: NodeKey, queries: Vec<Query>) {
        if queries.is_empty() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, queries);
        }
    }

    pub fn get(&self, key: &NodeKey) -> Option<&[Query]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the stored lists onto the matching nodes of a tree. Nodes with
    /// no entry keep whatever list they already carry.
    pub fn apply_to(&self, tree: &mut Dependency) {
        tree.for_each_mut(&mut |node| {
            if let Some(queries) = self.entries.get(&node.key()) {
                node.queries = queries.clone();
            }
        });
    }

    /// Summary line for one node, if it has filters.
    pub fn summary_for(&self, key: &NodeKey) -> Option<String> {
        self.entries.get(key).map(|queries| summarize(queries))
    }
}
