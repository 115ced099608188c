//! Dependency tree model
//!
//! A `Dependency` is one node in the foreign-key tree rooted at the table
//! the user chose to export. The remote resolver is authoritative for the
//! tree's *shape* (which child constraints exist and whether they are
//! mandatory); the client is authoritative for its *state* (selected flags
//! and filters), which it re-layers onto every refreshed shape by the
//! `(table_name, constraint_name)` composite key.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::queries::{self, Query};
use super::table_name::TableName;

/// Composite key correlating a node across tree refreshes. Matching is
/// never positional: the resolver may add, remove, or reorder branches
/// between round trips.
pub type NodeKey = (TableName, Option<String>);

/// One node of the foreign-key dependency tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub display_name: String,
    pub table_name: TableName,
    /// `None` on the root node only.
    pub constraint_name: Option<String>,
    /// `None` means "children not yet resolved", distinct from an empty
    /// list, and is preserved through pruning.
    pub sub_dependencies: Option<Vec<Dependency>>,
    pub selected: bool,
    pub mandatory: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<Query>,
}

impl Dependency {
    /// The root node of a fresh tree: no constraint, permanently selected.
    pub fn root(table_name: TableName) -> Self {
        Self {
            display_name: table_name.fq_name(),
            table_name,
            constraint_name: None,
            sub_dependencies: None,
            selected: true,
            mandatory: true,
            queries: Vec::new(),
        }
    }

    /// A child node reached through a named foreign-key constraint.
    /// Mandatory children start selected, optional children do not.
    pub fn child(table_name: TableName, constraint_name: impl Into<String>, mandatory: bool) -> Self {
        Self {
            display_name: table_name.fq_name(),
            table_name,
            constraint_name: Some(constraint_name.into()),
            sub_dependencies: None,
            selected: mandatory,
            mandatory,
            queries: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Dependency>) -> Self {
        self.sub_dependencies = Some(children);
        self
    }

    pub fn is_root(&self) -> bool {
        self.constraint_name.is_none()
    }

    pub fn key(&self) -> NodeKey {
        (self.table_name.clone(), self.constraint_name.clone())
    }

    /// Visit every node in document order.
    pub fn for_each(&self, visit: &mut impl FnMut(&Dependency)) {
        visit(self);
        if let Some(children) = &self.sub_dependencies {
            for child in children {
                child.for_each(visit);
            }
        }
    }

    /// Visit every node in document order, mutably.
    pub fn for_each_mut(&mut self, visit: &mut impl FnMut(&mut Dependency)) {
        visit(self);
        if let Some(children) = &mut self.sub_dependencies {
            for child in children {
                child.for_each_mut(visit);
            }
        }
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.for_each(&mut |_| count += 1);
        count
    }

    /// Find the first node (document order) matching a key.
    pub fn find(&self, key: &NodeKey) -> Option<&Dependency> {
        if &self.key() == key {
            return Some(self);
        }
        if let Some(children) = &self.sub_dependencies {
            for child in children {
                if let Some(found) = child.find(key) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Mutable variant of [`find`](Self::find).
    pub fn find_mut(&mut self, key: &NodeKey) -> Option<&mut Dependency> {
        if &self.key() == key {
            return Some(self);
        }
        if let Some(children) = &mut self.sub_dependencies {
            for child in children {
                if let Some(found) = child.find_mut(key) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Resolve a constraint name to a full node key. Used by the CLI, where
    /// branches are addressed by constraint name alone.
    pub fn key_for_constraint(&self, constraint_name: &str) -> Option<NodeKey> {
        let mut found = None;
        self.for_each(&mut |node| {
            if found.is_none() && node.constraint_name.as_deref() == Some(constraint_name) {
                found = Some(node.key());
            }
        });
        found
    }

    /// Reduce the tree to the reachable-and-selected subset for
    /// transmission.
    ///
    /// This is a top-down reachability cut, not a filter-map: a deselected
    /// node drops its entire subtree regardless of the descendants' own
    /// `selected` flags. Idempotent.
    pub fn prune(&self) -> Dependency {
        Dependency {
            display_name: self.display_name.clone(),
            table_name: self.table_name.clone(),
            constraint_name: self.constraint_name.clone(),
            sub_dependencies: self.sub_dependencies.as_ref().map(|children| {
                children
                    .iter()
                    .filter(|child| child.selected)
                    .map(|child| child.prune())
                    .collect()
            }),
            selected: self.selected,
            mandatory: self.mandatory,
            queries: self.queries.clone(),
        }
    }

    /// Drop filter entries with empty values from every node. Called at the
    /// transmission boundary; stored state keeps what the user typed.
    pub fn drop_empty_queries(&mut self) {
        self.for_each_mut(&mut |node| {
            node.queries = queries::strip_empty(&node.queries);
        });
    }

    /// Re-layer client-authoritative state from a previous tree onto this
    /// (freshly resolved) shape.
    ///
    /// Nodes correlate by key; where a cycle has been unrolled into several
    /// occurrences of one key, the first occurrence in the previous tree
    /// wins. Nodes the resolver introduced keep their server defaults.
    pub fn adopt_state_from(&mut self, previous: &Dependency) {
        let mut state: HashMap<NodeKey, (bool, Vec<Query>)> = HashMap::new();
        previous.for_each(&mut |node| {
            state
                .entry(node.key())
                .or_insert_with(|| (node.selected, node.queries.clone()));
        });

        self.for_each_mut(&mut |node| {
            if let Some((selected, queries)) = state.get(&node.key()) {
                node.selected = *selected;
                node.queries = queries.clone();
            }
        });
        self.enforce_invariants();
    }

    /// Mandatory nodes are permanently selected; the root additionally has
    /// no constraint name.
    pub fn enforce_invariants(&mut self) {
        self.constraint_name = None;
        self.mandatory = true;
        self.for_each_mut(&mut |node| {
            if node.mandatory {
                node.selected = true;
            }
        });
    }
}
