//! Selection rules over the dependency tree
//!
//! Each node is in one of three states: mandatory-selected (terminal),
//! optional-selected, or optional-unselected. Toggling only ever flips the
//! node's own flag. An orthogonal visibility filter controls which nodes a
//! frontend displays and never touches selection state.

use super::dependency::{Dependency, NodeKey};

/// Display category of a node, derived from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionCategory {
    /// `mandatory` — cannot be excluded from the export.
    Required,
    /// Selected but not mandatory; included unless the user opts out.
    Recommended,
    /// Neither selected nor mandatory.
    Optional,
}

impl SelectionCategory {
    pub fn of(node: &Dependency) -> Self {
        if node.mandatory {
            Self::Required
        } else if node.selected {
            Self::Recommended
        } else {
            Self::Optional
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Recommended => "recommended",
            Self::Optional => "optional",
        }
    }
}

/// Which categories are displayed. Purely presentational; applying or
/// changing the filter never mutates any node's `selected` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityFilter {
    pub required: bool,
    pub recommended: bool,
    pub optional: bool,
}

impl Default for VisibilityFilter {
    fn default() -> Self {
        Self {
            required: false,
            recommended: true,
            optional: false,
        }
    }
}

impl VisibilityFilter {
    pub fn all() -> Self {
        Self {
            required: true,
            recommended: true,
            optional: true,
        }
    }

    pub fn shows(&self, node: &Dependency) -> bool {
        match SelectionCategory::of(node) {
            SelectionCategory::Required => self.required,
            SelectionCategory::Recommended => self.recommended,
            SelectionCategory::Optional => self.optional,
        }
    }
}

/// Flip a node's own `selected` flag. A no-op on mandatory nodes; never
/// cascades to children. Returns whether anything changed.
pub fn toggle(node: &mut Dependency) -> bool {
    if node.mandatory {
        return false;
    }
    node.selected = !node.selected;
    true
}

/// Toggle the node addressed by `key`, if the tree contains it.
pub fn toggle_at(tree: &mut Dependency, key: &NodeKey) -> bool {
    match tree.find_mut(key) {
        Some(node) => toggle(node),
        None => false,
    }
}
