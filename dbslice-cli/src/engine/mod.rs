//! Slice export engine
//!
//! Everything between the user's table picks and the export service: the
//! dependency tree model and its pruning, selection and filter state, the
//! resolver round trip, the preview/commit negotiation, and the flat
//! transitive-closure selection used by bulk mode.

pub mod closure;
pub mod dependency;
pub mod error;
pub mod events;
pub mod negotiator;
pub mod queries;
pub mod resolver;
pub mod selection;
pub mod table_name;

pub use closure::BulkSelection;
pub use dependency::{Dependency, NodeKey};
pub use error::SliceError;
pub use events::{StatusBus, StatusEvent};
pub use negotiator::{
    BulkMode, DEFAULT_MAX_ROWS, DownloadNegotiator, DownloadTarget, MAX_ROWS_INCREMENT,
    NegotiationPhase,
};
pub use queries::{Query, QueryOverlay};
pub use resolver::TreeResolver;
pub use selection::{SelectionCategory, VisibilityFilter};
pub use table_name::TableName;
