//! Error taxonomy for the slice engine
//!
//! Failures surface verbatim as user-visible messages and are never retried
//! automatically; a failed call leaves the local tree, selection and filter
//! state untouched.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SliceError {
    /// Tree fetch or recompute failed.
    #[error("resolver error: {0}")]
    Resolver(String),

    /// Dry-run download failed.
    #[error("preview error: {0}")]
    Preview(String),

    /// Real export failed; nothing is assumed written.
    #[error("commit error: {0}")]
    Commit(String),

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}
