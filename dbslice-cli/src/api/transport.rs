//! Service seam for the slice engine
//!
//! The protocol state machines talk to the remote service through this
//! trait, so they can be driven by in-memory fakes in tests and by the
//! `reqwest` client in production.

use async_trait::async_trait;

use crate::engine::dependency::Dependency;
use crate::engine::error::SliceError;

use super::models::{DownloadRequest, DownloadResponse, TableInfo, TableMetadata};
use crate::engine::table_name::TableName;

/// The REST surface the core consumes. One method per collaborator-owned
/// endpoint.
#[async_trait]
pub trait SliceApi: Send + Sync {
    /// `POST /database/dependencies` — submit the client tree, receive the
    /// resolver-recomputed shape.
    async fn resolve_dependencies(&self, tree: &Dependency) -> Result<Dependency, SliceError>;

    /// `GET /database/tables/{catalog}/{schema}/{table}`.
    async fn table_metadata(&self, table: &TableName) -> Result<TableMetadata, SliceError>;

    /// `POST /download` — the tree path, preview or commit depending on
    /// `dry_run`.
    async fn download(&self, request: &DownloadRequest) -> Result<DownloadResponse, SliceError>;

    /// `POST /download/model` — bulk path over the model tables.
    async fn download_model(&self, request: &DownloadRequest)
    -> Result<DownloadResponse, SliceError>;

    /// `POST /download/bulk` — bulk path over the full closure set.
    async fn download_bulk(&self, request: &DownloadRequest)
    -> Result<DownloadResponse, SliceError>;

    /// `GET /content`.
    async fn content(&self) -> Result<Vec<TableInfo>, SliceError>;

    /// `GET /datasets`.
    async fn datasets(&self) -> Result<Vec<String>, SliceError>;
}
