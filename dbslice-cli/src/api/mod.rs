//! Client for the schema-resolver / export-executor service
//!
//! The service owns schema introspection and SQL execution; this module
//! owns nothing but the REST surface the engine consumes: wire models, the
//! `SliceApi` seam, and the `reqwest` implementation.

pub mod client;
pub mod models;
pub mod transport;

pub use client::SliceClient;
pub use models::{
    ColumnMetadata, DownloadRequest, DownloadResponse, ForeignKeyMetadata, IndexMetadata,
    PrimaryKeyMetadata, RowCount, TableInfo, TableMetadata, TableRowCount,
};
pub use transport::SliceApi;
