//! `reqwest` implementation of the service seam

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::engine::dependency::Dependency;
use crate::engine::error::SliceError;
use crate::engine::table_name::TableName;

use super::models::{DownloadRequest, DownloadResponse, TableInfo, TableMetadata};
use super::transport::SliceApi;

/// Correlation id header attached to every outgoing request; the same id is
/// logged so client and service logs can be lined up.
const CORRELATION_HEADER: &str = "x-correlation-id";

/// HTTP client for the schema-resolver / export-executor service.
pub struct SliceClient {
    http: reqwest::Client,
    base_url: String,
}

impl SliceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SliceError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `/database/tables/{catalog}/{schema}/{table}`; absent catalog/schema
    /// travel as empty path segments.
    fn table_path(table: &TableName) -> String {
        format!(
            "/database/tables/{}/{}/{}",
            urlencoding::encode(table.catalog.as_deref().unwrap_or_default()),
            urlencoding::encode(table.schema.as_deref().unwrap_or_default()),
            urlencoding::encode(&table.table),
        )
    }

    async fn get_json<R: DeserializeOwned>(
        &self,
        path: &str,
        map_err: fn(String) -> SliceError,
    ) -> Result<R, SliceError> {
        let correlation_id = Uuid::new_v4();
        log::debug!("GET {} [{}]", path, correlation_id);
        let response = self
            .http
            .get(self.endpoint(path))
            .header(CORRELATION_HEADER, correlation_id.to_string())
            .send()
            .await?;
        Self::read_json(response, map_err).await
    }

    async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        map_err: fn(String) -> SliceError,
    ) -> Result<R, SliceError> {
        let correlation_id = Uuid::new_v4();
        log::debug!("POST {} [{}]", path, correlation_id);
        let response = self
            .http
            .post(self.endpoint(path))
            .header(CORRELATION_HEADER, correlation_id.to_string())
            .json(body)
            .send()
            .await?;
        Self::read_json(response, map_err).await
    }

    /// Non-2xx responses surface the body verbatim under the operation's
    /// error variant; transport failures map to `SliceError::Network`.
    async fn read_json<R: DeserializeOwned>(
        response: reqwest::Response,
        map_err: fn(String) -> SliceError,
    ) -> Result<R, SliceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status.to_string()
            } else {
                body
            };
            return Err(map_err(message));
        }
        Ok(response.json::<R>().await?)
    }

    fn download_error(request: &DownloadRequest) -> fn(String) -> SliceError {
        if request.dry_run {
            SliceError::Preview
        } else {
            SliceError::Commit
        }
    }
}

#[async_trait]
impl SliceApi for SliceClient {
    async fn resolve_dependencies(&self, tree: &Dependency) -> Result<Dependency, SliceError> {
        self.post_json("/database/dependencies", tree, SliceError::Resolver)
            .await
    }

    async fn table_metadata(&self, table: &TableName) -> Result<TableMetadata, SliceError> {
        self.get_json(&Self::table_path(table), SliceError::Resolver)
            .await
    }

    async fn download(&self, request: &DownloadRequest) -> Result<DownloadResponse, SliceError> {
        self.post_json("/download", request, Self::download_error(request))
            .await
    }

    async fn download_model(
        &self,
        request: &DownloadRequest,
    ) -> Result<DownloadResponse, SliceError> {
        self.post_json("/download/model", request, Self::download_error(request))
            .await
    }

    async fn download_bulk(
        &self,
        request: &DownloadRequest,
    ) -> Result<DownloadResponse, SliceError> {
        self.post_json("/download/bulk", request, Self::download_error(request))
            .await
    }

    async fn content(&self) -> Result<Vec<TableInfo>, SliceError> {
        self.get_json("/content", SliceError::Resolver).await
    }

    async fn datasets(&self) -> Result<Vec<String>, SliceError> {
        self.get_json("/datasets", SliceError::Resolver).await
    }
}
