//! services/client/src/adapters/storage.rs
//!
//! The object storage adapter: uploads listing images into one bucket and
//! builds their public URLs.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use tracing::debug;

use campus_swap_core::ports::{PortResult, StorageService};

use super::http::BackendHttp;

#[derive(Clone)]
pub struct StorageAdapter {
    http: BackendHttp,
    bucket: String,
}

impl StorageAdapter {
    pub fn new(http: BackendHttp, bucket: impl Into<String>) -> Self {
        Self {
            http,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl StorageService for StorageAdapter {
    /// Never overwrites: uploading to an existing path is a backend error.
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> PortResult<()> {
        let size = data.len();
        let request = self
            .http
            .request(
                Method::POST,
                &format!("/storage/v1/object/{}/{}", self.bucket, path),
            )
            .await
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(data);
        self.http.send(request).await?;
        debug!("Uploaded {} bytes to {}/{}", size, self.bucket, path);
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        self.http
            .url(&format!("/storage/v1/object/public/{}/{}", self.bucket, path))
    }
}
