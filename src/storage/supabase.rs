//! Supabase Storage REST backend

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::json;
use tracing::debug;

use super::{ObjectEntry, ObjectStore};
use crate::{Error, Result};

/// Bucket client for `{url}/storage/v1`
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    key: String,
    bucket: String,
}

impl SupabaseStore {
    /// Create a client for `bucket` in the project at `url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: &str, key: &str, bucket: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build storage client: {e}")))?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            bucket: bucket.to_string(),
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.bucket,
            path.trim_start_matches('/')
        )
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.key)
            .header("apikey", &self.key)
    }

    async fn check(path: &str, op: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        // Storage reports missing objects as 400 with a nested 404
        if status == StatusCode::NOT_FOUND || body.contains("\"404\"") || body.contains("not_found") {
            return Err(Error::NotFound(path.to_string()));
        }
        Err(Error::Storage(format!("{op} {path} failed ({status}): {body}")))
    }
}

#[async_trait]
impl ObjectStore for SupabaseStore {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn download(&self, path: &str) -> Result<Bytes> {
        debug!(bucket = %self.bucket, path, "Downloading object");
        let response = self
            .authed(self.client.get(self.object_url(path)))
            .send()
            .await?;
        let response = Self::check(path, "download", response).await?;
        Ok(response.bytes().await?)
    }

    async fn list(&self, folder: &str, limit: usize) -> Result<Vec<ObjectEntry>> {
        let url = format!("{}/storage/v1/object/list/{}", self.base_url, self.bucket);
        let body = json!({
            "prefix": folder.trim_matches('/'),
            "limit": limit,
            "offset": 0,
            "sortBy": { "column": "name", "order": "desc" },
        });
        let response = self.authed(self.client.post(url)).json(&body).send().await?;
        let response = Self::check(folder, "list", response).await?;
        Ok(response.json::<Vec<ObjectEntry>>().await?)
    }

    async fn upload(&self, path: &str, data: Bytes, content_type: &str, upsert: bool) -> Result<()> {
        debug!(bucket = %self.bucket, path, size = data.len(), upsert, "Uploading object");
        let response = self
            .authed(self.client.post(self.object_url(path)))
            .header("content-type", content_type)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .body(data)
            .send()
            .await?;
        Self::check(path, "upload", response).await?;
        Ok(())
    }

    async fn remove(&self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let url = format!("{}/storage/v1/object/{}", self.base_url, self.bucket);
        let response = self
            .authed(self.client.delete(url))
            .json(&json!({ "prefixes": paths }))
            .send()
            .await?;
        match Self::check(&paths.join(","), "remove", response).await {
            Ok(_) | Err(Error::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
