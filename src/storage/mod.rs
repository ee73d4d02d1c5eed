//! Object storage access
//!
//! The grading jobs publish their artifacts into a single bucket:
//!
//! - `overlap_results.json`: token id -> chronological grading snapshots
//! - `recent_analyses/analysis_<millis>_<tag>.json`: saved ROI analyses
//!
//! [`ObjectStore`] abstracts the bucket so the same readers run against
//! Supabase Storage in production and a local directory in development.

mod archive;
mod local;
mod overlap;
mod supabase;

pub use archive::AnalysisArchive;
pub use local::LocalStore;
pub use overlap::{DataSource, FeedSnapshot, TokenFeedReader, parse_overlap_results, sample_tokens};
pub use supabase::SupabaseStore;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::Result;
use crate::config::StorageConfig;

/// An object listed in a folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    /// File name relative to the listed folder
    pub name: String,
}

/// Minimal bucket interface
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Fetch the raw bytes at `path`
    async fn download(&self, path: &str) -> Result<Bytes>;

    /// List up to `limit` entries directly under `folder`
    async fn list(&self, folder: &str, limit: usize) -> Result<Vec<ObjectEntry>>;

    /// Store `data` at `path`; `upsert` allows overwriting
    async fn upload(&self, path: &str, data: Bytes, content_type: &str, upsert: bool) -> Result<()>;

    /// Delete every path in `paths`; missing paths are not an error
    async fn remove(&self, paths: &[String]) -> Result<()>;

    /// Overwrite `path`: remove whatever is there, then upload
    async fn replace(&self, path: &str, data: Bytes, content_type: &str) -> Result<()> {
        if let Err(e) = self.remove(&[path.to_string()]).await {
            warn!(store = self.name(), path, error = %e, "Remove before replace failed");
        }
        self.upload(path, data, content_type, true).await
    }
}

/// Build the configured store, if any.
///
/// A local root wins over Supabase credentials. Missing credentials are
/// not an error: callers fall back to sample or empty data.
pub fn from_config(config: &StorageConfig) -> Result<Option<Arc<dyn ObjectStore>>> {
    if let Some(root) = config.local_root.as_deref().filter(|r| !r.is_empty()) {
        info!(root, bucket = %config.bucket, "Using local object store");
        return Ok(Some(Arc::new(LocalStore::new(root, &config.bucket))));
    }

    match (config.url.as_deref(), config.key.as_deref()) {
        (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => {
            info!(url, bucket = %config.bucket, "Using Supabase object store");
            let store = SupabaseStore::new(url, key, &config.bucket, config.timeout)?;
            Ok(Some(Arc::new(store)))
        }
        _ => {
            warn!("Missing SUPABASE_URL or SUPABASE_KEY, storage disabled");
            Ok(None)
        }
    }
}

/// Store a file at `path`, replacing an existing object when `upsert`
/// is set. The content type follows the extension.
///
/// # Errors
///
/// Returns the store's error, including a conflict when `path` exists
/// and `upsert` is not set.
pub async fn put_object(store: &dyn ObjectStore, path: &str, data: Bytes, upsert: bool) -> Result<()> {
    let content_type = if path.ends_with(".json") {
        "application/json"
    } else {
        "application/octet-stream"
    };
    if upsert {
        store.replace(path, data, content_type).await
    } else {
        store.upload(path, data, content_type, false).await
    }
}

/// Join a folder and a file name into a bucket path
#[must_use]
pub fn join_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("recent_analyses", "a.json"), "recent_analyses/a.json");
        assert_eq!(join_path("/recent_analyses/", "a.json"), "recent_analyses/a.json");
        assert_eq!(join_path("", "a.json"), "a.json");
    }

    #[tokio::test]
    async fn test_put_object_overwrites_only_with_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), "monitor-data");

        put_object(&store, "overlap_results.json", Bytes::from_static(b"{}"), false).await.unwrap();
        assert!(
            put_object(&store, "overlap_results.json", Bytes::from_static(b"[]"), false)
                .await
                .is_err()
        );
        put_object(&store, "overlap_results.json", Bytes::from_static(b"[]"), true).await.unwrap();
        assert_eq!(&store.download("overlap_results.json").await.unwrap()[..], b"[]");
    }

    #[test]
    fn test_from_config_without_credentials_is_none() {
        let config = StorageConfig::default();
        assert!(from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_from_config_prefers_local_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            local_root: Some(dir.path().to_string_lossy().to_string()),
            url: Some("https://example.supabase.co".into()),
            key: Some("k".into()),
            ..Default::default()
        };
        let store = from_config(&config).unwrap().unwrap();
        assert_eq!(store.name(), "local");
    }
}
