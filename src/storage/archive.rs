//! Saved ROI analyses under `recent_analyses/`

use std::sync::Arc;

use alpha_core::AnalysisResult;
use bytes::Bytes;
use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use super::{ObjectStore, join_path};
use crate::Result;

const PREFIX: &str = "analysis_";
const SUFFIX: &str = ".json";

/// Reads and writes `analysis_<millis>*.json` files in one folder
#[derive(Clone)]
pub struct AnalysisArchive {
    store: Option<Arc<dyn ObjectStore>>,
    folder: String,
    list_limit: usize,
}

impl AnalysisArchive {
    /// Archive in `folder` of `store`
    pub fn new(store: Option<Arc<dyn ObjectStore>>, folder: impl Into<String>, list_limit: usize) -> Self {
        Self {
            store,
            folder: folder.into(),
            list_limit,
        }
    }

    /// Whether a store is configured
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// All saved analyses, newest first.
    ///
    /// Files that fail to download or parse are skipped. Listing failures
    /// yield an empty history.
    pub async fn list_all(&self) -> Vec<AnalysisResult> {
        let Some(store) = self.store.as_deref() else {
            return Vec::new();
        };

        let mut names: Vec<String> = match store.list(&self.folder, self.list_limit).await {
            Ok(entries) => entries
                .into_iter()
                .map(|e| e.name)
                .filter(|n| n.starts_with(PREFIX) && n.ends_with(SUFFIX))
                .collect(),
            Err(e) => {
                warn!(store = store.name(), folder = %self.folder, error = %e, "Failed to list analyses");
                return Vec::new();
            }
        };
        names.sort_by(|a, b| b.cmp(a));

        let downloads = names.iter().map(|name| self.read_one(store, name));
        let results: Vec<AnalysisResult> = join_all(downloads).await.into_iter().flatten().collect();
        debug!(listed = names.len(), parsed = results.len(), "Loaded analysis history");
        results
    }

    async fn read_one(&self, store: &dyn ObjectStore, name: &str) -> Option<AnalysisResult> {
        let path = join_path(&self.folder, name);
        let data = match store.download(&path).await {
            Ok(data) => data,
            Err(e) => {
                warn!(path, error = %e, "Skipping analysis that failed to download");
                return None;
            }
        };
        match serde_json::from_slice::<AnalysisResult>(&data) {
            Ok(mut result) => {
                if result.id.is_empty() {
                    result.id = name.trim_end_matches(SUFFIX).to_string();
                }
                Some(result)
            }
            Err(e) => {
                warn!(path, error = %e, "Skipping unparseable analysis");
                None
            }
        }
    }

    /// Save `result` as `analysis_<unix-millis>_<tag>.json`, returning its
    /// path. The random tag keeps saves within one millisecond apart.
    ///
    /// # Errors
    ///
    /// Returns an error if no store is configured or the upload fails.
    pub async fn save(&self, result: &AnalysisResult) -> Result<String> {
        let Some(store) = self.store.as_deref() else {
            return Err(crate::Error::Config("storage is not configured".into()));
        };
        let tag = uuid::Uuid::new_v4().simple().to_string();
        let path = join_path(
            &self.folder,
            &format!("{PREFIX}{}_{}{SUFFIX}", Utc::now().timestamp_millis(), &tag[..8]),
        );
        let body = serde_json::to_vec_pretty(result)?;
        store
            .upload(&path, Bytes::from(body), "application/json", false)
            .await?;
        info!(path, id = %result.id, "Saved analysis");
        Ok(path)
    }
}
