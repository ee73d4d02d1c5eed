//! Overlap feed reader
//!
//! Projects the grading job's `overlap_results.json` into [`TokenRecord`]s.

use std::sync::Arc;

use alpha_core::time::timestamp_from_value;
use alpha_core::token::dexscreener_url;
use alpha_core::{Grade, TokenRecord};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::ObjectStore;
use crate::Result;

/// Max records served by the feed
pub const MAX_RECORDS: usize = 100;

/// Where a feed snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Supabase bucket
    SupabaseJson,
    /// Local directory store
    LocalJson,
    /// Generated sample data
    Mock,
    /// Sample data served after an unexpected failure
    ErrorFallback,
}

/// One read of the token feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSnapshot {
    /// Records, newest discovery first
    pub tokens: Vec<TokenRecord>,
    /// When this snapshot was taken
    pub last_updated: DateTime<Utc>,
    /// Where the records came from
    pub data_source: DataSource,
    /// The store was configured but the feed could not be read
    #[serde(default)]
    pub fetch_failed: bool,
}

impl FeedSnapshot {
    /// Records are generated sample data, not the feed
    #[must_use]
    pub fn is_sample(&self) -> bool {
        matches!(self.data_source, DataSource::Mock | DataSource::ErrorFallback)
    }
}

/// Project the overlap results document into token records.
///
/// The document maps token id to a chronological list of snapshots; the
/// last snapshot's `result` wins. Anything that is not an object yields an
/// empty list. Output is sorted by discovery time, newest first (records
/// without one last), and capped at `limit`.
#[must_use]
pub fn parse_overlap_results(json: &Value, limit: usize) -> Vec<TokenRecord> {
    let Some(entries) = json.as_object() else {
        return Vec::new();
    };

    let mut tokens: Vec<TokenRecord> = entries
        .iter()
        .filter_map(|(token_id, history)| {
            let latest = history.as_array()?.last()?;
            Some(project_snapshot(token_id, latest.get("result").unwrap_or(&Value::Null)))
        })
        .collect();

    // None sorts before Some, so reversing the comparison puts undated records last
    tokens.sort_by(|a, b| b.discovered_at.cmp(&a.discovered_at));
    tokens.truncate(limit);
    tokens
}

fn project_snapshot(token_id: &str, result: &Value) -> TokenRecord {
    let meta = result.get("token_metadata").unwrap_or(&Value::Null);
    let text = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);
    let number = |key: &str| result.get(key).and_then(Value::as_f64).unwrap_or(0.0);

    TokenRecord {
        id: token_id.to_string(),
        symbol: text(meta, "symbol").unwrap_or_default(),
        name: text(meta, "name")
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Unknown".to_string()),
        address: token_id.to_string(),
        grade: result
            .get("grade")
            .and_then(Value::as_str)
            .map(Grade::parse_lenient)
            .unwrap_or_default(),
        overlap_percentage: number("overlap_percentage"),
        concentration: number("concentration"),
        discovered_at: checked_at(token_id, result.get("checked_at")),
        dexscreener_url: dexscreener_url(token_id),
        market: Default::default(),
    }
}

fn checked_at(token_id: &str, raw: Option<&Value>) -> Option<DateTime<Utc>> {
    let raw = raw.filter(|v| !v.is_null() && v.as_str() != Some(""))?;
    let parsed = timestamp_from_value(raw);
    if parsed.is_none() {
        debug!(token = token_id, checked_at = %raw, "Unparseable checked_at, record left undated");
    }
    parsed
}

/// Deterministic sample feed used when no storage is configured
#[must_use]
pub fn sample_tokens(now: DateTime<Utc>) -> Vec<TokenRecord> {
    (0..12u32)
        .map(|i| {
            let address = format!("sample_token_{i}");
            let mut record = TokenRecord::new(&address);
            record.symbol = format!("TOK{i}");
            record.name = format!("Token {i}");
            record.grade = Grade::ALL[i as usize % Grade::ALL.len()];
            record.overlap_percentage = f64::from((i * 7) % 60);
            record.concentration = f64::from((i * 37) % 1000) / 10.0;
            record.discovered_at = Some(now - ChronoDuration::minutes(i64::from(i) * 97));
            record
        })
        .collect()
}

/// Reads the overlap feed from the configured store
#[derive(Clone)]
pub struct TokenFeedReader {
    store: Option<Arc<dyn ObjectStore>>,
    file: String,
    max_records: usize,
    sample_fallback: bool,
}

impl TokenFeedReader {
    /// Reader for `file` in `store`
    pub fn new(
        store: Option<Arc<dyn ObjectStore>>,
        file: impl Into<String>,
        max_records: usize,
        sample_fallback: bool,
    ) -> Self {
        Self {
            store,
            file: file.into(),
            max_records,
            sample_fallback,
        }
    }

    async fn fetch(&self, store: &dyn ObjectStore) -> Result<Vec<TokenRecord>> {
        let data = store.download(&self.file).await?;
        let json: Value = serde_json::from_slice(&data)?;
        let tokens = parse_overlap_results(&json, self.max_records);
        debug!(store = store.name(), count = tokens.len(), "Parsed overlap feed");
        Ok(tokens)
    }

    /// Download and parse the feed.
    ///
    /// Never fails: a missing store, failed download or unparseable file
    /// all yield an empty list.
    pub async fn load_records(&self) -> Vec<TokenRecord> {
        let Some(store) = self.store.as_deref() else {
            return Vec::new();
        };
        self.fetch(store).await.unwrap_or_else(|e| {
            warn!(store = store.name(), file = %self.file, error = %e, "Overlap feed unavailable");
            Vec::new()
        })
    }

    /// Read the feed and tag where the data came from, substituting the
    /// sample feed when storage is unconfigured or has nothing to serve
    pub async fn load(&self) -> FeedSnapshot {
        let now = Utc::now();
        let snapshot = |tokens: Vec<TokenRecord>, data_source: DataSource, fetch_failed: bool| FeedSnapshot {
            tokens,
            last_updated: now,
            data_source,
            fetch_failed,
        };

        let Some(store) = self.store.as_deref() else {
            let tokens = if self.sample_fallback { sample_tokens(now) } else { Vec::new() };
            return snapshot(tokens, DataSource::Mock, false);
        };
        let source = if store.name() == "local" {
            DataSource::LocalJson
        } else {
            DataSource::SupabaseJson
        };

        match self.fetch(store).await {
            Ok(tokens) if !tokens.is_empty() || !self.sample_fallback => snapshot(tokens, source, false),
            Ok(_) => {
                info!(store = store.name(), "Overlap feed is empty, serving sample tokens");
                snapshot(sample_tokens(now), DataSource::Mock, false)
            }
            Err(e) if self.sample_fallback => {
                warn!(store = store.name(), file = %self.file, error = %e, "Overlap feed unavailable, serving sample tokens");
                snapshot(sample_tokens(now), DataSource::ErrorFallback, true)
            }
            Err(e) => {
                warn!(store = store.name(), file = %self.file, error = %e, "Overlap feed unavailable");
                snapshot(Vec::new(), source, true)
            }
        }
    }
}
