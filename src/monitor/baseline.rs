//! First-seen ("call") prices
//!
//! One JSON document maps token id to the USD price the token had the first
//! time a refresh saw it priced. The price never changes while the token
//! stays in the feed; once the token misses enough consecutive refreshes it
//! is evicted, so a later reappearance starts a new baseline.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use alpha_core::TokenRecord;
use tracing::{debug, info, warn};

use crate::Result;

/// Baseline prices plus the in-memory absence counters
#[derive(Debug)]
pub struct BaselineStore {
    path: PathBuf,
    prices: BTreeMap<String, f64>,
    misses: HashMap<String, u32>,
    eviction_misses: u32,
}

impl BaselineStore {
    /// Empty store persisted at `path`
    pub fn new(path: impl Into<PathBuf>, eviction_misses: u32) -> Self {
        Self {
            path: path.into(),
            prices: BTreeMap::new(),
            misses: HashMap::new(),
            eviction_misses: eviction_misses.max(1),
        }
    }

    /// Load the document at `path`; a missing or unreadable file starts empty
    pub fn load(path: impl Into<PathBuf>, eviction_misses: u32) -> Self {
        let mut store = Self::new(path, eviction_misses);
        match std::fs::read(&store.path) {
            Ok(raw) => match serde_json::from_slice::<BTreeMap<String, f64>>(&raw) {
                Ok(prices) => {
                    info!(path = %store.path.display(), count = prices.len(), "Loaded baseline prices");
                    store.prices = prices;
                }
                Err(e) => warn!(path = %store.path.display(), error = %e, "Ignoring unreadable baseline file"),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %store.path.display(), "No baseline file yet");
            }
            Err(e) => warn!(path = %store.path.display(), error = %e, "Failed to read baseline file"),
        }
        store
    }

    /// Where the document lives
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Baseline for `id`
    #[must_use]
    pub fn get(&self, id: &str) -> Option<f64> {
        self.prices.get(id).copied()
    }

    /// Number of tokens with a baseline
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Whether no baseline is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Apply one refresh.
    ///
    /// Sets a baseline for priced records that have none, resets the miss
    /// counter of every present id and evicts ids absent for
    /// `eviction_misses` consecutive refreshes. Returns whether the stored
    /// prices changed.
    pub fn observe(&mut self, records: &[TokenRecord]) -> bool {
        let mut changed = false;
        let present: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();

        for record in records {
            self.misses.remove(&record.id);
            if let Some(price) = record.market.price_usd.filter(|p| p.is_finite() && *p > 0.0) {
                if !self.prices.contains_key(&record.id) {
                    debug!(id = %record.id, price, "Recorded baseline price");
                    self.prices.insert(record.id.clone(), price);
                    changed = true;
                }
            }
        }

        let absent: Vec<String> = self
            .prices
            .keys()
            .filter(|id| !present.contains(id.as_str()))
            .cloned()
            .collect();
        for id in absent {
            let misses = self.misses.entry(id.clone()).or_insert(0);
            *misses += 1;
            if *misses >= self.eviction_misses {
                debug!(id = %id, "Evicted baseline price");
                self.misses.remove(&id);
                self.prices.remove(&id);
                changed = true;
            }
        }

        changed
    }

    /// Write the document, creating parent directories
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self) -> Result<()> {
        write_document(&self.path, &self.prices).await
    }

    /// Copy of the stored prices
    #[must_use]
    pub fn prices(&self) -> BTreeMap<String, f64> {
        self.prices.clone()
    }
}

/// Write `prices` to `path` through a temporary file
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub async fn write_document(path: &Path, prices: &BTreeMap<String, f64>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, serde_json::to_vec_pretty(prices)?).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Percent change from `baseline` to `current`; `None` when either is
/// missing or the baseline is zero
#[must_use]
pub fn change_from_baseline(baseline: Option<f64>, current: Option<f64>) -> Option<f64> {
    let (base, now) = (baseline?, current?);
    if base == 0.0 || !base.is_finite() || !now.is_finite() {
        return None;
    }
    Some((now - base) / base * 100.0)
}
