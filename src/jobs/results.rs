//! In-memory book of completed analyses

use alpha_core::AnalysisResult;
use parking_lot::RwLock;

/// Results kept by [`ResultBook::new`]
pub const DEFAULT_MAX_RESULTS: usize = 200;

/// Completed results, de-duplicated by id, newest first
#[derive(Debug)]
pub struct ResultBook {
    results: RwLock<Vec<AnalysisResult>>,
    max_results: usize,
}

impl Default for ResultBook {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_RESULTS)
    }
}

impl ResultBook {
    /// Empty book
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty book holding at most `max_results`, the oldest dropped first
    #[must_use]
    pub fn with_limit(max_results: usize) -> Self {
        Self {
            results: RwLock::new(Vec::new()),
            max_results,
        }
    }

    /// Add or replace a result.
    ///
    /// An existing entry with the same id is replaced unless it is strictly
    /// newer than `incoming`.
    pub fn merge(&self, incoming: AnalysisResult) {
        let mut results = self.results.write();
        merge_into(&mut results, incoming);
        results.truncate(self.max_results);
    }

    /// Snapshot, newest first
    #[must_use]
    pub fn all(&self) -> Vec<AnalysisResult> {
        self.results.read().clone()
    }

    /// Number of results held
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.read().len()
    }

    /// Whether the book is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.read().is_empty()
    }

    /// Merge `others` with the book's contents without modifying the book
    #[must_use]
    pub fn merged_with(&self, others: Vec<AnalysisResult>) -> Vec<AnalysisResult> {
        let mut merged = others;
        merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        for result in self.all() {
            merge_into(&mut merged, result);
        }
        merged
    }
}

fn merge_into(results: &mut Vec<AnalysisResult>, incoming: AnalysisResult) {
    if let Some(pos) = results.iter().position(|r| r.id == incoming.id) {
        if results[pos].timestamp > incoming.timestamp {
            return;
        }
        results.remove(pos);
    }
    // newest first; results without a timestamp go last
    let at = results
        .iter()
        .position(|r| r.timestamp < incoming.timestamp)
        .unwrap_or(results.len());
    results.insert(at, incoming);
}
