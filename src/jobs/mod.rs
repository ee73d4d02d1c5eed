//! ROI analysis submission and job polling
//!
//! A request is checked locally (shape, then token freshness on the market
//! API) before anything is sent to the analysis backend. The backend either
//! answers with the analysis straight away or queues a job, which
//! [`JobTracker`] polls until it completes, fails or times out. Completed
//! analyses land in the [`ResultBook`] and the storage archive.

mod backend;
mod results;
mod tracker;

pub use backend::{AnalysisBackend, JobReport, RailwayBackend, Submission, parse_status};
pub use results::ResultBook;
pub use tracker::JobTracker;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use alpha_core::{AnalysisJob, AnalysisRequest, AnalysisResult};
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{BackendConfig, JobsConfig};
use crate::market::{MarketData, check_freshness};
use crate::storage::AnalysisArchive;
use crate::{Error, Result};

/// Reject malformed requests without touching the network
///
/// # Errors
///
/// Returns [`Error::Validation`] for an empty or oversized token list,
/// blank addresses or duplicates.
pub fn validate_shape(request: &AnalysisRequest, max_tokens: usize) -> Result<()> {
    if request.tokens.is_empty() {
        return Err(Error::Validation("at least one token address is required".into()));
    }
    if request.tokens.len() > max_tokens {
        return Err(Error::Validation(format!(
            "at most {max_tokens} tokens per analysis, got {}",
            request.tokens.len()
        )));
    }

    let mut seen = HashSet::new();
    for token in &request.tokens {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::Validation("token address must not be blank".into()));
        }
        if !seen.insert(token) {
            return Err(Error::Validation(format!("duplicate token address: {token}")));
        }
    }
    Ok(())
}

/// Build the configured backend client, if any
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn backend_from_config(config: &BackendConfig) -> Result<Option<Arc<dyn AnalysisBackend>>> {
    match config.url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => {
            info!(url, "Using analysis backend");
            Ok(Some(Arc::new(RailwayBackend::new(url, config.timeout)?)))
        }
        None => {
            warn!("ALPHA_API_URL not set, analysis submission disabled");
            Ok(None)
        }
    }
}

/// Validates and forwards analysis requests
#[derive(Clone)]
pub struct Submitter {
    market: Option<Arc<dyn MarketData>>,
    backend: Option<Arc<dyn AnalysisBackend>>,
    max_tokens: usize,
    max_token_age: Duration,
}

impl Submitter {
    /// Submitter using `market` for freshness checks and `backend` for analysis
    pub fn new(
        market: Option<Arc<dyn MarketData>>,
        backend: Option<Arc<dyn AnalysisBackend>>,
        config: &JobsConfig,
    ) -> Self {
        Self {
            market,
            backend,
            max_tokens: config.max_tokens,
            max_token_age: config.max_token_age,
        }
    }

    /// The backend, when configured
    #[must_use]
    pub fn backend(&self) -> Option<Arc<dyn AnalysisBackend>> {
        self.backend.clone()
    }

    /// Check every token's pair age concurrently
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming each token that is not fresh.
    pub async fn check_tokens(&self, tokens: &[String]) -> Result<()> {
        let Some(market) = self.market.as_deref() else {
            warn!("Market data disabled, skipping token freshness check");
            return Ok(());
        };

        let now = Utc::now();
        let checks = tokens
            .iter()
            .map(|t| check_freshness(market, t.trim(), now, self.max_token_age));
        let problems: Vec<String> = join_all(checks)
            .await
            .into_iter()
            .zip(tokens)
            .filter(|(f, _)| !f.is_fresh())
            .map(|(f, t)| format!("{}: {f}", t.trim()))
            .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "tokens must have a trading pair younger than {}h ({})",
                self.max_token_age.as_secs() / 3600,
                problems.join("; ")
            )))
        }
    }

    /// Validate `request` and send it to the backend.
    ///
    /// Nothing is sent when validation fails.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for local rejections, [`Error::Config`] when no
    /// backend is configured, and whatever the backend call returns.
    pub async fn submit(&self, request: &AnalysisRequest) -> Result<Submission> {
        validate_shape(request, self.max_tokens)?;
        let Some(backend) = self.backend.as_deref() else {
            return Err(Error::Config("analysis backend is not configured".into()));
        };
        self.check_tokens(&request.tokens).await?;
        backend.submit(request).await
    }
}

/// What happened to a submission
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// The backend answered synchronously
    Completed(AnalysisResult),
    /// A job is being polled
    Queued(AnalysisJob),
}

/// Submission, tracking and history, wired together
pub struct AnalysisService {
    submitter: Submitter,
    tracker: JobTracker,
    book: Arc<ResultBook>,
    archive: AnalysisArchive,
}

impl AnalysisService {
    /// Wire up a service from its parts
    pub fn new(submitter: Submitter, jobs: &JobsConfig, archive: AnalysisArchive) -> Self {
        let book = Arc::new(ResultBook::with_limit(jobs.max_results));
        let tracker = JobTracker::new(jobs, Arc::clone(&book), archive.clone());
        Self {
            submitter,
            tracker,
            book,
            archive,
        }
    }

    /// Submit `request`; immediate results are recorded, queued jobs tracked
    ///
    /// # Errors
    ///
    /// See [`Submitter::submit`].
    pub async fn submit(&self, mut request: AnalysisRequest) -> Result<SubmitOutcome> {
        request.tokens = request.tokens.iter().map(|t| t.trim().to_string()).collect();
        match self.submitter.submit(&request).await? {
            Submission::Immediate(mut result) => {
                let id = if result.id.is_empty() {
                    uuid::Uuid::new_v4().to_string()
                } else {
                    result.id.clone()
                };
                result.fill_from_request(&id, &request);
                info!(id = %id, records = result.records.len(), "Analysis completed synchronously");
                tracker::record_result(&self.book, &self.archive, result.clone()).await;
                Ok(SubmitOutcome::Completed(result))
            }
            Submission::Queued { job_id, report } => {
                let backend = self
                    .submitter
                    .backend()
                    .ok_or_else(|| Error::Config("analysis backend is not configured".into()))?;
                Ok(SubmitOutcome::Queued(
                    self.tracker.track(&job_id, report, request, backend).await,
                ))
            }
        }
    }

    /// Saved analyses merged with results completed in this process, newest first
    pub async fn history(&self) -> Vec<AnalysisResult> {
        self.book.merged_with(self.archive.list_all().await)
    }

    /// The job tracker
    #[must_use]
    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    /// The in-process result book
    #[must_use]
    pub fn book(&self) -> &ResultBook {
        &self.book
    }

    /// Whether submissions can reach a backend
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.submitter.backend.is_some()
    }

    /// Stop all polling
    pub async fn shutdown(&self) {
        self.tracker.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::PairSnapshot;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request(tokens: &[&str]) -> AnalysisRequest {
        serde_json::from_value(serde_json::json!({ "tokens": tokens })).unwrap()
    }

    struct AgedMarket {
        age_hours: i64,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketData for AgedMarket {
        async fn token_pair(&self, _address: &str) -> Result<Option<PairSnapshot>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let created = Utc::now() - chrono::Duration::hours(self.age_hours);
            Ok(Some(PairSnapshot {
                pair_created_at: Some(created.timestamp_millis()),
                ..Default::default()
            }))
        }
    }

    #[derive(Default)]
    struct CountingBackend {
        submits: AtomicUsize,
    }

    #[async_trait]
    impl AnalysisBackend for CountingBackend {
        async fn submit(&self, _request: &AnalysisRequest) -> Result<Submission> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            Ok(Submission::Immediate(AnalysisResult::default()))
        }

        async fn status(&self, _job_id: &str) -> Result<JobReport> {
            Err(Error::Internal("not used".into()))
        }
    }

    fn submitter(age_hours: i64) -> (Submitter, Arc<AgedMarket>, Arc<CountingBackend>) {
        let market = Arc::new(AgedMarket {
            age_hours,
            calls: AtomicUsize::new(0),
        });
        let backend = Arc::new(CountingBackend::default());
        let submitter = Submitter::new(
            Some(market.clone() as Arc<dyn MarketData>),
            Some(backend.clone() as Arc<dyn AnalysisBackend>),
            &JobsConfig::default(),
        );
        (submitter, market, backend)
    }

    #[test]
    fn test_shape_validation() {
        assert!(validate_shape(&request(&["A"]), 3).is_ok());
        assert!(validate_shape(&request(&["A", "B", "C"]), 3).is_ok());
        let bad_requests: [&[&str]; 4] = [&[], &["A", "B", "C", "D"], &["A", "  "], &["A", "A "]];
        for bad in bad_requests {
            assert!(matches!(
                validate_shape(&request(bad), 3),
                Err(Error::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_too_many_tokens_never_reach_network() {
        let (submitter, market, backend) = submitter(1);
        let err = submitter
            .submit(&request(&["A", "B", "C", "D"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(market.calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.submits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_token_blocks_submission() {
        let (submitter, market, backend) = submitter(72);
        let err = submitter.submit(&request(&["A", "B"])).await.unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m.contains("A:") && m.contains("B:")));
        assert_eq!(market.calls.load(Ordering::SeqCst), 2);
        assert_eq!(backend.submits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fresh_tokens_are_submitted_once() {
        let (submitter, _market, backend) = submitter(3);
        let sub = submitter.submit(&request(&["A"])).await.unwrap();
        assert!(matches!(sub, Submission::Immediate(_)));
        assert_eq!(backend.submits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_backend() {
        let submitter = Submitter::new(None, None, &JobsConfig::default());
        assert!(matches!(
            submitter.submit(&request(&["A"])).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_service_records_immediate_results() {
        let (submitter, _market, _backend) = submitter(3);
        let service = AnalysisService::new(
            submitter,
            &JobsConfig::default(),
            AnalysisArchive::new(None, "recent_analyses", 10),
        );
        let outcome = service.submit(request(&[" A "])).await.unwrap();
        let SubmitOutcome::Completed(result) = outcome else {
            panic!("expected an immediate result");
        };
        assert!(!result.id.is_empty());
        assert_eq!(result.tokens, vec!["A".to_string()]);
        assert!(result.timestamp.is_some());

        let history = service.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, result.id);
    }
}
