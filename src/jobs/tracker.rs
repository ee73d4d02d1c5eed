//! Per-job status polling

use std::sync::Arc;
use std::time::Duration;

use alpha_core::{AnalysisJob, AnalysisRequest, AnalysisResult, JobStatus};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backend::{AnalysisBackend, JobReport};
use super::results::ResultBook;
use crate::config::JobsConfig;
use crate::storage::AnalysisArchive;

/// Tracks queued jobs, one polling task per job
pub struct JobTracker {
    inner: Arc<Inner>,
    poll_interval: Duration,
    timeout: Duration,
    retain_finished: Duration,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

struct Inner {
    jobs: DashMap<String, AnalysisJob>,
    book: Arc<ResultBook>,
    archive: AnalysisArchive,
}

impl JobTracker {
    /// Tracker polling on the configured interval; finished jobs are
    /// forgotten `retain_finished` after they end
    pub fn new(config: &JobsConfig, book: Arc<ResultBook>, archive: AnalysisArchive) -> Self {
        Self {
            inner: Arc::new(Inner {
                jobs: DashMap::new(),
                book,
                archive,
            }),
            poll_interval: config.poll_interval,
            timeout: config.timeout,
            retain_finished: config.retain_finished,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start tracking a queued job. The submission's own report is applied
    /// first; a polling task is spawned only if that leaves the job open.
    pub async fn track(
        &self,
        job_id: &str,
        report: JobReport,
        request: AnalysisRequest,
        backend: Arc<dyn AnalysisBackend>,
    ) -> AnalysisJob {
        self.prune_finished();

        let pending = AnalysisJob::new(job_id, Some(request));
        self.inner.jobs.insert(job_id.to_string(), pending.clone());
        let terminal = self.inner.apply(job_id, report).await;
        let job = self.get(job_id).unwrap_or(pending);
        info!(job_id, status = ?job.status, "Tracking analysis job");

        if terminal {
            return job;
        }

        let handle = tokio::spawn(poll_job(
            Arc::clone(&self.inner),
            job_id.to_string(),
            backend,
            self.poll_interval,
            self.timeout,
            self.cancel.child_token(),
        ));
        let mut tasks = self.tasks.lock();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
        job
    }

    /// Drop terminal jobs that ended more than `retain_finished` ago
    pub fn prune_finished(&self) {
        let Ok(keep) = chrono::Duration::from_std(self.retain_finished) else {
            return;
        };
        let cutoff = Utc::now() - keep;
        let before = self.inner.jobs.len();
        self.inner.jobs.retain(|_, job| {
            !(job.status.is_terminal() && job.completed_at.is_some_and(|at| at < cutoff))
        });
        let pruned = before.saturating_sub(self.inner.jobs.len());
        if pruned > 0 {
            debug!(pruned, "Forgot finished jobs");
        }
    }

    /// Current state of one job
    #[must_use]
    pub fn get(&self, job_id: &str) -> Option<AnalysisJob> {
        self.inner.jobs.get(job_id).map(|j| j.clone())
    }

    /// All jobs, newest first
    #[must_use]
    pub fn list(&self) -> Vec<AnalysisJob> {
        let mut jobs: Vec<AnalysisJob> = self.inner.jobs.iter().map(|j| j.value().clone()).collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Jobs not yet terminal
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner
            .jobs
            .iter()
            .filter(|j| !j.status.is_terminal())
            .count()
    }

    /// Wait until `job_id` reaches a terminal state, checking every `every`
    pub async fn wait(&self, job_id: &str, every: Duration) -> Option<AnalysisJob> {
        loop {
            let job = self.get(job_id)?;
            if job.status.is_terminal() {
                return Some(job);
            }
            sleep(every).await;
        }
    }

    /// Cancel every polling task and wait for them to stop
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
        debug!("Job tracker stopped");
    }
}

async fn poll_job(
    inner: Arc<Inner>,
    job_id: String,
    backend: Arc<dyn AnalysisBackend>,
    poll_interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) {
    let deadline = sleep(timeout);
    tokio::pin!(deadline);
    let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!(job_id = %job_id, "Polling cancelled");
                return;
            }
            () = &mut deadline => {
                if let Some(mut job) = inner.jobs.get_mut(&job_id) {
                    if job.fail("timeout") {
                        warn!(job_id = %job_id, after = ?timeout, "Analysis job timed out");
                    }
                }
                return;
            }
            _ = ticker.tick() => {
                match backend.status(&job_id).await {
                    Ok(report) => {
                        if inner.apply(&job_id, report).await {
                            return;
                        }
                    }
                    Err(e) => warn!(job_id = %job_id, error = %e, "Status poll failed, retrying"),
                }
            }
        }
    }
}

impl Inner {
    /// Apply one poll; returns `true` once the job is terminal
    async fn apply(&self, job_id: &str, report: JobReport) -> bool {
        let completed = {
            let Some(mut job) = self.jobs.get_mut(job_id) else {
                return true;
            };
            match report.status {
                JobStatus::Completed => {
                    let mut result = report.result.unwrap_or_default();
                    if let Some(request) = &job.request {
                        result.fill_from_request(job_id, request);
                    } else if result.id.is_empty() {
                        result.id = job_id.to_string();
                    }
                    job.complete(result.clone()).then_some(result)
                }
                JobStatus::Failed => {
                    let error = report.error.unwrap_or_else(|| "analysis failed".to_string());
                    if job.fail(error.as_str()) {
                        warn!(job_id, error = %error, "Analysis job failed");
                    }
                    None
                }
                next => {
                    if job.advance(next) {
                        debug!(job_id, status = ?next, "Job status changed");
                    }
                    None
                }
            }
        };

        if let Some(result) = completed {
            info!(job_id, records = result.records.len(), "Analysis job completed");
            self.record(result).await;
        }

        self.jobs
            .get(job_id)
            .is_none_or(|j| j.status.is_terminal())
    }

    async fn record(&self, result: AnalysisResult) {
        record_result(&self.book, &self.archive, result).await;
    }
}

/// Record a synchronously returned result the same way a completed job is
pub(crate) async fn record_result(book: &ResultBook, archive: &AnalysisArchive, result: AnalysisResult) {
    if archive.is_enabled() {
        if let Err(e) = archive.save(&result).await {
            warn!(id = %result.id, error = %e, "Failed to archive analysis");
        }
    }
    book.merge(result);
}
