//! Analysis backend client

use std::time::Duration;

use alpha_core::{AnalysisRequest, AnalysisResult, JobStatus};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::debug;

use crate::{Error, Result};

/// What the backend did with a submission
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Analysis ran synchronously
    Immediate(AnalysisResult),
    /// Analysis was queued as a background job
    Queued {
        /// Backend job id
        job_id: String,
        /// Initial status, with the result or error when already terminal
        report: JobReport,
    },
}

/// One status poll
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    /// Reported status
    pub status: JobStatus,
    /// Result, when completed
    pub result: Option<AnalysisResult>,
    /// Error, when failed
    pub error: Option<String>,
}

/// The external ROI analysis service
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Submit a validated request
    async fn submit(&self, request: &AnalysisRequest) -> Result<Submission>;

    /// Fetch the status of a queued job
    async fn status(&self, job_id: &str) -> Result<JobReport>;
}

/// HTTP client for the analysis service (`/analyze`, `/status/{job_id}`)
pub struct RailwayBackend {
    client: Client,
    base_url: String,
}

impl RailwayBackend {
    /// Client for the service at `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build backend client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Turn a non-success response into [`Error::Backend`]
    async fn check(response: Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::backend(status.as_u16(), error_message(&body, status.as_str())));
        }
        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|e| Error::Transport(format!("invalid backend response: {e}")))
    }
}

#[async_trait]
impl AnalysisBackend for RailwayBackend {
    async fn submit(&self, request: &AnalysisRequest) -> Result<Submission> {
        let url = format!("{}/analyze", self.base_url);
        debug!(url, tokens = ?request.tokens, "Submitting analysis");
        let response = self.client.post(url).json(request).send().await?;
        parse_submission(Self::check(response).await?)
    }

    async fn status(&self, job_id: &str) -> Result<JobReport> {
        let url = format!("{}/status/{job_id}", self.base_url);
        let response = self.client.get(url).send().await?;
        parse_report(Self::check(response).await?)
    }
}

/// Prefer a JSON `detail`/`error`/`message` field, else the raw body
fn error_message(body: &str, fallback: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        ["detail", "error", "message"]
            .iter()
            .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
    });
    match from_json {
        Some(msg) => msg,
        None if body.trim().is_empty() => fallback.to_string(),
        None => body.trim().to_string(),
    }
}

/// Map the status labels the service has used over time
#[must_use]
pub fn parse_status(label: &str) -> Option<JobStatus> {
    match label.trim().to_ascii_lowercase().as_str() {
        "pending" | "queued" | "submitted" => Some(JobStatus::Pending),
        "processing" | "running" | "in_progress" | "started" => Some(JobStatus::Processing),
        "completed" | "complete" | "done" | "success" | "finished" => Some(JobStatus::Completed),
        "failed" | "error" | "cancelled" => Some(JobStatus::Failed),
        _ => None,
    }
}

/// `{job_id, status}` means queued; anything else is the result itself,
/// optionally wrapped in `analysis` or `result`
fn parse_submission(body: Value) -> Result<Submission> {
    if let Some(job_id) = body.get("job_id").and_then(Value::as_str) {
        let status = body
            .get("status")
            .and_then(Value::as_str)
            .and_then(parse_status)
            .unwrap_or(JobStatus::Pending);
        return Ok(Submission::Queued {
            job_id: job_id.to_string(),
            report: report_with_status(&body, status)?,
        });
    }
    Ok(Submission::Immediate(unwrap_result(body)?))
}

fn unwrap_result(mut body: Value) -> Result<AnalysisResult> {
    for key in ["analysis", "result"] {
        if body.get(key).is_some_and(Value::is_object) {
            body = body[key].take();
            break;
        }
    }
    if !body.is_object() {
        return Err(Error::Transport("backend returned no analysis".into()));
    }
    Ok(serde_json::from_value(body)?)
}

fn parse_report(body: Value) -> Result<JobReport> {
    let label = body.get("status").and_then(Value::as_str).unwrap_or_default();
    let status = parse_status(label)
        .ok_or_else(|| Error::Transport(format!("unknown job status {label:?}")))?;
    report_with_status(&body, status)
}

fn report_with_status(body: &Value, status: JobStatus) -> Result<JobReport> {
    let result = match body.get("result") {
        Some(v) if v.is_object() => Some(serde_json::from_value(v.clone())?),
        _ => None,
    };
    let error = body
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(JobReport { status, result, error })
}
