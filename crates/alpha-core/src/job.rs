//! Analysis jobs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisRequest, AnalysisResult};

/// Lifecycle of an analysis job.
///
/// `Pending -> Processing -> {Completed | Failed}`; a pending job may also
/// go straight to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted, not started
    #[default]
    Pending,
    /// Running on the backend
    Processing,
    /// Finished with a result
    Completed,
    /// Finished with an error
    Failed,
}

impl JobStatus {
    /// Completed or failed
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a forward transition
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Processing) => true,
            (Self::Pending | Self::Processing, n) => n.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// One submitted ROI analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    /// Backend job id
    pub id: String,
    /// Current status
    pub status: JobStatus,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// When the job reached a terminal state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Result, once completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    /// Error, once failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// What was submitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AnalysisRequest>,
}

impl AnalysisJob {
    /// New pending job
    #[must_use]
    pub fn new(id: impl Into<String>, request: Option<AnalysisRequest>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            result: None,
            error: None,
            request,
        }
    }

    /// Move to `next` if that is a forward transition.
    ///
    /// Returns `true` when the status changed.
    pub fn advance(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        true
    }

    /// Mark completed with `result`
    pub fn complete(&mut self, result: AnalysisResult) -> bool {
        if self.advance(JobStatus::Completed) {
            self.result = Some(result);
            true
        } else {
            false
        }
    }

    /// Mark failed with `error`
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.advance(JobStatus::Failed) {
            self.error = Some(error.into());
            true
        } else {
            false
        }
    }
}
