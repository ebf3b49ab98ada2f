//! The `Job` record and its enumerations.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::JobId;

/// Maximum number of user retries a job may receive.
pub const MAX_RETRIES: u32 = 3;

/// Opaque job configuration, passed through to the worker unmodified.
pub type JobConfig = serde_json::Map<String, serde_json::Value>;

/// Kind of work a job represents. Closed set, fixed at creation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Process,
    Analyze,
    Export,
}

impl JobType {
    pub const ALL: [JobType; 3] = [JobType::Process, JobType::Analyze, JobType::Export];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Process => "process",
            JobType::Analyze => "analyze",
            JobType::Export => "export",
        }
    }
}

impl core::fmt::Display for JobType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                ValidationError::new(
                    "job_type",
                    format!("invalid job type '{s}', must be one of: process, analyze, export"),
                )
            })
    }
}

/// Lifecycle status of a job. Exactly one holds at any instant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Persisted, waiting for a worker to claim it
    Pending,
    /// Claimed by a worker
    Processing,
    /// Finished successfully
    Completed,
    /// Finished with an error; may be retried while retries remain
    Failed,
    /// Cancellation requested, awaiting confirmation
    Cancelling,
    /// Cancellation confirmed
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelling,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelling => "cancelling",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// No worker will act on a job in this status.
    ///
    /// `Failed` counts as terminal here even when retries remain; use
    /// [`Job::is_retryable`] / [`Job::is_final`] to ask whether it can move again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// A user may request cancellation from this status.
    pub fn accepts_cancellation(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| ValidationError::new("status", format!("unknown job status '{s}'")))
    }
}

/// A unit of asynchronous work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub job_type: JobType,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<JobConfig>,
    /// Set on transition into `Failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Number of user retries so far, `0..=MAX_RETRIES`
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job with a fresh id.
    pub fn new(name: impl Into<String>, job_type: JobType, config: Option<JobConfig>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            name: name.into(),
            job_type,
            status: JobStatus::Pending,
            config,
            error_message: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Failed, with retries left.
    pub fn is_retryable(&self) -> bool {
        self.status == JobStatus::Failed && self.retry_count < MAX_RETRIES
    }

    /// No event can ever move this job again.
    pub fn is_final(&self) -> bool {
        self.status.is_terminal() && !self.is_retryable()
    }
}
