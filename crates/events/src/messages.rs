//! Wire messages exchanged over the bus, plus topic and group names.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use jobflow_core::{Job, JobConfig, JobId, JobType};

/// Work topic: newly submitted and retried jobs.
pub const JOBS_TOPIC: &str = "jobs";
/// Cancellation topic: requests to finalize a cancellation.
pub const CANCELLATIONS_TOPIC: &str = "job_cancellations";
/// Dead-letter topic: failed jobs, for triage.
pub const DLQ_TOPIC: &str = "jobs_dlq";

/// Consumer group of the worker pipeline on [`JOBS_TOPIC`].
pub const WORKER_GROUP: &str = "job-worker";
/// Consumer group of the cancellation consumer on [`CANCELLATIONS_TOPIC`].
pub const CANCELLATION_GROUP: &str = "job-worker-cancellations";

/// A job handed to the workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkMessage {
    pub job_id: JobId,
    pub name: String,
    pub job_type: JobType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<JobConfig>,
    pub created_at: DateTime<Utc>,
}

impl WorkMessage {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            name: job.name.clone(),
            job_type: job.job_type,
            config: job.config.clone(),
            created_at: job.created_at,
        }
    }
}

/// A request to finalize a job's cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationMessage {
    pub job_id: JobId,
    pub cancelled_at: DateTime<Utc>,
}

/// Record of a job that failed processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterMessage {
    pub job_id: JobId,
    pub failed_at: DateTime<Utc>,
    pub error_message: String,
    pub retry_count: u32,
}

/// Encode a message as JSON bytes.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(message)
}

/// Decode a message from JSON bytes.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(payload)
}
