//! Domain error model.

use thiserror::Error;

use crate::job::JobStatus;
use crate::lifecycle::JobEvent;

/// Bad caller input. Never retried; surfaced to the caller as a client error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Name of the offending input field (`name`, `job_type`, `id`, ...).
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Rejection from the job state machine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The event is not legal from the current status.
    #[error("cannot apply {event} to a job in status {from}")]
    InvalidTransition { from: JobStatus, event: JobEvent },

    /// A failed job has already used every retry.
    #[error("job has already been retried {retry_count} times")]
    RetriesExhausted { retry_count: u32 },
}
