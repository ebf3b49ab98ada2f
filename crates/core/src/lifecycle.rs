//! Job state machine (pure decision logic, no IO).
//!
//! | from | event | to |
//! |---|---|---|
//! | pending | worker claims | processing |
//! | processing | worker success | completed |
//! | processing | worker failure | failed |
//! | pending, processing | user cancel request | cancelling |
//! | pending, processing, cancelling | cancel confirmed | cancelled |
//! | failed (retry_count < 3) | user retry | pending (retry_count + 1) |
//!
//! Every guarded store write uses [`JobEvent::sources`] as its expected status
//! set, so the table above is the single definition of which writes are legal.

use crate::error::TransitionError;
use crate::job::{JobStatus, MAX_RETRIES};

/// Something that wants to move a job to another status.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JobEvent {
    WorkerClaims,
    WorkerSuccess,
    WorkerFailure,
    UserCancelRequest,
    CancelConfirmed,
    /// Carries the job's retry count at the time of the request.
    UserRetry { retry_count: u32 },
}

impl JobEvent {
    /// Statuses this event may leave from.
    pub fn sources(&self) -> &'static [JobStatus] {
        match self {
            JobEvent::WorkerClaims => &[JobStatus::Pending],
            JobEvent::WorkerSuccess | JobEvent::WorkerFailure => &[JobStatus::Processing],
            JobEvent::UserCancelRequest => &[JobStatus::Pending, JobStatus::Processing],
            JobEvent::CancelConfirmed => &[
                JobStatus::Pending,
                JobStatus::Processing,
                JobStatus::Cancelling,
            ],
            JobEvent::UserRetry { .. } => &[JobStatus::Failed],
        }
    }

    /// Status the job ends up in when the event is accepted.
    pub fn target(&self) -> JobStatus {
        match self {
            JobEvent::WorkerClaims => JobStatus::Processing,
            JobEvent::WorkerSuccess => JobStatus::Completed,
            JobEvent::WorkerFailure => JobStatus::Failed,
            JobEvent::UserCancelRequest => JobStatus::Cancelling,
            JobEvent::CancelConfirmed => JobStatus::Cancelled,
            JobEvent::UserRetry { .. } => JobStatus::Pending,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::WorkerClaims => "worker-claims",
            JobEvent::WorkerSuccess => "worker-success",
            JobEvent::WorkerFailure => "worker-failure",
            JobEvent::UserCancelRequest => "user-cancel-request",
            JobEvent::CancelConfirmed => "cancel-confirmed",
            JobEvent::UserRetry { .. } => "user-retry",
        }
    }
}

impl core::fmt::Display for JobEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// An accepted transition.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Transition {
    pub to: JobStatus,
    /// New retry count, when the transition changes it.
    pub retry_count: Option<u32>,
}

/// Decide whether `event` may be applied to a job currently in `current`.
pub fn can_transition(current: JobStatus, event: JobEvent) -> Result<Transition, TransitionError> {
    if !event.sources().contains(&current) {
        return Err(TransitionError::InvalidTransition {
            from: current,
            event,
        });
    }

    let retry_count = match event {
        JobEvent::UserRetry { retry_count } if retry_count >= MAX_RETRIES => {
            return Err(TransitionError::RetriesExhausted { retry_count });
        }
        JobEvent::UserRetry { retry_count } => Some(retry_count + 1),
        _ => None,
    };

    Ok(Transition {
        to: event.target(),
        retry_count,
    })
}
