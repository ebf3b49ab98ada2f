//! User-facing cancel and retry.
//!
//! Both operations read the job, ask the state machine whether the request is
//! legal, and then perform the guarded write with the event's source set. A
//! guarded write that modifies nothing means another actor moved the job after
//! the read; that is reported as [`ServiceError::InvalidJobState`] and nothing
//! is published.

use chrono::Utc;
use tracing::{info, warn};

use jobflow_core::{can_transition, Job, JobEvent, JobId, JobStatus, TransitionError};
use jobflow_events::{encode, CancellationMessage, MessageBus, CANCELLATIONS_TOPIC};

use crate::jobs::{ErrorUpdate, JobStore, JobUpdate};

use super::error::ServiceError;
use super::ingestion::publish_work;

#[derive(Debug, Clone)]
pub struct ControlService<S, B> {
    store: S,
    bus: B,
}

impl<S, B> ControlService<S, B>
where
    S: JobStore,
    B: MessageBus,
{
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    /// Request cancellation of a pending or processing job.
    ///
    /// The job moves to `cancelling`; it becomes `cancelled` once the
    /// cancellation consumer handles the published request.
    pub async fn cancel(&self, id: JobId) -> Result<Job, ServiceError> {
        let job = self.load(id).await?;
        let event = JobEvent::UserCancelRequest;

        let transition = can_transition(job.status, event).map_err(|_| {
            ServiceError::InvalidJobState {
                id,
                status: job.status,
            }
        })?;

        self.guarded_write(&job, event, transition.to, JobUpdate::none())
            .await?;

        let message = CancellationMessage {
            job_id: id,
            cancelled_at: Utc::now(),
        };
        match encode(&message) {
            Ok(payload) => {
                if let Err(e) = self.bus.publish(CANCELLATIONS_TOPIC, payload).await {
                    warn!(job_id = %id, error = %e, "failed to publish cancellation request");
                }
            }
            Err(e) => warn!(job_id = %id, error = %e, "failed to encode cancellation request"),
        }

        info!(job_id = %id, from = %job.status, "cancellation requested");
        self.load(id).await
    }

    /// Send a failed job back to `pending`, using up one retry.
    pub async fn retry(&self, id: JobId) -> Result<Job, ServiceError> {
        let job = self.load(id).await?;
        let event = JobEvent::UserRetry {
            retry_count: job.retry_count,
        };

        let transition = can_transition(job.status, event).map_err(|e| match e {
            TransitionError::RetriesExhausted { retry_count } => {
                ServiceError::MaxRetriesReached { id, retry_count }
            }
            TransitionError::InvalidTransition { from, .. } => {
                ServiceError::InvalidJobState { id, status: from }
            }
        })?;

        let update = JobUpdate {
            error_message: ErrorUpdate::Keep,
            retry_count: transition.retry_count,
        };
        self.guarded_write(&job, event, transition.to, update).await?;

        // The write has committed; announce it before anything else can fail.
        publish_work(&self.bus, &job).await;
        info!(job_id = %id, retry_count = ?transition.retry_count, "job retried");

        self.load(id).await
    }

    async fn load(&self, id: JobId) -> Result<Job, ServiceError> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or(ServiceError::JobNotFound(id))
    }

    async fn guarded_write(
        &self,
        job: &Job,
        event: JobEvent,
        to: JobStatus,
        update: JobUpdate,
    ) -> Result<(), ServiceError> {
        let modified = self
            .store
            .conditional_update_status(job.id, event.sources(), to, update)
            .await?;

        if modified == 0 {
            // Lost a race since the read; report what the job is now.
            let current = self.load(job.id).await?;
            warn!(job_id = %job.id, event = %event, status = %current.status, "guarded write lost a race");
            return Err(ServiceError::InvalidJobState {
                id: job.id,
                status: current.status,
            });
        }
        Ok(())
    }
}
