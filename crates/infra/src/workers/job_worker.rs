//! Work-topic consumer: claims, processes and finalizes jobs.
//!
//! Per message:
//!
//! 1. Decode; malformed payloads are logged and dropped
//! 2. Claim with a guarded `pending -> processing` write; 0 rows means another
//!    delivery or actor got there first and the message is dropped
//! 3. Run the processor, racing it against shutdown
//! 4. Re-read the job and stop if it is `cancelling` / `cancelled`
//! 5. Finalize with a guarded `processing -> completed | failed` write, so a
//!    cancellation landing after step 4 still wins
//! 6. On failure, publish a dead-letter record (best effort)

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use jobflow_core::{JobEvent, JobId, JobStatus};
use jobflow_events::{
    decode, encode, BusError, DeadLetterMessage, Delivery, MessageBus, Subscription, WorkMessage,
    DLQ_TOPIC, JOBS_TOPIC, WORKER_GROUP,
};

use crate::jobs::{JobStore, JobUpdate};

use super::handle::{record, WorkerHandle};
use super::processor::{JobProcessor, JobResult};

const WORKER_NAME: &str = "job-worker";

/// Counters kept by a running [`JobWorker`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub received: u64,
    pub malformed: u64,
    /// Deliveries whose claim modified nothing (duplicate or no longer pending).
    pub skipped: u64,
    pub completed: u64,
    pub failed: u64,
    /// Processed jobs whose result was discarded because a cancellation won.
    pub cancelled_midflight: u64,
    /// Jobs left `processing` by shutdown.
    pub abandoned: u64,
    pub dlq_publish_failures: u64,
    pub store_errors: u64,
    pub read_errors: u64,
}

/// Consumer of the work topic.
#[derive(Debug)]
pub struct JobWorker;

impl JobWorker {
    /// Join the worker group on the work topic and start consuming.
    ///
    /// The worker stops when `shutdown` is cancelled, when the returned handle is
    /// shut down, or when the subscription closes.
    pub async fn spawn<S, B, P>(
        store: S,
        bus: B,
        processor: P,
        shutdown: CancellationToken,
    ) -> Result<WorkerHandle<WorkerStats>, BusError>
    where
        S: JobStore + 'static,
        B: MessageBus + 'static,
        P: JobProcessor + 'static,
    {
        let sub = bus.subscribe(JOBS_TOPIC, WORKER_GROUP).await?;
        let stats = Arc::new(Mutex::new(WorkerStats::default()));

        let pipeline = Pipeline {
            store,
            bus,
            processor,
            shutdown: shutdown.clone(),
            stats: stats.clone(),
        };
        let join = tokio::spawn(pipeline.run(sub));

        info!(worker = WORKER_NAME, topic = JOBS_TOPIC, group = WORKER_GROUP, "worker started");
        Ok(WorkerHandle::new(WORKER_NAME, shutdown, join, stats))
    }
}

enum Flow {
    Continue,
    Stop,
}

struct Pipeline<S, B, P> {
    store: S,
    bus: B,
    processor: P,
    shutdown: CancellationToken,
    stats: Arc<Mutex<WorkerStats>>,
}

impl<S, B, P> Pipeline<S, B, P>
where
    S: JobStore,
    B: MessageBus,
    P: JobProcessor,
{
    async fn run(self, sub: Subscription) {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = sub.recv() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    // A job abandoned by shutdown stays unacknowledged.
                    if let Flow::Stop = self.handle(&delivery).await {
                        break;
                    }
                    sub.ack(&delivery);
                }
                Some(Err(e)) => {
                    record(&self.stats, |s| s.read_errors += 1);
                    warn!(worker = WORKER_NAME, error = %e, "failed to read work message");
                }
                None => {
                    info!(worker = WORKER_NAME, "subscription closed");
                    break;
                }
            }
        }

        info!(worker = WORKER_NAME, "worker stopped");
    }

    async fn handle(&self, delivery: &Delivery) -> Flow {
        record(&self.stats, |s| s.received += 1);

        let msg: WorkMessage = match decode(&delivery.payload) {
            Ok(msg) => msg,
            Err(e) => {
                record(&self.stats, |s| s.malformed += 1);
                warn!(worker = WORKER_NAME, delivery_id = %delivery.id, error = %e, "dropping malformed work message");
                return Flow::Continue;
            }
        };
        let id = msg.job_id;

        match self.transition(id, JobEvent::WorkerClaims, JobUpdate::none()).await {
            Some(1) => debug!(job_id = %id, "job claimed"),
            Some(_) => {
                record(&self.stats, |s| s.skipped += 1);
                debug!(job_id = %id, "job not pending; skipping delivery");
                return Flow::Continue;
            }
            None => return Flow::Continue,
        }

        let result = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                record(&self.stats, |s| s.abandoned += 1);
                info!(job_id = %id, "shutdown during processing; job left processing");
                return Flow::Stop;
            }
            result = self.processor.process(&msg) => result,
        };

        // Advisory check; the guarded finalize below is what actually protects a cancellation.
        let retry_count = match self.store.get_by_id(id).await {
            Ok(Some(job)) if matches!(job.status, JobStatus::Cancelling | JobStatus::Cancelled) => {
                record(&self.stats, |s| s.cancelled_midflight += 1);
                info!(job_id = %id, status = %job.status, "job cancelled during processing; discarding result");
                return Flow::Continue;
            }
            Ok(Some(job)) => job.retry_count,
            Ok(None) => 0,
            Err(e) => {
                warn!(job_id = %id, error = %e, "pre-finalize read failed; relying on guarded write");
                0
            }
        };

        let (event, update) = match &result {
            JobResult::Success => (JobEvent::WorkerSuccess, JobUpdate::clear_error()),
            JobResult::Failure(message) => {
                (JobEvent::WorkerFailure, JobUpdate::with_error(message.clone()))
            }
        };

        match self.transition(id, event, update).await {
            Some(1) => {}
            Some(_) => {
                record(&self.stats, |s| s.cancelled_midflight += 1);
                info!(job_id = %id, "job left processing before finalize; discarding result");
                return Flow::Continue;
            }
            None => return Flow::Continue,
        }

        match result {
            JobResult::Success => {
                record(&self.stats, |s| s.completed += 1);
                info!(job_id = %id, "job completed");
            }
            JobResult::Failure(error_message) => {
                record(&self.stats, |s| s.failed += 1);
                info!(job_id = %id, error = %error_message, "job failed");
                self.dead_letter(id, error_message, retry_count).await;
            }
        }

        Flow::Continue
    }

    /// Guarded write for `event`. `None` means the store failed (already logged).
    async fn transition(&self, id: JobId, event: JobEvent, update: JobUpdate) -> Option<u64> {
        match self
            .store
            .conditional_update_status(id, event.sources(), event.target(), update)
            .await
        {
            Ok(modified) => Some(modified),
            Err(e) => {
                record(&self.stats, |s| s.store_errors += 1);
                warn!(job_id = %id, event = %event, error = %e, "guarded write failed");
                None
            }
        }
    }

    async fn dead_letter(&self, job_id: JobId, error_message: String, retry_count: u32) {
        let message = DeadLetterMessage {
            job_id,
            failed_at: Utc::now(),
            error_message,
            retry_count,
        };

        let published = match encode(&message) {
            Ok(payload) => self
                .bus
                .publish(DLQ_TOPIC, payload)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        if let Err(e) = published {
            record(&self.stats, |s| s.dlq_publish_failures += 1);
            warn!(job_id = %job_id, error = %e, "failed to publish dead-letter record");
        }
    }
}
