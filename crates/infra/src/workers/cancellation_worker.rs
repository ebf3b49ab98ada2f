//! Cancellation-topic consumer: confirms requested cancellations.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use jobflow_core::JobEvent;
use jobflow_events::{
    decode, BusError, CancellationMessage, Delivery, MessageBus, Subscription, CANCELLATIONS_TOPIC,
    CANCELLATION_GROUP,
};

use crate::jobs::{JobStore, JobUpdate};

use super::handle::{record, WorkerHandle};

const WORKER_NAME: &str = "cancellation-worker";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CancellationStats {
    pub received: u64,
    pub malformed: u64,
    /// Jobs moved to `cancelled`.
    pub applied: u64,
    /// Requests for jobs that had already finished (including duplicates).
    pub ignored: u64,
    pub store_errors: u64,
    pub read_errors: u64,
}

#[derive(Debug)]
pub struct CancellationWorker;

impl CancellationWorker {
    pub async fn spawn<S, B>(
        store: S,
        bus: B,
        shutdown: CancellationToken,
    ) -> Result<WorkerHandle<CancellationStats>, BusError>
    where
        S: JobStore + 'static,
        B: MessageBus + 'static,
    {
        let sub = bus.subscribe(CANCELLATIONS_TOPIC, CANCELLATION_GROUP).await?;
        let stats = Arc::new(Mutex::new(CancellationStats::default()));

        let join = tokio::spawn(run(store, sub, shutdown.clone(), stats.clone()));

        info!(
            worker = WORKER_NAME,
            topic = CANCELLATIONS_TOPIC,
            group = CANCELLATION_GROUP,
            "worker started"
        );
        Ok(WorkerHandle::new(WORKER_NAME, shutdown, join, stats))
    }
}

async fn run<S: JobStore>(
    store: S,
    sub: Subscription,
    shutdown: CancellationToken,
    stats: Arc<Mutex<CancellationStats>>,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = sub.recv() => next,
        };

        match next {
            Some(Ok(delivery)) => {
                confirm(&store, &delivery, &stats).await;
                sub.ack(&delivery);
            }
            Some(Err(e)) => {
                record(&stats, |s| s.read_errors += 1);
                warn!(worker = WORKER_NAME, error = %e, "failed to read cancellation message");
            }
            None => {
                info!(worker = WORKER_NAME, "subscription closed");
                break;
            }
        }
    }

    info!(worker = WORKER_NAME, "worker stopped");
}

/// Apply one cancellation request. Safe to run any number of times per message.
async fn confirm<S: JobStore>(store: &S, delivery: &Delivery, stats: &Mutex<CancellationStats>) {
    record(stats, |s| s.received += 1);

    let msg: CancellationMessage = match decode(&delivery.payload) {
        Ok(msg) => msg,
        Err(e) => {
            record(stats, |s| s.malformed += 1);
            warn!(worker = WORKER_NAME, delivery_id = %delivery.id, error = %e, "dropping malformed cancellation message");
            return;
        }
    };

    let event = JobEvent::CancelConfirmed;
    match store
        .conditional_update_status(msg.job_id, event.sources(), event.target(), JobUpdate::none())
        .await
    {
        Ok(0) => {
            record(stats, |s| s.ignored += 1);
            info!(job_id = %msg.job_id, "job already finished; cancellation ignored");
        }
        Ok(_) => {
            record(stats, |s| s.applied += 1);
            info!(job_id = %msg.job_id, "job cancelled");
        }
        Err(e) => {
            record(stats, |s| s.store_errors += 1);
            warn!(job_id = %msg.job_id, error = %e, "failed to confirm cancellation");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use jobflow_core::{Job, JobId, JobStatus, JobType};
    use jobflow_events::encode;

    use super::*;
    use crate::jobs::InMemoryJobStore;

    fn delivery(job_id: JobId) -> Delivery {
        let msg = CancellationMessage {
            job_id,
            cancelled_at: Utc::now(),
        };
        Delivery {
            id: "0".into(),
            topic: CANCELLATIONS_TOPIC.into(),
            payload: encode(&msg).unwrap(),
        }
    }

    async fn seeded(status: JobStatus) -> (InMemoryJobStore, Job) {
        let store = InMemoryJobStore::new();
        let mut job = Job::new("n", JobType::Process, None);
        job.status = status;
        store.create(&job).await.unwrap();
        (store, job)
    }

    #[tokio::test]
    async fn cancels_every_active_status() {
        for status in [JobStatus::Pending, JobStatus::Processing, JobStatus::Cancelling] {
            let (store, job) = seeded(status).await;
            let stats = Mutex::new(CancellationStats::default());

            confirm(&store, &delivery(job.id), &stats).await;

            assert_eq!(
                store.get_by_id(job.id).await.unwrap().unwrap().status,
                JobStatus::Cancelled
            );
            assert_eq!(stats.lock().unwrap().applied, 1);
        }
    }

    #[tokio::test]
    async fn duplicate_delivery_is_a_no_op() {
        let (store, job) = seeded(JobStatus::Cancelling).await;
        let stats = Mutex::new(CancellationStats::default());

        confirm(&store, &delivery(job.id), &stats).await;
        let after_first = store.get_by_id(job.id).await.unwrap().unwrap();
        confirm(&store, &delivery(job.id), &stats).await;

        assert_eq!(store.get_by_id(job.id).await.unwrap().unwrap(), after_first);
        let stats = stats.lock().unwrap().clone();
        assert_eq!((stats.applied, stats.ignored, stats.store_errors), (1, 1, 0));
    }

    #[tokio::test]
    async fn finished_jobs_are_left_alone() {
        for status in [JobStatus::Completed, JobStatus::Failed] {
            let (store, job) = seeded(status).await;
            let stats = Mutex::new(CancellationStats::default());

            confirm(&store, &delivery(job.id), &stats).await;

            assert_eq!(store.get_by_id(job.id).await.unwrap().unwrap().status, status);
            assert_eq!(stats.lock().unwrap().ignored, 1);
        }
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped() {
        let store = InMemoryJobStore::new();
        let stats = Mutex::new(CancellationStats::default());
        let bad = Delivery {
            id: "7".into(),
            topic: CANCELLATIONS_TOPIC.into(),
            payload: b"{not json".to_vec(),
        };

        confirm(&store, &bad, &stats).await;
        assert_eq!(stats.lock().unwrap().malformed, 1);
    }
}
