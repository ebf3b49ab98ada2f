use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Handle to control and join a background consumer.
///
/// `S` is the consumer's stats type; [`WorkerHandle::stats`] returns a snapshot.
#[derive(Debug)]
pub struct WorkerHandle<S> {
    name: &'static str,
    shutdown: CancellationToken,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<S>>,
}

impl<S: Clone + Default> WorkerHandle<S> {
    pub(crate) fn new(
        name: &'static str,
        shutdown: CancellationToken,
        join: JoinHandle<()>,
        stats: Arc<Mutex<S>>,
    ) -> Self {
        Self {
            name,
            shutdown,
            join: Some(join),
            stats,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Snapshot of the consumer's counters.
    pub fn stats(&self) -> S {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// The consumer's stop signal. Cancelling it has the same effect as
    /// [`WorkerHandle::shutdown`] without waiting.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }

    /// Request graceful shutdown and wait for the consumer to stop.
    ///
    /// Work in flight is abandoned, not rolled back.
    pub async fn shutdown(mut self) -> S {
        self.shutdown.cancel();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                warn!(worker = self.name, error = %e, "worker task ended abnormally");
            }
        }
        self.stats()
    }
}

/// Apply `f` to the shared stats. A poisoned lock drops the update.
pub(crate) fn record<S>(stats: &Mutex<S>, f: impl FnOnce(&mut S)) {
    if let Ok(mut s) = stats.lock() {
        f(&mut s);
    }
}
