//! Topic-based message bus abstraction (mechanics only).
//!
//! This module provides the transport seam between the job-creation path and the
//! consumers that act on jobs (workers, the cancellation consumer, DLQ readers).
//!
//! ## Delivery Model
//!
//! - **Topics**: named channels (`jobs`, `job_cancellations`, `jobs_dlq`)
//! - **Consumer groups**: every group sees every message of a topic; consumers
//!   that share a group split the messages between them
//! - **At-least-once**: a message may be delivered more than once; handlers must
//!   be idempotent
//! - **Acknowledgement**: consumers call `Subscription::ack` once a delivery is
//!   handled; durable transports redeliver what was never acknowledged
//! - **No cross-topic ordering**: a cancellation may overtake the work message
//!   for the same job
//!
//! ## Source of Truth
//!
//! The job store is the source of truth; the bus only distributes intent. A
//! failed publish after a successful store write delays convergence but loses
//! nothing, so callers log publish failures instead of rolling back.
//!
//! Payloads are raw bytes. Decoding happens in the consumer so that malformed
//! messages can be observed (and dropped) where they are handled.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

/// Bus operation error.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Internal lock poisoning (in-memory implementation).
    #[error("bus lock poisoned")]
    Poisoned,

    #[error("bus connection error: {0}")]
    Connection(String),

    #[error("bus command error: {0}")]
    Command(String),

    /// A received entry could not be turned into a delivery.
    #[error("malformed bus entry: {0}")]
    MalformedEntry(String),
}

/// One message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Transport-assigned identifier (offset / stream id).
    pub id: String,
    pub topic: String,
    pub payload: Vec<u8>,
}

type Item = Result<Delivery, BusError>;

#[derive(Debug)]
enum Inbox {
    Unbounded(mpsc::UnboundedReceiver<Item>),
    Bounded(mpsc::Receiver<Item>),
}

impl Inbox {
    async fn recv(&mut self) -> Option<Item> {
        match self {
            Inbox::Unbounded(rx) => rx.recv().await,
            Inbox::Bounded(rx) => rx.recv().await,
        }
    }

    fn try_recv(&mut self) -> Option<Item> {
        match self {
            Inbox::Unbounded(rx) => rx.try_recv().ok(),
            Inbox::Bounded(rx) => rx.try_recv().ok(),
        }
    }
}

/// A consumer-group subscription to one topic.
///
/// Cloning a subscription adds another consumer to the same group: clones share
/// the underlying queue, so each delivery goes to exactly one of them.
///
/// ## Usage Pattern
///
/// ```ignore
/// let sub = bus.subscribe(JOBS_TOPIC, WORKER_GROUP).await?;
///
/// loop {
///     tokio::select! {
///         _ = shutdown.cancelled() => break,
///         next = sub.recv() => match next {
///             Some(Ok(delivery)) => {
///                 handle(&delivery).await;
///                 sub.ack(&delivery);
///             }
///             Some(Err(e)) => warn!(error = %e, "read failed"),  // keep consuming
///             None => break,                                     // bus closed
///         },
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Subscription {
    inbox: Arc<Mutex<Inbox>>,
    acks: Option<mpsc::UnboundedSender<String>>,
}

impl Subscription {
    /// Subscription fed by an unbounded queue, without acknowledgement tracking.
    pub fn new(receiver: mpsc::UnboundedReceiver<Item>) -> Self {
        Self {
            inbox: Arc::new(Mutex::new(Inbox::Unbounded(receiver))),
            acks: None,
        }
    }

    /// Subscription fed by a bounded queue whose producer waits for the
    /// consumer. Ids passed to [`Subscription::ack`] are sent on `acks`.
    pub fn paced(receiver: mpsc::Receiver<Item>, acks: mpsc::UnboundedSender<String>) -> Self {
        Self {
            inbox: Arc::new(Mutex::new(Inbox::Bounded(receiver))),
            acks: Some(acks),
        }
    }

    /// Wait for the next delivery.
    ///
    /// Returns `None` once the transport side is gone. `Some(Err(_))` reports a
    /// read failure; the subscription stays usable afterwards.
    pub async fn recv(&self) -> Option<Item> {
        self.inbox.lock().await.recv().await
    }

    /// Take a delivery if one is already queued.
    pub async fn try_recv(&self) -> Option<Item> {
        self.inbox.lock().await.try_recv()
    }

    /// Mark `delivery` as handled.
    ///
    /// A delivery that is never acknowledged may be handed out again after the
    /// consumer restarts. No-op for transports without acknowledgement.
    pub fn ack(&self, delivery: &Delivery) {
        if let Some(acks) = &self.acks {
            // A closed channel means the transport reader is gone; the entry stays pending.
            let _ = acks.send(delivery.id.clone());
        }
    }
}

/// Topic-based publish/subscribe bus.
///
/// The trait is object safe so process bootstrap can pick an implementation at
/// runtime and hand out `Arc<dyn MessageBus>`.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Append a message to `topic`.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Join consumer group `group` on `topic`, creating the group if needed.
    async fn subscribe(&self, topic: &str, group: &str) -> Result<Subscription, BusError>;
}

#[async_trait]
impl<B> MessageBus for Arc<B>
where
    B: MessageBus + ?Sized,
{
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        (**self).publish(topic, payload).await
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Subscription, BusError> {
        (**self).subscribe(topic, group).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(id: &str) -> Delivery {
        Delivery {
            id: id.to_string(),
            topic: "jobs".to_string(),
            payload: b"x".to_vec(),
        }
    }

    #[tokio::test]
    async fn paced_subscription_forwards_acks() {
        let (tx, rx) = mpsc::channel(1);
        let (ack_tx, mut ack_rx) = mpsc::unbounded_channel();
        let sub = Subscription::paced(rx, ack_tx);

        tx.send(Ok(delivery("1-0"))).await.unwrap();
        // One slot: a second entry cannot be queued before the first is taken.
        assert!(tx.try_send(Ok(delivery("2-0"))).is_err());

        let got = sub.recv().await.unwrap().unwrap();
        assert_eq!(got.id, "1-0");
        assert!(ack_rx.try_recv().is_err());

        sub.ack(&got);
        assert_eq!(ack_rx.recv().await.unwrap(), "1-0");
    }

    #[tokio::test]
    async fn ack_without_tracking_is_a_no_op() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = Subscription::new(rx);
        tx.send(Ok(delivery("0"))).unwrap();

        let got = sub.recv().await.unwrap().unwrap();
        sub.ack(&got);
        assert!(sub.try_recv().await.is_none());
    }
}
