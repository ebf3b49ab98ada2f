//! In-memory message bus for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::bus::{BusError, Delivery, MessageBus, Subscription};

type Sender = mpsc::UnboundedSender<Result<Delivery, BusError>>;

#[derive(Debug)]
struct Group {
    tx: Sender,
    // Held by the group itself so queued messages survive while no consumer is attached.
    sub: Subscription,
}

#[derive(Debug, Default)]
struct Topic {
    log: Vec<Delivery>,
    groups: HashMap<String, Group>,
}

/// In-memory topic bus with consumer groups.
///
/// - No IO
/// - Each topic keeps its full log; a group created late replays it from the start
/// - Each group owns one queue; subscriptions to the same group share it
#[derive(Debug, Default)]
pub struct InMemoryMessageBus {
    topics: StdMutex<HashMap<String, Topic>>,
}

impl InMemoryMessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Everything ever published to `topic`, in publish order.
    pub fn published(&self, topic: &str) -> Vec<Delivery> {
        self.topics
            .lock()
            .map(|topics| topics.get(topic).map(|t| t.log.clone()).unwrap_or_default())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let mut topics = self.topics.lock().map_err(|_| BusError::Poisoned)?;
        let entry = topics.entry(topic.to_string()).or_default();

        let delivery = Delivery {
            id: entry.log.len().to_string(),
            topic: topic.to_string(),
            payload,
        };

        for group in entry.groups.values() {
            // The group holds its own receiver, so the channel cannot be closed.
            let _ = group.tx.send(Ok(delivery.clone()));
        }
        entry.log.push(delivery);

        Ok(())
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Subscription, BusError> {
        let mut topics = self.topics.lock().map_err(|_| BusError::Poisoned)?;
        let entry = topics.entry(topic.to_string()).or_default();

        if let Some(existing) = entry.groups.get(group) {
            return Ok(existing.sub.clone());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for delivery in &entry.log {
            let _ = tx.send(Ok(delivery.clone()));
        }

        let sub = Subscription::new(rx);
        entry.groups.insert(
            group.to_string(),
            Group {
                tx,
                sub: sub.clone(),
            },
        );

        Ok(sub)
    }
}
