//! Redis Streams-backed message bus (durable, at-least-once delivery).
//!
//! This implementation uses Redis Streams (XADD/XREADGROUP) to provide:
//! - **Durable delivery**: entries persist in the stream after they are read
//! - **Consumer groups**: one per consumer type (`job-worker`, `job-worker-cancellations`)
//! - **Late groups start at the beginning**: groups are created at id `0`
//!
//! ## Architecture
//!
//! - **Stream Key**: `jobflow:<topic>` (one stream per topic)
//! - **Consumers**: named consumers within groups (e.g. `worker-1`)
//! - **Acknowledgement**: an entry is XACKed only after the consumer calls
//!   `Subscription::ack`, i.e. once it has been handled. Entries read but not
//!   acknowledged when a consumer dies are re-read on its next start (the
//!   subscription first drains its own pending list).
//! - **Pacing**: the reader fetches one entry at a time and hands it over
//!   through a one-slot channel, so a consumer only holds what it is working on
//!   and the rest of the stream stays available to the other group members.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use jobflow_events::{BusError, Delivery, MessageBus, Subscription};

/// Prefix of every stream key.
const STREAM_PREFIX: &str = "jobflow";

/// Consumer name used when none is configured.
const DEFAULT_CONSUMER_NAME: &str = "worker-1";

/// How long one XREADGROUP call blocks waiting for new entries.
const DEFAULT_BLOCK_MS: usize = 1_000;

/// Entries fetched per read.
const READ_BATCH: usize = 1;

/// Deliveries buffered between the reader task and the consumer.
const INBOX_CAPACITY: usize = 1;

/// Pause after a failed read before the next attempt.
const READ_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct RedisStreamsBus {
    client: Arc<redis::Client>,
    consumer_name: String,
    block_ms: usize,
}

impl RedisStreamsBus {
    /// Create a new Redis Streams bus.
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, BusError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| BusError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            consumer_name: DEFAULT_CONSUMER_NAME.to_string(),
            block_ms: DEFAULT_BLOCK_MS,
        })
    }

    /// Name this process uses inside every consumer group it joins.
    pub fn with_consumer_name(mut self, name: impl Into<String>) -> Self {
        self.consumer_name = name.into();
        self
    }

    pub fn with_block_ms(mut self, block_ms: usize) -> Self {
        self.block_ms = block_ms;
        self
    }

    /// Redis key of the stream backing `topic`.
    pub fn stream_key(topic: &str) -> String {
        format!("{STREAM_PREFIX}:{topic}")
    }

    async fn connection(&self) -> Result<MultiplexedConnection, BusError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))
    }

    /// Ensure a consumer group exists (idempotent).
    ///
    /// `MKSTREAM` creates the stream if needed; starting at `0` lets a group
    /// created after the first publish still see every entry.
    pub async fn ensure_consumer_group(&self, topic: &str, group: &str) -> Result<(), BusError> {
        let mut conn = self.connection().await?;
        let result: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(Self::stream_key(topic), group, "0")
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(BusError::Command(format!("XGROUP CREATE failed: {e}"))),
        }
    }
}

#[async_trait]
impl MessageBus for RedisStreamsBus {
    #[instrument(skip(self, payload), fields(payload_len = payload.len()), err)]
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let mut conn = self.connection().await?;
        let _: String = conn
            .xadd(Self::stream_key(topic), "*", &[("payload", payload)])
            .await
            .map_err(|e| BusError::Command(format!("XADD failed: {e}")))?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Subscription, BusError> {
        self.ensure_consumer_group(topic, group).await?;

        let reader = StreamReader {
            conn: self.connection().await?,
            topic: topic.to_string(),
            stream_key: Self::stream_key(topic),
            group: group.to_string(),
            consumer: self.consumer_name.clone(),
            block_ms: self.block_ms,
        };

        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        tokio::spawn(reader.run(tx, ack_rx));

        Ok(Subscription::paced(rx, ack_tx))
    }
}

/// Background task feeding one subscription.
struct StreamReader {
    conn: MultiplexedConnection,
    topic: String,
    stream_key: String,
    group: String,
    consumer: String,
    block_ms: usize,
}

type Outbox = mpsc::Sender<Result<Delivery, BusError>>;
type Acks = mpsc::UnboundedReceiver<String>;

impl StreamReader {
    async fn run(mut self, tx: Outbox, mut acks: Acks) {
        // Own pending entries first (read earlier, never acknowledged), then new ones.
        // While draining, the cursor is the last pending id handed out.
        let mut pending_cursor = Some("0".to_string());

        loop {
            self.flush_acks(&mut acks).await;
            if tx.is_closed() {
                break;
            }

            let cursor = pending_cursor.clone().unwrap_or_else(|| ">".to_string());
            match self.read(&cursor).await {
                Ok(entries) => {
                    if entries.is_empty() {
                        pending_cursor = None;
                        continue;
                    }
                    for (id, payload) in entries {
                        if let Some(cursor) = pending_cursor.as_mut() {
                            *cursor = id.clone();
                        }
                        let delivery = match payload {
                            Ok(payload) => Ok(Delivery {
                                id,
                                topic: self.topic.clone(),
                                payload,
                            }),
                            Err(e) => {
                                // Nothing a consumer could handle; keep it off the pending list.
                                self.ack(&id).await;
                                Err(e)
                            }
                        };
                        if !self.forward(&tx, &mut acks, delivery).await {
                            self.flush_acks(&mut acks).await;
                            return;
                        }
                    }
                }
                Err(e) => {
                    if !self.forward(&tx, &mut acks, Err(e)).await {
                        self.flush_acks(&mut acks).await;
                        return;
                    }
                    tokio::time::sleep(READ_ERROR_BACKOFF).await;
                }
            }
        }

        self.flush_acks(&mut acks).await;
        debug!(stream_key = %self.stream_key, group = %self.group, "stream reader stopped");
    }

    /// Wait for room in the consumer's inbox, acknowledging handled entries
    /// meanwhile. Returns `false` once the consumer is gone.
    async fn forward(
        &mut self,
        tx: &Outbox,
        acks: &mut Acks,
        item: Result<Delivery, BusError>,
    ) -> bool {
        let permit = loop {
            tokio::select! {
                permit = tx.reserve() => break permit,
                Some(id) = acks.recv() => self.ack(&id).await,
            }
        };

        match permit {
            Ok(permit) => {
                permit.send(item);
                true
            }
            Err(_) => false,
        }
    }

    async fn flush_acks(&mut self, acks: &mut Acks) {
        while let Ok(id) = acks.try_recv() {
            self.ack(&id).await;
        }
    }

    async fn read(
        &mut self,
        cursor: &str,
    ) -> Result<Vec<(String, Result<Vec<u8>, BusError>)>, BusError> {
        let mut options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(READ_BATCH);
        if cursor == ">" {
            options = options.block(self.block_ms);
        }

        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&[&self.stream_key], &[cursor], &options)
            .await
            .map_err(|e| BusError::Command(format!("XREADGROUP failed: {e}")))?;

        let entries = reply
            .into_iter()
            .flat_map(|r| r.keys)
            .flat_map(|k| k.ids)
            .map(|entry| {
                let payload = entry.get::<Vec<u8>>("payload").ok_or_else(|| {
                    BusError::MalformedEntry(format!("entry {} has no payload field", entry.id))
                });
                (entry.id, payload)
            })
            .collect();

        Ok(entries)
    }

    async fn ack(&mut self, id: &str) {
        let result: redis::RedisResult<u64> =
            self.conn.xack(&self.stream_key, &self.group, &[id]).await;
        if let Err(e) = result {
            warn!(stream_key = %self.stream_key, entry_id = %id, error = %e, "XACK failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_key_is_prefixed_per_topic() {
        assert_eq!(RedisStreamsBus::stream_key("jobs"), "jobflow:jobs");
        assert_eq!(
            RedisStreamsBus::stream_key("job_cancellations"),
            "jobflow:job_cancellations"
        );
    }

    /// Needs a running Redis at `REDIS_URL`.
    #[tokio::test]
    #[ignore]
    async fn publish_then_consume_through_a_group() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
        let bus = RedisStreamsBus::new(url).unwrap().with_block_ms(200);
        let topic = format!("test-{}", uuid::Uuid::now_v7());

        bus.publish(&topic, b"hello".to_vec()).await.unwrap();
        let sub = bus.subscribe(&topic, "g").await.unwrap();

        let delivery = sub.recv().await.unwrap().unwrap();
        assert_eq!(delivery.payload, b"hello");
        assert_eq!(delivery.topic, topic);
        sub.ack(&delivery);
    }

    /// Needs a running Redis at `REDIS_URL`.
    #[tokio::test]
    #[ignore]
    async fn unacknowledged_entry_is_redelivered_to_the_same_consumer() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
        let bus = RedisStreamsBus::new(url)
            .unwrap()
            .with_block_ms(200)
            .with_consumer_name("c1");
        let topic = format!("test-{}", uuid::Uuid::now_v7());

        bus.publish(&topic, b"first".to_vec()).await.unwrap();
        bus.publish(&topic, b"second".to_vec()).await.unwrap();

        let sub = bus.subscribe(&topic, "g").await.unwrap();
        let first = sub.recv().await.unwrap().unwrap();
        assert_eq!(first.payload, b"first");
        // Consumer dies before handling it.
        drop(sub);
        tokio::time::sleep(Duration::from_millis(300)).await;

        let sub = bus.subscribe(&topic, "g").await.unwrap();
        let again = sub.recv().await.unwrap().unwrap();
        assert_eq!(again.id, first.id);
        sub.ack(&again);

        let next = sub.recv().await.unwrap().unwrap();
        assert_eq!(next.payload, b"second");
        sub.ack(&next);
    }
}
