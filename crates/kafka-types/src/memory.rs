//! In-process partitioned log.
//!
//! `MemoryLog` implements the producer, connector and consumer capabilities
//! with Kafka's observable semantics: keyed messages hash to a fixed
//! partition, offsets are dense per partition, consumer groups keep
//! committed positions that survive reconnects.
//!
//! It also exposes fault injection so failure paths can be exercised without
//! a broker: refused connects, dropped connections, held acknowledgements,
//! a bounded send buffer and raw (undecodable) payloads.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{watch, Notify, Semaphore};
use tracing::debug;

use crate::error::{Error, Result};
use crate::message::{DeliveryReceipt, OutboundMessage, RawMessage, TopicPosition};
use crate::transport::{LogConnector, LogConsumer, LogProducer, OffsetReset, PendingDelivery};

#[derive(Debug, Clone)]
struct StoredMessage {
    key: Option<Vec<u8>>,
    payload: Option<Vec<u8>>,
    timestamp: i64,
}

#[derive(Debug, Default)]
struct LogState {
    topics: HashMap<String, Vec<Vec<StoredMessage>>>,
    round_robin: HashMap<String, usize>,
    committed: HashMap<(String, String, i32), i64>,
    default_partitions: i32,
    auto_create_topics: bool,
    failing_connects: u32,
    pending_disconnects: u32,
    connects: u32,
}

struct Shared {
    state: Mutex<LogState>,
    appended: Notify,
    released: watch::Sender<bool>,
}

/// Cheaply cloneable handle to one in-process log.
#[derive(Clone)]
pub struct MemoryLog {
    shared: Arc<Shared>,
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLog {
    /// An empty log. Topics must be created before use unless
    /// auto-creation is enabled.
    pub fn new() -> Self {
        let (released, _) = watch::channel(true);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LogState {
                    default_partitions: 1,
                    ..Default::default()
                }),
                appended: Notify::new(),
                released,
            }),
        }
    }

    /// Create unknown topics on first produce or subscribe.
    pub fn with_auto_create_topics(self, partitions: i32) -> Self {
        {
            let mut state = self.state();
            state.auto_create_topics = true;
            state.default_partitions = partitions.max(1);
        }
        self
    }

    fn state(&self) -> MutexGuard<'_, LogState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a topic; a no-op if it already exists.
    pub fn create_topic(&self, topic: &str, partitions: i32) {
        let mut state = self.state();
        state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions.max(1) as usize]);
    }

    pub fn topic_exists(&self, topic: &str) -> bool {
        self.state().topics.contains_key(topic)
    }

    pub fn partition_count(&self, topic: &str) -> Option<i32> {
        self.state().topics.get(topic).map(|p| p.len() as i32)
    }

    /// Append a message, choosing the partition the way the producer does.
    /// Returns `(partition, offset)`.
    fn append(
        &self,
        topic: &str,
        key: Option<Vec<u8>>,
        payload: Option<Vec<u8>>,
    ) -> Result<(i32, i64)> {
        let mut guard = self.state();
        let state = &mut *guard;
        if !state.topics.contains_key(topic) {
            if !state.auto_create_topics {
                return Err(Error::InvalidTopic(format!("topic '{topic}' does not exist")));
            }
            let partitions = state.default_partitions as usize;
            state
                .topics
                .insert(topic.to_string(), vec![Vec::new(); partitions]);
        }
        let Some(partitions) = state.topics.get_mut(topic) else {
            return Err(Error::InvalidTopic(format!("topic '{topic}' does not exist")));
        };

        let partition = match &key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % partitions.len() as u64) as usize
            }
            None => {
                let next = state.round_robin.entry(topic.to_string()).or_insert(0);
                let partition = *next % partitions.len();
                *next += 1;
                partition
            }
        };

        let offset = push(&mut partitions[partition], key, payload);
        drop(guard);
        self.shared.appended.notify_waiters();
        Ok((partition as i32, offset))
    }

    /// Append bytes directly to a partition, bypassing any encoding.
    pub fn append_raw(
        &self,
        topic: &str,
        partition: i32,
        key: Option<Vec<u8>>,
        payload: Option<Vec<u8>>,
    ) -> Result<i64> {
        let mut state = self.state();
        let partitions = state
            .topics
            .get_mut(topic)
            .ok_or_else(|| Error::InvalidTopic(format!("topic '{topic}' does not exist")))?;
        let log = usize::try_from(partition)
            .ok()
            .and_then(|p| partitions.get_mut(p))
            .ok_or_else(|| {
                Error::InvalidTopic(format!("topic '{topic}' has no partition {partition}"))
            })?;
        let offset = push(log, key, payload);
        drop(state);
        self.shared.appended.notify_waiters();
        Ok(offset)
    }

    /// Everything stored in one partition.
    pub fn messages(&self, topic: &str, partition: i32) -> Vec<RawMessage> {
        let state = self.state();
        state
            .topics
            .get(topic)
            .and_then(|p| p.get(partition as usize))
            .map(|log| {
                log.iter()
                    .enumerate()
                    .map(|(offset, m)| RawMessage {
                        topic: topic.to_string(),
                        partition,
                        offset: offset as i64,
                        key: m.key.clone(),
                        payload: m.payload.clone(),
                        timestamp: Some(m.timestamp),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total number of messages across all partitions of a topic.
    pub fn message_count(&self, topic: &str) -> usize {
        self.state()
            .topics
            .get(topic)
            .map(|p| p.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn committed(&self, group_id: &str, topic: &str, partition: i32) -> Option<i64> {
        self.state()
            .committed
            .get(&(group_id.to_string(), topic.to_string(), partition))
            .copied()
    }

    /// Refuse the next `n` connection attempts.
    pub fn fail_next_connects(&self, n: u32) {
        self.state().failing_connects = n;
    }

    /// Drop the connection of the next consumer that polls.
    pub fn disconnect_consumers(&self) {
        self.state().pending_disconnects += 1;
    }

    /// Number of connection attempts seen, successful or not.
    pub fn connect_count(&self) -> u32 {
        self.state().connects
    }

    /// Keep acknowledgements back until [`MemoryLog::release_deliveries`].
    /// Messages are still appended; only their delivery futures wait.
    pub fn hold_deliveries(&self) {
        self.shared.released.send_replace(false);
    }

    pub fn release_deliveries(&self) {
        self.shared.released.send_replace(true);
    }

    /// A producer whose send buffer holds at most `capacity` unacknowledged messages.
    pub fn producer(&self, capacity: usize) -> MemoryProducer {
        MemoryProducer {
            log: self.clone(),
            buffer: Arc::new(Semaphore::new(capacity.max(1))),
            capacity: capacity.max(1),
        }
    }

    pub fn connector(&self, group_id: impl Into<String>, reset: OffsetReset) -> MemoryConnector {
        MemoryConnector {
            log: self.clone(),
            group_id: group_id.into(),
            reset,
        }
    }
}

fn push(log: &mut Vec<StoredMessage>, key: Option<Vec<u8>>, payload: Option<Vec<u8>>) -> i64 {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default();
    log.push(StoredMessage {
        key,
        payload,
        timestamp,
    });
    (log.len() - 1) as i64
}

/// Producer over a [`MemoryLog`].
pub struct MemoryProducer {
    log: MemoryLog,
    buffer: Arc<Semaphore>,
    capacity: usize,
}

impl MemoryProducer {
    /// Unacknowledged messages currently occupying the send buffer.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.buffer.available_permits()
    }
}

#[async_trait]
impl LogProducer for MemoryProducer {
    async fn enqueue(
        &self,
        message: OutboundMessage,
        queue_timeout: Duration,
    ) -> Result<PendingDelivery> {
        let permit = match tokio::time::timeout(queue_timeout, self.buffer.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(Error::TransportDisconnected("send buffer closed".into())),
            Err(_) => return Err(Error::BackpressureTimeout(queue_timeout)),
        };

        let OutboundMessage {
            topic,
            key,
            payload,
        } = message;
        let (partition, offset) = self.log.append(&topic, key, Some(payload))?;
        debug!("Appended message to {topic}/{partition} at offset {offset}");

        let mut released = self.log.shared.released.subscribe();
        Ok(Box::pin(async move {
            let _permit = permit;
            released
                .wait_for(|released| *released)
                .await
                .map_err(|_| Error::TransportDisconnected("log closed".into()))?;
            Ok(DeliveryReceipt {
                topic,
                partition,
                offset,
            })
        }))
    }

    async fn flush(&self, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.buffer.acquire_many(self.capacity as u32)).await {
            Ok(Ok(_all)) => Ok(()),
            Ok(Err(_)) => Err(Error::TransportDisconnected("send buffer closed".into())),
            Err(_) => Err(Error::Delivery(format!(
                "{} messages still unacknowledged after {timeout:?}",
                self.in_flight()
            ))),
        }
    }
}

/// Opens [`MemoryConsumer`]s for one consumer group.
#[derive(Clone)]
pub struct MemoryConnector {
    log: MemoryLog,
    group_id: String,
    reset: OffsetReset,
}

#[async_trait]
impl LogConnector for MemoryConnector {
    type Consumer = MemoryConsumer;

    async fn connect(&self) -> Result<MemoryConsumer> {
        let mut state = self.log.state();
        state.connects += 1;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(Error::TransportDisconnected("connection refused".into()));
        }
        Ok(MemoryConsumer {
            log: self.log.clone(),
            group_id: self.group_id.clone(),
            reset: self.reset,
            topics: Vec::new(),
            positions: HashMap::new(),
            next_slot: 0,
        })
    }
}

/// One consumer-group member reading a [`MemoryLog`].
pub struct MemoryConsumer {
    log: MemoryLog,
    group_id: String,
    reset: OffsetReset,
    topics: Vec<String>,
    positions: HashMap<(String, i32), i64>,
    /// Partition the next poll starts reading from.
    next_slot: usize,
}

impl MemoryConsumer {
    /// Read up to `max` messages, starting one partition further along
    /// every call so a busy partition cannot starve the others.
    fn collect(&mut self, state: &LogState, max: usize) -> Vec<RawMessage> {
        let slots: Vec<(String, i32)> = self
            .topics
            .iter()
            .filter_map(|topic| state.topics.get(topic).map(|p| (topic, p.len() as i32)))
            .flat_map(|(topic, count)| (0..count).map(move |p| (topic.clone(), p)))
            .collect();
        let mut batch = Vec::new();
        if slots.is_empty() {
            return batch;
        }
        let start = self.next_slot % slots.len();
        self.next_slot = start + 1;

        for (topic, partition) in slots.iter().cycle().skip(start).take(slots.len()) {
            let Some(log) = state
                .topics
                .get(topic)
                .and_then(|partitions| partitions.get(*partition as usize))
            else {
                continue;
            };
            let position = self
                .positions
                .entry((topic.clone(), *partition))
                .or_insert_with(|| {
                    state
                        .committed
                        .get(&(self.group_id.clone(), topic.clone(), *partition))
                        .copied()
                        .unwrap_or(match self.reset {
                            OffsetReset::Earliest => 0,
                            OffsetReset::Latest => log.len() as i64,
                        })
                });
            while batch.len() < max {
                let Some(stored) = log.get(*position as usize) else {
                    break;
                };
                batch.push(RawMessage {
                    topic: topic.clone(),
                    partition: *partition,
                    offset: *position,
                    key: stored.key.clone(),
                    payload: stored.payload.clone(),
                    timestamp: Some(stored.timestamp),
                });
                *position += 1;
            }
            if batch.len() >= max {
                break;
            }
        }
        batch
    }
}

#[async_trait]
impl LogConsumer for MemoryConsumer {
    async fn subscribe(&mut self, topics: &[String]) -> Result<()> {
        let mut state = self.log.state();
        if state.auto_create_topics {
            let partitions = state.default_partitions as usize;
            for topic in topics {
                state
                    .topics
                    .entry(topic.clone())
                    .or_insert_with(|| vec![Vec::new(); partitions]);
            }
        } else if !topics.iter().any(|t| state.topics.contains_key(t)) {
            return Err(Error::InvalidTopic(format!(
                "none of the topics {topics:?} exist"
            )));
        }
        self.topics = topics.to_vec();
        self.positions.clear();
        Ok(())
    }

    async fn poll(&mut self, max: usize, timeout: Duration) -> Result<Vec<RawMessage>> {
        let deadline = tokio::time::Instant::now() + timeout;
        let log = self.log.clone();
        loop {
            let appended = log.shared.appended.notified();
            {
                let mut state = log.state();
                if state.pending_disconnects > 0 {
                    state.pending_disconnects -= 1;
                    return Err(Error::TransportDisconnected(
                        "connection reset by peer".into(),
                    ));
                }
                let batch = self.collect(&state, max.max(1));
                if !batch.is_empty() {
                    return Ok(batch);
                }
            }
            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn commit(&mut self, positions: &[TopicPosition]) -> Result<()> {
        let mut state = self.log.state();
        for position in positions {
            state.committed.insert(
                (
                    self.group_id.clone(),
                    position.topic.clone(),
                    position.partition,
                ),
                position.next_offset,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbound(topic: &str, key: &str, payload: &[u8]) -> OutboundMessage {
        OutboundMessage {
            topic: topic.to_string(),
            key: Some(key.as_bytes().to_vec()),
            payload: payload.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_same_key_same_partition_dense_offsets() {
        let log = MemoryLog::new();
        log.create_topic("users", 4);
        let producer = log.producer(16);

        let mut receipts = Vec::new();
        for i in 0..5u8 {
            let pending = producer
                .enqueue(outbound("users", "k1", &[i]), Duration::from_secs(1))
                .await
                .unwrap();
            receipts.push(pending.await.unwrap());
        }

        let partition = receipts[0].partition;
        assert!(receipts.iter().all(|r| r.partition == partition));
        let offsets: Vec<i64> = receipts.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_unknown_topic_rejected() {
        let log = MemoryLog::new();
        let producer = log.producer(1);
        let err = producer
            .enqueue(outbound("missing", "k", b"x"), Duration::from_millis(10))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidTopic(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_buffer_times_out() {
        let log = MemoryLog::new();
        log.create_topic("t", 1);
        log.hold_deliveries();
        let producer = log.producer(1);

        let _first = producer
            .enqueue(outbound("t", "a", b"1"), Duration::from_millis(50))
            .await
            .unwrap();
        let second = producer
            .enqueue(outbound("t", "a", b"2"), Duration::from_millis(50))
            .await;
        assert!(matches!(second, Err(Error::BackpressureTimeout(_))));
        assert_eq!(log.message_count("t"), 1);
    }

    #[tokio::test]
    async fn test_consumer_resumes_from_committed_position() {
        let log = MemoryLog::new();
        log.create_topic("t", 1);
        for i in 0..3u8 {
            log.append_raw("t", 0, None, Some(vec![i])).unwrap();
        }

        let connector = log.connector("g", OffsetReset::Earliest);
        let mut consumer = connector.connect().await.unwrap();
        consumer.subscribe(&["t".to_string()]).await.unwrap();
        let batch = consumer.poll(2, Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch.len(), 2);
        consumer
            .commit(&[TopicPosition {
                topic: "t".into(),
                partition: 0,
                next_offset: 2,
            }])
            .await
            .unwrap();
        drop(consumer);

        let mut consumer = connector.connect().await.unwrap();
        consumer.subscribe(&["t".to_string()]).await.unwrap();
        let batch = consumer.poll(10, Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].offset, 2);
        assert_eq!(log.committed("g", "t", 0), Some(2));
    }

    #[tokio::test]
    async fn test_polls_rotate_across_partitions() {
        let log = MemoryLog::new();
        log.create_topic("t", 2);
        for i in 0..5u8 {
            log.append_raw("t", 0, None, Some(vec![i])).unwrap();
            log.append_raw("t", 1, None, Some(vec![i])).unwrap();
        }

        let mut consumer = log
            .connector("g", OffsetReset::Earliest)
            .connect()
            .await
            .unwrap();
        consumer.subscribe(&["t".to_string()]).await.unwrap();

        let mut polled = Vec::new();
        for _ in 0..3 {
            let batch = consumer.poll(2, Duration::from_millis(10)).await.unwrap();
            polled.push(
                batch
                    .iter()
                    .map(|m| (m.partition, m.offset))
                    .collect::<Vec<_>>(),
            );
        }
        assert_eq!(
            polled,
            vec![
                vec![(0, 0), (0, 1)],
                vec![(1, 0), (1, 1)],
                vec![(0, 2), (0, 3)],
            ]
        );
    }

    #[tokio::test]
    async fn test_latest_skips_history() {
        let log = MemoryLog::new();
        log.create_topic("t", 1);
        log.append_raw("t", 0, None, Some(vec![1])).unwrap();

        let mut consumer = log
            .connector("g", OffsetReset::Latest)
            .connect()
            .await
            .unwrap();
        consumer.subscribe(&["t".to_string()]).await.unwrap();
        assert!(consumer
            .poll(10, Duration::from_millis(10))
            .await
            .unwrap()
            .is_empty());

        log.append_raw("t", 0, None, Some(vec![2])).unwrap();
        let batch = consumer.poll(10, Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload, Some(vec![2]));
    }

    #[tokio::test]
    async fn test_poll_wakes_on_append() {
        let log = MemoryLog::new();
        log.create_topic("t", 1);
        let mut consumer = log
            .connector("g", OffsetReset::Earliest)
            .connect()
            .await
            .unwrap();
        consumer.subscribe(&["t".to_string()]).await.unwrap();

        let writer = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.append_raw("t", 0, None, Some(vec![9])).unwrap();
        });

        let batch = consumer.poll(10, Duration::from_secs(5)).await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let log = MemoryLog::new();
        log.create_topic("t", 1);
        let connector = log.connector("g", OffsetReset::Earliest);

        log.fail_next_connects(1);
        assert!(connector.connect().await.is_err());
        let mut consumer = connector.connect().await.unwrap();
        assert_eq!(log.connect_count(), 2);

        consumer.subscribe(&["t".to_string()]).await.unwrap();
        log.disconnect_consumers();
        let err = consumer.poll(1, Duration::from_millis(1)).await.unwrap_err();
        assert!(matches!(err, Error::TransportDisconnected(_)));
    }

    #[tokio::test]
    async fn test_subscribe_to_missing_topics() {
        let log = MemoryLog::new();
        let mut consumer = log
            .connector("g", OffsetReset::Earliest)
            .connect()
            .await
            .unwrap();
        let err = consumer.subscribe(&["nope".to_string()]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTopic(_)));

        let log = MemoryLog::new().with_auto_create_topics(2);
        let mut consumer = log
            .connector("g", OffsetReset::Earliest)
            .connect()
            .await
            .unwrap();
        consumer.subscribe(&["later".to_string()]).await.unwrap();
        assert_eq!(log.partition_count("later"), Some(2));
    }
}
