//! Kafka transport for the subscriber.

use async_trait::async_trait;
use kafka_types::{Error, LogConnector, LogConsumer, RawMessage, Result, TopicPosition};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer as RdkafkaConsumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Message as RdkafkaMessage};
use rdkafka::{Offset, TopicPartitionList};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::KafkaConsumerConfig;

/// How long to keep collecting once the first message of a batch has arrived.
const BATCH_FILL_TIMEOUT: Duration = Duration::from_millis(10);

/// Opens [`KafkaLogConsumer`]s, one consumer-group member each.
#[derive(Debug, Clone)]
pub struct KafkaConnector {
    config: KafkaConsumerConfig,
}

impl KafkaConnector {
    pub fn new(config: KafkaConsumerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KafkaConsumerConfig {
        &self.config
    }

    fn client_config(&self) -> ClientConfig {
        let config = &self.config;
        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", config.auto_offset_reset.as_str())
            .set("session.timeout.ms", &config.session_timeout_ms)
            .set("enable.partition.eof", "false");
        for (key, value) in config.security.client_properties() {
            client.set(key, value);
        }
        client
    }
}

#[async_trait]
impl LogConnector for KafkaConnector {
    type Consumer = KafkaLogConsumer;

    async fn connect(&self) -> Result<KafkaLogConsumer> {
        let consumer: StreamConsumer = self
            .client_config()
            .create()
            .map_err(|e| Error::TransportDisconnected(format!("Failed to create consumer: {e}")))?;

        info!(
            "Created Kafka consumer in group '{}' for {}",
            self.config.group_id, self.config.brokers
        );
        Ok(KafkaLogConsumer {
            consumer: Arc::new(consumer),
            allow_missing_topics: self.config.allow_missing_topics,
            metadata_timeout: self.config.metadata_timeout,
            pending_error: None,
        })
    }
}

/// [`LogConsumer`] backed by an rdkafka `StreamConsumer` with manual commits.
pub struct KafkaLogConsumer {
    consumer: Arc<StreamConsumer>,
    allow_missing_topics: bool,
    metadata_timeout: Duration,
    /// Receive error hit while filling a batch, returned by the next poll.
    pending_error: Option<KafkaError>,
}

impl KafkaLogConsumer {
    /// Get the underlying consumer (for advanced use cases)
    pub fn inner(&self) -> &StreamConsumer {
        &self.consumer
    }

    async fn check_topics_exist(&self, topics: &[String]) -> Result<()> {
        let consumer = Arc::clone(&self.consumer);
        let timeout = self.metadata_timeout;
        let metadata = tokio::task::spawn_blocking(move || consumer.fetch_metadata(None, timeout))
            .await
            .map_err(|e| Error::TransportDisconnected(format!("metadata task failed: {e}")))?
            .map_err(|e| Error::TransportDisconnected(format!("Failed to fetch metadata: {e}")))?;

        let exists = metadata.topics().iter().any(|t| {
            t.error().is_none() && topics.iter().any(|wanted| wanted.as_str() == t.name())
        });
        if exists {
            Ok(())
        } else {
            Err(Error::InvalidTopic(format!(
                "none of the topics {topics:?} exist"
            )))
        }
    }
}

fn raw_message(msg: &BorrowedMessage<'_>) -> RawMessage {
    RawMessage {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        key: msg.key().map(<[u8]>::to_vec),
        payload: msg.payload().map(<[u8]>::to_vec),
        timestamp: msg.timestamp().to_millis(),
    }
}

fn consume_error(err: KafkaError) -> Error {
    match err {
        KafkaError::MessageConsumption(RDKafkaErrorCode::UnknownTopicOrPartition) => {
            Error::InvalidTopic(err.to_string())
        }
        other => Error::TransportDisconnected(format!("Error receiving message: {other}")),
    }
}

/// Wait up to `timeout` for a first message, then keep taking messages
/// that arrive within `fill_timeout` of each other, up to `max`.
///
/// The client reports each receive error once. An error after the first
/// message ends the batch and is stored in `pending`, to be returned by the
/// following call before anything else is received.
async fn collect_batch<T, E, F, Fut>(
    max: usize,
    timeout: Duration,
    fill_timeout: Duration,
    pending: &mut Option<E>,
    mut next: F,
) -> std::result::Result<Vec<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    if let Some(err) = pending.take() {
        return Err(err);
    }

    let mut batch = Vec::new();
    match tokio::time::timeout(timeout, next()).await {
        Ok(Ok(msg)) => batch.push(msg),
        Ok(Err(e)) => return Err(e),
        Err(_) => return Ok(batch),
    }

    while batch.len() < max {
        match tokio::time::timeout(fill_timeout, next()).await {
            Ok(Ok(msg)) => batch.push(msg),
            Ok(Err(e)) => {
                *pending = Some(e);
                break;
            }
            Err(_) => break,
        }
    }

    Ok(batch)
}

#[async_trait]
impl LogConsumer for KafkaLogConsumer {
    async fn subscribe(&mut self, topics: &[String]) -> Result<()> {
        if !self.allow_missing_topics {
            self.check_topics_exist(topics).await?;
        }

        let names: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer
            .subscribe(&names)
            .map_err(|e| Error::InvalidTopic(format!("Failed to subscribe to topics: {e}")))
    }

    async fn poll(&mut self, max: usize, timeout: Duration) -> Result<Vec<RawMessage>> {
        let consumer = &*self.consumer;
        collect_batch(
            max,
            timeout,
            BATCH_FILL_TIMEOUT,
            &mut self.pending_error,
            move || async move { consumer.recv().await.map(|msg| raw_message(&msg)) },
        )
        .await
        .map_err(consume_error)
    }

    async fn commit(&mut self, positions: &[TopicPosition]) -> Result<()> {
        if positions.is_empty() {
            return Ok(());
        }

        let mut tpl = TopicPartitionList::new();
        for position in positions {
            tpl.add_partition_offset(
                &position.topic,
                position.partition,
                Offset::Offset(position.next_offset),
            )
            .map_err(|e| Error::TransportDisconnected(format!("Failed to add partition offset: {e}")))?;
        }

        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .map_err(|e| Error::TransportDisconnected(format!("Failed to commit offset: {e}")))?;

        debug!("Committed offsets for {} partitions", positions.len());
        Ok(())
    }
}
