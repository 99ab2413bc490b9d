//! Kafka transport for the publisher.

use async_trait::async_trait;
use kafka_types::{
    DeliveryReceipt, Error, LogProducer, OutboundMessage, PendingDelivery, Result,
    SecuritySettings,
};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{DeliveryFuture, FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::KafkaProducerConfig;

/// Pause between hand-off attempts while the client queue is full.
const QUEUE_FULL_RETRY_INTERVAL: Duration = Duration::from_millis(10);

fn client_config(brokers: &str, security: &SecuritySettings) -> ClientConfig {
    let mut config = ClientConfig::new();
    config.set("bootstrap.servers", brokers);
    for (key, value) in security.client_properties() {
        config.set(key, value);
    }
    config
}

/// [`LogProducer`] backed by an rdkafka `FutureProducer`.
#[derive(Clone)]
pub struct KafkaLogProducer {
    producer: FutureProducer,
}

impl KafkaLogProducer {
    pub fn new(config: &KafkaProducerConfig) -> Result<Self> {
        let mut client = client_config(&config.brokers, &config.security);
        client
            .set("acks", &config.acks)
            .set(
                "message.timeout.ms",
                config.message_timeout.as_millis().to_string(),
            )
            .set(
                "queue.buffering.max.messages",
                config.queue_buffering_max_messages.to_string(),
            );

        if config.acks_all() {
            client.set("enable.idempotence", "true");
        } else {
            // Idempotence needs acks=all; keep retries from reordering instead.
            warn!(
                "acks={} disables idempotent delivery; limiting to one in-flight request",
                config.acks
            );
            client.set("max.in.flight.requests.per.connection", "1");
        }

        let producer: FutureProducer = client
            .create()
            .map_err(|e| Error::InvalidConfig(format!("Failed to create Kafka producer: {e}")))?;

        info!("Created Kafka producer for {}", config.brokers);
        Ok(Self { producer })
    }

    pub fn inner(&self) -> &FutureProducer {
        &self.producer
    }
}

fn pending(delivery: DeliveryFuture, topic: String) -> PendingDelivery {
    Box::pin(async move {
        match delivery.await {
            Ok(Ok((partition, offset))) => Ok(DeliveryReceipt {
                topic,
                partition,
                offset,
            }),
            Ok(Err((err, _message))) => Err(Error::Delivery(err.to_string())),
            Err(_canceled) => Err(Error::TransportDisconnected(
                "producer closed before the delivery report arrived".to_string(),
            )),
        }
    })
}

#[async_trait]
impl LogProducer for KafkaLogProducer {
    async fn enqueue(
        &self,
        message: OutboundMessage,
        queue_timeout: Duration,
    ) -> Result<PendingDelivery> {
        let deadline = Instant::now() + queue_timeout;
        let OutboundMessage {
            topic,
            key,
            payload,
        } = message;

        loop {
            let record: FutureRecord<'_, Vec<u8>, Vec<u8>> = FutureRecord {
                topic: &topic,
                partition: None,
                payload: Some(&payload),
                key: key.as_ref(),
                timestamp: None,
                headers: None,
            };

            match self.producer.send_result(record) {
                Ok(delivery) => return Ok(pending(delivery, topic.clone())),
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), _)) => {}
                Err((err, _)) => return Err(Error::Delivery(err.to_string())),
            }

            if Instant::now() >= deadline {
                return Err(Error::BackpressureTimeout(queue_timeout));
            }
            debug!("Producer queue full, retrying hand-off to '{topic}'");
            tokio::time::sleep(QUEUE_FULL_RETRY_INTERVAL).await;
        }
    }

    async fn flush(&self, timeout: Duration) -> Result<()> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .map_err(|e| Error::Delivery(format!("flush task failed: {e}")))?
            .map_err(|e| Error::Delivery(format!("flush incomplete: {e}")))
    }
}

/// Create `topic` with `partitions` partitions unless it already exists.
pub async fn create_topic_if_not_exists(
    brokers: &str,
    security: &SecuritySettings,
    topic: &str,
    partitions: i32,
    replication: i32,
) -> Result<()> {
    let admin_client: AdminClient<DefaultClientContext> = client_config(brokers, security)
        .create()
        .map_err(|e| Error::InvalidConfig(format!("Failed to create admin client: {e}")))?;

    let new_topic = NewTopic::new(topic, partitions, TopicReplication::Fixed(replication));
    let opts = AdminOptions::new().operation_timeout(Some(Duration::from_secs(5)));

    let results = admin_client
        .create_topics(&[new_topic], &opts)
        .await
        .map_err(|e| Error::TransportDisconnected(format!("Failed to create topics: {e}")))?;

    for result in results {
        match result {
            Ok(topic_name) => info!("Topic '{topic_name}' created successfully"),
            Err((topic_name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                info!("Topic '{topic_name}' already exists")
            }
            Err((topic_name, code)) => {
                return Err(Error::InvalidTopic(format!(
                    "Failed to create topic '{topic_name}': {code}"
                )))
            }
        }
    }

    Ok(())
}
