//! The consumer loop and its default record handler.

use anyhow::Context;
use async_trait::async_trait;
use avro_codec::Decoder;
use avro_pipeline_kafka_source::{
    KafkaConnector, RecordHandler, Subscriber, SubscriberStats, NULL_RECORD_VALUE,
};
use kafka_types::{ConsumeFailure, ConsumedRecord, Error};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ConsumerLoopConfig;

/// Logs every received `Users` record.
#[derive(Debug, Default)]
pub struct UserLogger {
    received: u64,
    skipped: u64,
}

impl UserLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

#[async_trait]
impl RecordHandler for UserLogger {
    async fn on_record(&mut self, consumed: &ConsumedRecord) {
        self.received += 1;
        let field = |name: &str| {
            consumed
                .record
                .get(name)
                .map(|value| value.to_string())
                .unwrap_or_else(|| "<missing>".to_string())
        };
        info!(
            "Received User: id={}, name={}, age={}, partition={}, offset={}",
            field("id"),
            field("name"),
            field("age"),
            consumed.partition,
            consumed.offset
        );
    }

    async fn on_failure(&mut self, failure: &ConsumeFailure) {
        self.skipped += 1;
        if is_null_value(&failure.error) {
            warn!("Received a null record value.");
        } else {
            warn!(
                "Skipping record at partition {} offset {}: {}",
                failure.partition, failure.offset, failure.error
            );
        }
    }
}

fn is_null_value(error: &Error) -> bool {
    matches!(error, Error::MalformedPayload(reason) if reason == NULL_RECORD_VALUE)
}

/// Consume and log `Users` records from Kafka until `shutdown` fires.
///
/// Returns the subscriber's final counters. Fails once reconnecting has
/// been given up, or straight away for errors reconnecting cannot fix,
/// such as a missing topic.
pub async fn run_consumer_loop<H>(
    config: ConsumerLoopConfig,
    handler: &mut H,
    shutdown: CancellationToken,
) -> anyhow::Result<SubscriberStats>
where
    H: RecordHandler + ?Sized,
{
    info!(
        "Starting consumer for {:?} on {} (group '{}', offset reset {})",
        config.subscriber.topics,
        config.consumer.brokers,
        config.consumer.group_id,
        config.consumer.auto_offset_reset.as_str()
    );

    let registry = config.registry.connect(&config.consumer.security)?;
    let mut subscriber = Subscriber::new(
        KafkaConnector::new(config.consumer),
        Decoder::new(registry),
        config.subscriber,
    );

    let result = subscriber.run(handler, &shutdown).await;
    let stats = subscriber.stats();
    info!(
        "Consumer stopped: {} delivered, {} failed, {} reconnects",
        stats.delivered, stats.failed, stats.reconnect_attempts
    );
    result.context("Consumer loop failed")?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::user;
    use kafka_types::SchemaId;

    fn consumed(offset: i64) -> ConsumedRecord {
        ConsumedRecord {
            record: user(7, "Alice", 30),
            schema_id: SchemaId(1),
            topic: "users".into(),
            partition: 0,
            offset,
            key: Some(b"7".to_vec()),
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_counts() {
        let mut logger = UserLogger::new();
        logger.on_record(&consumed(0)).await;
        logger.on_record(&consumed(1)).await;
        logger
            .on_failure(&ConsumeFailure {
                topic: "users".into(),
                partition: 0,
                offset: 2,
                key: None,
                error: Error::MalformedPayload(NULL_RECORD_VALUE.into()),
            })
            .await;
        assert_eq!((logger.received(), logger.skipped()), (2, 1));
    }

    #[test]
    fn test_null_value_detection() {
        assert!(is_null_value(&Error::MalformedPayload(
            NULL_RECORD_VALUE.into()
        )));
        assert!(!is_null_value(&Error::MalformedPayload("truncated".into())));
        assert!(!is_null_value(&Error::UnknownSchema(SchemaId(3))));
    }
}
