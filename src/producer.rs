//! The producer loop: generate, publish, repeat, then shut down cleanly.

use anyhow::Context;
use avro_pipeline_kafka_producer::{
    create_topic_if_not_exists, CompletionHandler, KafkaLogProducer, Publisher, ShutdownReport,
};
use kafka_types::{DeliveryOutcome, LogProducer};
use schema_registry::SchemaRegistry;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::ProducerLoopConfig;
use crate::users::{users_schema, RecordGenerator};

/// Pacing of a producer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Delay between two publishes.
    pub interval: Duration,
    /// Stop after this many publishes.
    pub count: Option<u64>,
    /// Time given to in-flight publishes once the loop stops.
    pub shutdown_grace: Duration,
}

/// Logs the outcome of every publish.
pub fn log_delivery(outcome: &DeliveryOutcome) {
    match outcome {
        Ok(receipt) => info!(
            "Sent Avro message to topic {} partition {} offset {}",
            receipt.topic, receipt.partition, receipt.offset
        ),
        Err(failure) => error!(
            "Error sending Avro message to topic {}: {}",
            failure.topic, failure.error
        ),
    }
}

/// Publish generated records on a fixed schedule until `shutdown` fires,
/// the count is reached or the generator runs dry.
///
/// The publisher is shut down before returning, so every publish has been
/// reported to `on_complete` when the report comes back.
pub async fn drive_producer<P, R, G, H>(
    publisher: Publisher<P, R>,
    generator: &mut G,
    on_complete: H,
    schedule: Schedule,
    shutdown: &CancellationToken,
) -> ShutdownReport
where
    P: LogProducer,
    R: SchemaRegistry,
    G: RecordGenerator + ?Sized,
    H: CompletionHandler + Clone,
{
    let mut ticker = tokio::time::interval(schedule.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut published = 0u64;

    loop {
        if schedule.count.is_some_and(|count| published >= count) {
            info!("Published {published} records, stopping");
            break;
        }

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested after {published} records");
                break;
            }
            _ = ticker.tick() => {}
        }

        let Some((key, record)) = generator.next_record() else {
            info!("Record generator exhausted after {published} records");
            break;
        };
        // The receipt also goes to `on_complete`; no need to wait for it here.
        let _ = publisher
            .publish(key.as_deref(), &record, on_complete.clone())
            .await;
        published += 1;
    }

    publisher.shutdown(schedule.shutdown_grace).await
}

/// Publish `Users` records to Kafka until `shutdown` fires.
pub async fn run_producer_loop<G>(
    config: ProducerLoopConfig,
    generator: &mut G,
    shutdown: CancellationToken,
) -> anyhow::Result<ShutdownReport>
where
    G: RecordGenerator + ?Sized,
{
    let topic = config.publisher.topic.clone();
    info!(
        "Starting producer for topic '{topic}' on {} (acks={})",
        config.producer.brokers, config.producer.acks
    );

    if let Some(spec) = &config.create_topic {
        create_topic_if_not_exists(
            &config.producer.brokers,
            &config.producer.security,
            &topic,
            spec.partitions,
            spec.replication_factor,
        )
        .await
        .with_context(|| format!("Failed to create topic '{topic}'"))?;
    }

    let registry = config.registry.connect(&config.producer.security)?;
    let transport =
        KafkaLogProducer::new(&config.producer).context("Failed to create Kafka producer")?;
    let publisher = Publisher::new(transport, registry, users_schema(), config.publisher);

    let schedule = Schedule {
        interval: config.interval,
        count: config.count,
        shutdown_grace: config.shutdown_grace,
    };
    Ok(drive_producer(publisher, generator, log_delivery, schedule, &shutdown).await)
}
