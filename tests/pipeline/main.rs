//! Producer and consumer loops running against the in-memory log and registry.
//!
//! No broker or registry is needed; the same code paths as the Kafka
//! binaries are exercised through `MemoryLog` and `MemorySchemaRegistry`.

mod end_to_end;
mod producer_loop;

use async_trait::async_trait;
use avro_codec::Decoder;
use avro_pipeline::{Publisher, Subscriber};
use avro_pipeline_kafka_producer::PublisherConfig;
use avro_pipeline_kafka_source::{RecordHandler, SubscriberConfig};
use kafka_types::{
    ConsumeFailure, ConsumedRecord, MemoryConnector, MemoryLog, MemoryProducer, OffsetReset,
};
use schema_registry::MemorySchemaRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const TOPIC: &str = "users";
pub const GROUP: &str = "pipeline-test";

pub type Registry = Arc<MemorySchemaRegistry>;

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("avro_pipeline=debug")
        .with_test_writer()
        .try_init()
        .ok();
}

/// A log with one topic and a registry both sides share.
pub struct Harness {
    pub log: MemoryLog,
    pub registry: Registry,
}

impl Harness {
    pub fn new(partitions: i32) -> Self {
        init_tracing();
        let log = MemoryLog::new();
        log.create_topic(TOPIC, partitions);
        Self {
            log,
            registry: Arc::new(MemorySchemaRegistry::new()),
        }
    }

    pub fn publisher(&self, capacity: usize) -> Publisher<MemoryProducer, Registry> {
        Publisher::new(
            self.log.producer(capacity),
            self.registry.clone(),
            avro_pipeline::users_schema(),
            PublisherConfig::new(TOPIC),
        )
    }

    pub fn subscriber(&self) -> Subscriber<MemoryConnector, Registry> {
        Subscriber::new(
            self.log.connector(GROUP, OffsetReset::Earliest),
            Decoder::new(self.registry.clone()),
            SubscriberConfig {
                topics: vec![TOPIC.to_string()],
                poll_timeout: Duration::from_millis(20),
                ..Default::default()
            },
        )
    }
}

/// Collects what a subscriber delivers and stops it after `stop_after` records.
pub struct Collect {
    pub records: Vec<ConsumedRecord>,
    pub failures: Vec<ConsumeFailure>,
    stop_after: usize,
    shutdown: CancellationToken,
}

impl Collect {
    pub fn new(stop_after: usize, shutdown: &CancellationToken) -> Self {
        Self {
            records: Vec::new(),
            failures: Vec::new(),
            stop_after,
            shutdown: shutdown.clone(),
        }
    }
}

#[async_trait]
impl RecordHandler for Collect {
    async fn on_record(&mut self, record: &ConsumedRecord) {
        self.records.push(record.clone());
        if self.records.len() >= self.stop_after {
            self.shutdown.cancel();
        }
    }

    async fn on_failure(&mut self, failure: &ConsumeFailure) {
        self.failures.push(failure.clone());
    }
}
