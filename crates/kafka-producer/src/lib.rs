//! Avro record publisher.
//!
//! A [`Publisher`] encodes records against one schema, hands them to a
//! [`kafka_types::LogProducer`] and reports every outcome exactly once
//! through a [`CompletionHandler`]:
//!
//! ```rust,no_run
//! use avro_pipeline_kafka_producer::{KafkaLogProducer, KafkaProducerConfig, Publisher, PublisherConfig};
//! use kafka_types::{DeliveryOutcome, FieldType, Record, RecordSchema};
//! use schema_registry::{CachedSchemaRegistry, HttpSchemaRegistry, DEFAULT_REQUEST_TIMEOUT};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = KafkaLogProducer::new(&KafkaProducerConfig::default())?;
//! let registry = CachedSchemaRegistry::new(HttpSchemaRegistry::new(
//!     "http://localhost:8081",
//!     DEFAULT_REQUEST_TIMEOUT,
//! )?);
//! let schema = RecordSchema::new("Users")
//!     .field("id", FieldType::Int)
//!     .field("name", FieldType::String)
//!     .field("age", FieldType::Int);
//! let publisher = Publisher::new(transport, registry, schema, PublisherConfig::new("users"));
//!
//! let record = Record::new().with("id", 7).with("name", "Alice").with("age", 30);
//! publisher
//!     .publish(Some("7"), &record, |outcome: &DeliveryOutcome| println!("{outcome:?}"))
//!     .await;
//!
//! let report = publisher.shutdown(Duration::from_secs(5)).await;
//! assert_eq!(report.total(), 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod kafka;
pub mod publisher;

pub use config::{KafkaProducerConfig, PublisherConfig, DEFAULT_QUEUE_TIMEOUT};
pub use kafka::{create_topic_if_not_exists, KafkaLogProducer};
pub use publisher::{CompletionHandler, PendingReceipt, Publisher, ShutdownReport};
