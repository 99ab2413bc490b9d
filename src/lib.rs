//! avro-pipeline
//!
//! Publishes and consumes schema-registered Avro records over Kafka.
//!
//! The work is split across the workspace crates:
//!
//! - `kafka-types` - records, schemas, messages, errors, transport traits and an in-memory log
//! - `schema-registry` - registry client, in-memory registry and cache
//! - `avro-codec` - Avro encoding with the schema id prefix
//! - `avro-pipeline-kafka-producer` - the [`Publisher`]
//! - `avro-pipeline-kafka-source` - the [`Subscriber`]
//!
//! This crate wires them into the two process entry points,
//! [`run_producer_loop`] and [`run_consumer_loop`], and the `avro-pipeline`
//! binary:
//!
//! ```bash
//! # Publish one random Users record per second
//! avro-pipeline produce --brokers localhost:9092 --topic users \
//!   --schema-registry-url http://localhost:8081 --create-topic
//!
//! # Log every Users record of the topic
//! avro-pipeline consume --brokers localhost:9092 --topic users --group-id demo
//! ```

pub mod config;
pub mod consumer;
pub mod credentials;
pub mod producer;
pub mod users;

pub use avro_pipeline_kafka_producer::Publisher;
pub use avro_pipeline_kafka_source::Subscriber;
pub use config::{ConsumeArgs, ConsumerLoopConfig, ProduceArgs, ProducerLoopConfig};
pub use consumer::{run_consumer_loop, UserLogger};
pub use credentials::EnvCredentialProvider;
pub use producer::{drive_producer, log_delivery, run_producer_loop, Schedule};
pub use users::{user, users_schema, RandomUserGenerator, RecordGenerator, USERS_SCHEMA};
