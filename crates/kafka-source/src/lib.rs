//! Avro record subscriber.
//!
//! This crate provides:
//! - [`Subscriber`]: poll, decode, dispatch and commit, with reconnect backoff
//! - [`KafkaConnector`] / [`KafkaLogConsumer`]: the Kafka transport
//!
//! # Delivery
//!
//! Records are delivered at least once. A batch is committed only after
//! every record in it was handed to the [`RecordHandler`], including the
//! records that failed to decode (those go to
//! [`RecordHandler::on_failure`]). When the connection drops, or the schema
//! registry is unreachable for a whole batch, nothing is committed and the
//! batch is redelivered after reconnecting.

pub mod backoff;
pub mod config;
pub mod kafka;
pub mod subscriber;

pub use backoff::Backoff;
pub use config::{KafkaConsumerConfig, SubscriberConfig};
pub use kafka::{KafkaConnector, KafkaLogConsumer};
pub use subscriber::{
    PolledBatch, RecordHandler, Subscriber, SubscriberState, SubscriberStats,
    NULL_RECORD_VALUE,
};
