//! Shared types for the avro-pipeline workspace.
//!
//! Every other crate depends on this one for the data model and the
//! capability traits it programs against:
//!
//! ```text
//! Publisher:   Record ──encode──▶ OutboundMessage ──LogProducer──▶ DeliveryOutcome
//! Subscriber:  LogConsumer ──▶ RawMessage ──decode──▶ ConsumedRecord / ConsumeFailure
//! ```
//!
//! # Modules
//!
//! - [`record`] / [`schema`] - records and the schemas they conform to
//! - [`message`] - raw, decoded and delivered messages
//! - [`transport`] - the log capability traits
//! - [`memory`] - an in-process log implementing those traits
//! - [`security`] - credential plumbing handed to the Kafka clients
//! - [`error`] - the error taxonomy

pub mod error;
pub mod memory;
pub mod message;
pub mod record;
pub mod schema;
pub mod security;
pub mod transport;

pub use error::{Error, Result};
pub use memory::{MemoryConnector, MemoryConsumer, MemoryLog, MemoryProducer};
pub use message::{
    ConsumeFailure, ConsumedRecord, DeliveryFailure, DeliveryOutcome, DeliveryReceipt,
    OutboundMessage, RawMessage, SchemaId, TopicPosition,
};
pub use record::{FieldValue, Record};
pub use schema::{FieldSchema, FieldType, RecordSchema};
pub use security::{
    CredentialProvider, SaslSettings, SecuritySettings, StaticCredentials, TlsSettings,
};
pub use transport::{
    LogConnector, LogConsumer, LogProducer, OffsetReset, PendingDelivery,
};
