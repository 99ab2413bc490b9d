//! Error taxonomy shared by every stage of the pipeline.

use std::time::Duration;
use thiserror::Error;

use crate::message::SchemaId;

/// Errors that can occur while encoding, publishing, consuming or decoding records.
///
/// Per-record errors (`SchemaMismatch`, `UnknownSchema`, `MalformedPayload`,
/// `BackpressureTimeout`, `Delivery`, `Abandoned`) are reported to the handler
/// of the affected record. Connection-level errors (`TransportDisconnected`,
/// sustained `RegistryUnavailable`) move the owning component to a
/// disconnected state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Record does not match schema: {0}")]
    SchemaMismatch(String),

    #[error("Schema registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Unknown schema id: {0}")]
    UnknownSchema(SchemaId),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Send buffer still full after {0:?}")]
    BackpressureTimeout(Duration),

    #[error("Transport disconnected: {0}")]
    TransportDisconnected(String),

    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Publish abandoned on shutdown")]
    Abandoned,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Errors that take the whole component down rather than a single record.
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            Error::TransportDisconnected(_) | Error::RegistryUnavailable(_)
        )
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_systemic_classification() {
        assert!(Error::TransportDisconnected("broker down".into()).is_systemic());
        assert!(Error::RegistryUnavailable("503".into()).is_systemic());
        assert!(!Error::UnknownSchema(SchemaId(4)).is_systemic());
        assert!(!Error::MalformedPayload("truncated".into()).is_systemic());
        assert!(!Error::Abandoned.is_systemic());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::UnknownSchema(SchemaId(42)).to_string(),
            "Unknown schema id: 42"
        );
        assert_eq!(
            Error::BackpressureTimeout(Duration::from_millis(250)).to_string(),
            "Send buffer still full after 250ms"
        );
    }
}
