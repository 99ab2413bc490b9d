use kafka_types::SchemaId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// The registry could not be reached, timed out, or answered 5xx.
    #[error("Schema registry unavailable: {0}")]
    Unavailable(String),

    #[error("Schema {0} not found")]
    NotFound(SchemaId),

    #[error("Schema incompatible with subject '{subject}': {message}")]
    Incompatible { subject: String, message: String },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Registry rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid registry URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

pub type Result<T> = std::result::Result<T, RegistryError>;
