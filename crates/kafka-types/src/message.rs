//! Message types.
//!
//! Raw messages as the log transport hands them over, decoded records as the
//! subscriber hands them to handlers, and delivery outcomes as the publisher
//! reports them.

use std::fmt;

use crate::error::Error;
use crate::record::Record;

/// Registry-assigned schema identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(pub u32);

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message on its way into the log.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

/// A message as read from the log, before decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    /// `None` for a null record value (tombstone).
    pub payload: Option<Vec<u8>>,
    /// Milliseconds since epoch, when the log records one.
    pub timestamp: Option<i64>,
}

/// A decoded record together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumedRecord {
    pub record: Record,
    pub schema_id: SchemaId,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub timestamp: Option<i64>,
}

impl ConsumedRecord {
    pub fn key_str(&self) -> Option<&str> {
        self.key.as_deref().and_then(|k| std::str::from_utf8(k).ok())
    }
}

/// A record that could not be decoded and was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumeFailure {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub error: Error,
}

/// Next offset to read for one partition of one topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPosition {
    pub topic: String,
    pub partition: i32,
    pub next_offset: i64,
}

/// Where a published message landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Why a publish did not produce a receipt.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryFailure {
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub error: Error,
}

/// Exactly one of these is reported for every publish.
pub type DeliveryOutcome = std::result::Result<DeliveryReceipt, DeliveryFailure>;
