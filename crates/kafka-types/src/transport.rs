//! Log transport capabilities.
//!
//! The publisher and subscriber only see these traits. The Kafka-backed
//! implementations live in the producer and source crates; [`crate::memory`]
//! provides an in-process log with the same semantics.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::message::{DeliveryReceipt, OutboundMessage, RawMessage, TopicPosition};

/// Where a group member starts reading a partition the group has never
/// committed a position for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetReset {
    /// Start from the first retained message (reprocess full history).
    #[default]
    Earliest,
    /// Start from the end; only messages produced from now on are read.
    Latest,
}

impl OffsetReset {
    /// Value of the `auto.offset.reset` client property.
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

impl std::str::FromStr for OffsetReset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "earliest" | "smallest" | "beginning" => Ok(OffsetReset::Earliest),
            "latest" | "largest" | "end" => Ok(OffsetReset::Latest),
            other => Err(Error::InvalidConfig(format!(
                "unknown offset reset policy '{other}'"
            ))),
        }
    }
}

/// Resolves once the log has acknowledged (or rejected) a message.
pub type PendingDelivery = BoxFuture<'static, Result<DeliveryReceipt>>;

/// Producer side of the log.
#[async_trait]
pub trait LogProducer: Send + Sync + 'static {
    /// Hand a message to the send buffer.
    ///
    /// Waits while the buffer is full, up to `queue_timeout`, then fails with
    /// `BackpressureTimeout`. Messages handed over for the same key keep their
    /// relative order in the log.
    async fn enqueue(
        &self,
        message: OutboundMessage,
        queue_timeout: Duration,
    ) -> Result<PendingDelivery>;

    /// Wait for everything in the send buffer to be acknowledged.
    async fn flush(&self, timeout: Duration) -> Result<()>;
}

/// Consumer side of the log. One instance is one group member.
#[async_trait]
pub trait LogConsumer: Send + 'static {
    async fn subscribe(&mut self, topics: &[String]) -> Result<()>;

    /// Wait up to `timeout` for at least one message and return up to `max`.
    /// Returns an empty batch on timeout.
    async fn poll(&mut self, max: usize, timeout: Duration) -> Result<Vec<RawMessage>>;

    /// Record the group's position for each partition.
    async fn commit(&mut self, positions: &[TopicPosition]) -> Result<()>;
}

/// Opens consumer connections. Used for the initial connect and for every
/// reconnect after a disconnection.
#[async_trait]
pub trait LogConnector: Send + Sync + 'static {
    type Consumer: LogConsumer;

    async fn connect(&self) -> Result<Self::Consumer>;
}
