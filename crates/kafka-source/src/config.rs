use kafka_types::{OffsetReset, SecuritySettings};
use std::time::Duration;

use crate::backoff::Backoff;

/// Configuration for a [`crate::Subscriber`]
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Topics to subscribe to
    pub topics: Vec<String>,
    /// Maximum number of records returned by one poll
    ///
    /// A whole batch is committed at once, so a larger batch means fewer
    /// commits in exchange for more redelivered records after a failure.
    pub max_batch_size: usize,
    /// How long one poll waits for the first record
    pub poll_timeout: Duration,
    /// Delay between reconnect attempts
    pub backoff: Backoff,
    /// Consecutive reconnects without a successful poll before giving up
    pub max_reconnect_attempts: u32,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            max_batch_size: 100,
            poll_timeout: Duration::from_millis(100),
            backoff: Backoff::default(),
            max_reconnect_attempts: 5,
        }
    }
}

/// Configuration for a [`crate::KafkaConnector`]
#[derive(Debug, Clone)]
pub struct KafkaConsumerConfig {
    /// Kafka brokers (comma-separated list)
    pub brokers: String,
    /// Consumer group ID
    pub group_id: String,
    /// Where to start on partitions the group has no committed offset for
    ///
    /// `Earliest` reprocesses the retained history, `Latest` only sees
    /// records produced after the group joined.
    pub auto_offset_reset: OffsetReset,
    /// Session timeout in milliseconds
    pub session_timeout_ms: String,
    /// Subscribe even when none of the topics exist yet
    pub allow_missing_topics: bool,
    /// Timeout of the metadata request checking the topics exist
    pub metadata_timeout: Duration,
    pub security: SecuritySettings,
}

impl Default for KafkaConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: "avro-pipeline-consumer".to_string(),
            auto_offset_reset: OffsetReset::Earliest,
            session_timeout_ms: "6000".to_string(),
            allow_missing_topics: false,
            metadata_timeout: Duration::from_secs(5),
            security: SecuritySettings::default(),
        }
    }
}
