use kafka_types::SecuritySettings;
use std::time::Duration;

/// Default wait for space in a full send buffer.
pub const DEFAULT_QUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings of a [`crate::Publisher`].
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Topic every record is published to.
    pub topic: String,
    /// How long `publish` waits for space in a full send buffer before
    /// reporting `BackpressureTimeout`.
    pub queue_timeout: Duration,
}

impl PublisherConfig {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            queue_timeout: DEFAULT_QUEUE_TIMEOUT,
        }
    }
}

/// Settings of a [`crate::KafkaLogProducer`].
#[derive(Debug, Clone)]
pub struct KafkaProducerConfig {
    /// Kafka brokers (comma-separated list)
    pub brokers: String,
    /// Acknowledgements required from the brokers ("all", "1", "0")
    pub acks: String,
    /// Upper bound on the time between hand-off and delivery report
    pub message_timeout: Duration,
    /// Messages the client buffers before hand-off blocks
    pub queue_buffering_max_messages: usize,
    pub security: SecuritySettings,
}

impl Default for KafkaProducerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            acks: "all".to_string(),
            message_timeout: Duration::from_secs(30),
            queue_buffering_max_messages: 100_000,
            security: SecuritySettings::default(),
        }
    }
}

impl KafkaProducerConfig {
    /// Whether the brokers must acknowledge on every in-sync replica.
    pub fn acks_all(&self) -> bool {
        matches!(self.acks.as_str(), "all" | "-1")
    }
}
