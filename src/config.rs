//! Command-line and environment configuration.
//!
//! Every option can also be given through the environment variable named
//! in its help text. Secrets (passwords, JAAS config, registry credentials)
//! are never taken from the command line: they are read from the
//! environment by [`EnvCredentialProvider`].

use anyhow::Context;
use avro_pipeline_kafka_producer::{KafkaProducerConfig, PublisherConfig};
use avro_pipeline_kafka_source::{Backoff, KafkaConsumerConfig, SubscriberConfig};
use clap::Args;
use kafka_types::{
    CredentialProvider, OffsetReset, SaslSettings, SecuritySettings, TlsSettings,
};
use schema_registry::{CachedSchemaRegistry, HttpSchemaRegistry};
use std::time::Duration;

use crate::credentials::EnvCredentialProvider;

/// Broker connection options shared by both subcommands.
#[derive(Args, Clone, Debug)]
pub struct KafkaArgs {
    /// Kafka bootstrap servers (comma-separated list)
    #[arg(long, env = "KAFKA_BROKERS", default_value = "localhost:9092")]
    pub brokers: String,

    /// Topic to produce to or consume from
    #[arg(long, env = "KAFKA_TOPIC", default_value = "users")]
    pub topic: String,

    #[command(flatten)]
    pub security: SecurityArgs,
}

/// Schema registry options.
#[derive(Args, Clone, Debug)]
pub struct RegistryArgs {
    /// Schema registry URL
    #[arg(long, env = "SCHEMA_REGISTRY_URL", default_value = "http://localhost:8081")]
    pub schema_registry_url: String,

    /// Timeout of every schema registry request, in milliseconds
    #[arg(long, env = "SCHEMA_REGISTRY_TIMEOUT_MS", default_value_t = 10_000)]
    pub schema_registry_timeout_ms: u64,
}

impl RegistryArgs {
    /// An HTTP registry client behind a process-wide cache.
    pub fn connect(
        &self,
        security: &SecuritySettings,
    ) -> anyhow::Result<CachedSchemaRegistry<HttpSchemaRegistry>> {
        let mut registry = HttpSchemaRegistry::new(
            &self.schema_registry_url,
            Duration::from_millis(self.schema_registry_timeout_ms),
        )
        .with_context(|| {
            format!(
                "Failed to create schema registry client for {}",
                self.schema_registry_url
            )
        })?;
        if let Some(user_info) = &security.registry_basic_auth {
            registry = registry.with_basic_auth(user_info);
        }
        Ok(CachedSchemaRegistry::new(registry))
    }
}

/// Non-secret security options.
#[derive(Args, Clone, Debug, Default)]
pub struct SecurityArgs {
    /// Protocol used to talk to the brokers (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL)
    #[arg(long, env = "KAFKA_SECURITY_PROTOCOL")]
    pub security_protocol: Option<String>,

    /// SASL mechanism (GSSAPI, PLAIN, SCRAM-SHA-256, SCRAM-SHA-512)
    #[arg(long, env = "KAFKA_SASL_MECHANISM")]
    pub sasl_mechanism: Option<String>,

    /// Kerberos service name of the brokers
    #[arg(long, env = "KAFKA_SASL_KERBEROS_SERVICE_NAME")]
    pub sasl_kerberos_service_name: Option<String>,

    /// Kerberos keytab of this client
    #[arg(long, env = "KAFKA_SASL_KERBEROS_KEYTAB")]
    pub sasl_kerberos_keytab: Option<String>,

    /// Kerberos principal of this client
    #[arg(long, env = "KAFKA_SASL_KERBEROS_PRINCIPAL")]
    pub sasl_kerberos_principal: Option<String>,

    /// SASL username (the password is read from KAFKA_SASL_PASSWORD)
    #[arg(long, env = "KAFKA_SASL_USERNAME")]
    pub sasl_username: Option<String>,

    /// Client keystore (the password is read from KAFKA_SSL_KEYSTORE_PASSWORD)
    #[arg(long, env = "KAFKA_SSL_KEYSTORE_LOCATION")]
    pub ssl_keystore_location: Option<String>,

    /// CA bundle used to verify the brokers
    #[arg(long, env = "KAFKA_SSL_TRUSTSTORE_LOCATION")]
    pub ssl_truststore_location: Option<String>,

    /// Hostname verification algorithm; empty disables verification
    #[arg(long, env = "KAFKA_SSL_ENDPOINT_IDENTIFICATION_ALGORITHM")]
    pub ssl_endpoint_identification_algorithm: Option<String>,
}

impl SecurityArgs {
    /// Settings carrying everything but the secrets.
    pub fn settings(&self) -> SecuritySettings {
        let sasl = self.sasl_mechanism.as_ref().map(|mechanism| SaslSettings {
            mechanism: mechanism.clone(),
            kerberos_service_name: self.sasl_kerberos_service_name.clone(),
            kerberos_keytab: self.sasl_kerberos_keytab.clone(),
            kerberos_principal: self.sasl_kerberos_principal.clone(),
            username: self.sasl_username.clone(),
            ..Default::default()
        });

        let tls = (self.ssl_keystore_location.is_some()
            || self.ssl_truststore_location.is_some()
            || self.ssl_endpoint_identification_algorithm.is_some())
        .then(|| TlsSettings {
            keystore_location: self.ssl_keystore_location.clone(),
            truststore_location: self.ssl_truststore_location.clone(),
            endpoint_identification_algorithm: self.ssl_endpoint_identification_algorithm.clone(),
            ..Default::default()
        });

        SecuritySettings {
            protocol: self.security_protocol.clone(),
            sasl,
            tls,
            registry_basic_auth: None,
        }
    }

    /// Settings completed with the secrets found in the environment.
    pub fn resolve(&self) -> anyhow::Result<SecuritySettings> {
        EnvCredentialProvider::new(self.settings())
            .security_settings()
            .context("Failed to read security credentials")
    }
}

/// Options of the `produce` subcommand.
#[derive(Args, Clone, Debug)]
pub struct ProduceArgs {
    #[command(flatten)]
    pub kafka: KafkaArgs,

    #[command(flatten)]
    pub registry: RegistryArgs,

    /// Acknowledgements required from the brokers ("all", "1", "0")
    #[arg(long, env = "KAFKA_ACKS", default_value = "all")]
    pub acks: String,

    /// Delay between two published records, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub interval_ms: u64,

    /// Stop after this many records (default: run until interrupted)
    #[arg(long)]
    pub count: Option<u64>,

    /// Seed of the record generator (default: random)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Create the topic before producing if it does not exist
    #[arg(long)]
    pub create_topic: bool,

    /// Partition count of a created topic
    #[arg(long, default_value_t = 3)]
    pub partitions: i32,

    /// Replication factor of a created topic
    #[arg(long, default_value_t = 1)]
    pub replication_factor: i32,

    /// How long a publish waits for room in a full send buffer, in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub queue_timeout_ms: u64,

    /// Upper bound on the time until a delivery report, in milliseconds
    #[arg(long, default_value_t = 30_000)]
    pub message_timeout_ms: u64,

    /// How long shutdown waits for in-flight publishes, in milliseconds
    #[arg(long, default_value_t = 10_000)]
    pub shutdown_grace_ms: u64,
}

/// Topic to create before producing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub partitions: i32,
    pub replication_factor: i32,
}

/// Fully resolved configuration of a producer loop.
#[derive(Debug, Clone)]
pub struct ProducerLoopConfig {
    pub producer: KafkaProducerConfig,
    pub publisher: PublisherConfig,
    pub registry: RegistryArgs,
    pub create_topic: Option<TopicSpec>,
    pub interval: Duration,
    pub count: Option<u64>,
    pub shutdown_grace: Duration,
}

impl ProduceArgs {
    pub fn into_config(self) -> anyhow::Result<ProducerLoopConfig> {
        if self.interval_ms == 0 {
            anyhow::bail!("--interval-ms must be greater than zero");
        }
        let security = self.kafka.security.resolve()?;

        Ok(ProducerLoopConfig {
            producer: KafkaProducerConfig {
                brokers: self.kafka.brokers,
                acks: self.acks,
                message_timeout: Duration::from_millis(self.message_timeout_ms),
                security,
                ..Default::default()
            },
            publisher: PublisherConfig {
                topic: self.kafka.topic,
                queue_timeout: Duration::from_millis(self.queue_timeout_ms),
            },
            registry: self.registry,
            create_topic: self.create_topic.then_some(TopicSpec {
                partitions: self.partitions,
                replication_factor: self.replication_factor,
            }),
            interval: Duration::from_millis(self.interval_ms),
            count: self.count,
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        })
    }
}

/// Options of the `consume` subcommand.
#[derive(Args, Clone, Debug)]
pub struct ConsumeArgs {
    #[command(flatten)]
    pub kafka: KafkaArgs,

    #[command(flatten)]
    pub registry: RegistryArgs,

    /// Consumer group ID
    #[arg(long, env = "KAFKA_GROUP_ID", default_value = "avro-pipeline-consumer")]
    pub group_id: String,

    /// Where to start when the group has no committed offset (earliest, latest)
    #[arg(long, env = "KAFKA_AUTO_OFFSET_RESET", default_value = "earliest")]
    pub auto_offset_reset: OffsetReset,

    /// Maximum number of records handled and committed together
    #[arg(long, default_value_t = 100)]
    pub max_batch_size: usize,

    /// How long one poll waits for records, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub poll_timeout_ms: u64,

    /// Consecutive reconnects without a successful poll before giving up
    #[arg(long, default_value_t = 5)]
    pub max_reconnect_attempts: u32,

    /// First reconnect delay, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub backoff_initial_ms: u64,

    /// Largest reconnect delay, in milliseconds
    #[arg(long, default_value_t = 1600)]
    pub backoff_max_ms: u64,

    /// Subscribe even if the topic does not exist yet
    #[arg(long)]
    pub allow_missing_topics: bool,
}

/// Fully resolved configuration of a consumer loop.
#[derive(Debug, Clone)]
pub struct ConsumerLoopConfig {
    pub consumer: KafkaConsumerConfig,
    pub subscriber: SubscriberConfig,
    pub registry: RegistryArgs,
}

impl ConsumeArgs {
    pub fn into_config(self) -> anyhow::Result<ConsumerLoopConfig> {
        if self.max_batch_size == 0 {
            anyhow::bail!("--max-batch-size must be greater than zero");
        }
        if self.backoff_initial_ms > self.backoff_max_ms {
            anyhow::bail!(
                "--backoff-initial-ms ({}) exceeds --backoff-max-ms ({})",
                self.backoff_initial_ms,
                self.backoff_max_ms
            );
        }
        let security = self.kafka.security.resolve()?;

        Ok(ConsumerLoopConfig {
            consumer: KafkaConsumerConfig {
                brokers: self.kafka.brokers,
                group_id: self.group_id,
                auto_offset_reset: self.auto_offset_reset,
                allow_missing_topics: self.allow_missing_topics,
                security,
                ..Default::default()
            },
            subscriber: SubscriberConfig {
                topics: vec![self.kafka.topic],
                max_batch_size: self.max_batch_size,
                poll_timeout: Duration::from_millis(self.poll_timeout_ms),
                backoff: Backoff {
                    initial_delay: Duration::from_millis(self.backoff_initial_ms),
                    max_delay: Duration::from_millis(self.backoff_max_ms),
                    ..Default::default()
                },
                max_reconnect_attempts: self.max_reconnect_attempts,
            },
            registry: self.registry,
        })
    }
}
