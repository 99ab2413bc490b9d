use async_trait::async_trait;
use avro_codec::Decoder;
use kafka_types::{
    ConsumeFailure, ConsumedRecord, Error, LogConnector, LogConsumer, RawMessage, Result,
    TopicPosition,
};
use schema_registry::SchemaRegistry;
use std::collections::BTreeMap;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SubscriberConfig;

/// Lifecycle of a [`Subscriber`].
///
/// ```text
/// Disconnected -> Subscribed -> Polling <-> Processing -> Closed
///       ^                          |
///       +------ systemic error ----+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriberState {
    #[default]
    Disconnected,
    Subscribed,
    Polling,
    Processing,
    Closed,
}

impl fmt::Display for SubscriberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubscriberState::Disconnected => "disconnected",
            SubscriberState::Subscribed => "subscribed",
            SubscriberState::Polling => "polling",
            SubscriberState::Processing => "processing",
            SubscriberState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Counters describing a subscriber's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscriberStats {
    pub state: SubscriberState,
    /// Records decoded and handed out.
    pub delivered: u64,
    /// Records that could not be decoded.
    pub failed: u64,
    pub reconnect_attempts: u64,
    pub disconnects: u64,
}

/// Records returned by one poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolledBatch {
    pub records: Vec<ConsumedRecord>,
    pub failures: Vec<ConsumeFailure>,
}

impl PolledBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len() + self.failures.len()
    }

    /// Position to commit for every partition in the batch: one past the
    /// highest offset seen, decoded or not.
    pub fn positions(&self) -> Vec<TopicPosition> {
        let mut highest: BTreeMap<(&str, i32), i64> = BTreeMap::new();
        let offsets = self
            .records
            .iter()
            .map(|r| (r.topic.as_str(), r.partition, r.offset))
            .chain(
                self.failures
                    .iter()
                    .map(|f| (f.topic.as_str(), f.partition, f.offset)),
            );
        for (topic, partition, offset) in offsets {
            let entry = highest.entry((topic, partition)).or_insert(offset);
            *entry = (*entry).max(offset);
        }
        highest
            .into_iter()
            .map(|((topic, partition), offset)| TopicPosition {
                topic: topic.to_string(),
                partition,
                next_offset: offset + 1,
            })
            .collect()
    }
}

/// Reason given for a record whose value is null (a tombstone).
pub const NULL_RECORD_VALUE: &str = "null record value";

async fn decode<R: SchemaRegistry>(
    decoder: &Decoder<R>,
    message: RawMessage,
) -> std::result::Result<ConsumedRecord, ConsumeFailure> {
    let RawMessage {
        topic,
        partition,
        offset,
        key,
        payload,
        timestamp,
    } = message;

    let decoded = match payload {
        Some(payload) => decoder.decode(&payload).await,
        None => Err(Error::MalformedPayload(NULL_RECORD_VALUE.to_string())),
    };

    match decoded {
        Ok(decoded) => Ok(ConsumedRecord {
            record: decoded.record,
            schema_id: decoded.schema_id,
            topic,
            partition,
            offset,
            key,
            timestamp,
        }),
        Err(error) => Err(ConsumeFailure {
            topic,
            partition,
            offset,
            key,
            error,
        }),
    }
}

/// Processes what a [`Subscriber`] delivers.
#[async_trait]
pub trait RecordHandler: Send {
    async fn on_record(&mut self, record: &ConsumedRecord);

    /// Called for every record that was skipped because it could not be decoded.
    async fn on_failure(&mut self, failure: &ConsumeFailure) {
        warn!(
            "Skipping record at {}/{} offset {}: {}",
            failure.topic, failure.partition, failure.offset, failure.error
        );
    }
}

/// Consumes records from a log, decodes them and commits processed batches.
///
/// Offsets are committed only through [`Subscriber::acknowledge`], after the
/// whole batch has been handled, so a crash or disconnection replays the
/// uncommitted records instead of losing them.
pub struct Subscriber<C: LogConnector, R> {
    connector: C,
    decoder: Decoder<R>,
    config: SubscriberConfig,
    consumer: Option<C::Consumer>,
    topics: Vec<String>,
    stats: SubscriberStats,
    consecutive_recoveries: u32,
    last_error: Option<Error>,
}

impl<C, R> Subscriber<C, R>
where
    C: LogConnector,
    R: SchemaRegistry,
{
    pub fn new(connector: C, decoder: Decoder<R>, config: SubscriberConfig) -> Self {
        let topics = config.topics.clone();
        Self {
            connector,
            decoder,
            config,
            consumer: None,
            topics,
            stats: SubscriberStats::default(),
            consecutive_recoveries: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> SubscriberState {
        self.stats.state
    }

    pub fn stats(&self) -> SubscriberStats {
        self.stats
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    fn set_state(&mut self, state: SubscriberState) {
        if self.stats.state != state {
            debug!("Subscriber {} -> {}", self.stats.state, state);
            self.stats.state = state;
        }
    }

    /// Drop the connection without committing anything.
    fn disconnect(&mut self, cause: &Error) {
        warn!("Subscriber disconnected: {cause}");
        self.consumer = None;
        self.stats.disconnects += 1;
        self.last_error = Some(cause.clone());
        self.set_state(SubscriberState::Disconnected);
    }

    /// Release the connection for good.
    pub fn close(&mut self) {
        if self.consumer.take().is_some() {
            info!("Subscriber to {:?} closed", self.topics);
        }
        self.set_state(SubscriberState::Closed);
    }

    /// Connect if needed and subscribe to `topics`.
    pub async fn subscribe(&mut self, topics: &[String]) -> Result<()> {
        if self.state() == SubscriberState::Closed {
            return Err(Error::InvalidConfig("subscriber is closed".to_string()));
        }
        if topics.is_empty() {
            return Err(Error::InvalidTopic("no topics to subscribe to".to_string()));
        }

        let mut consumer = match self.consumer.take() {
            Some(consumer) => consumer,
            None => self.connector.connect().await?,
        };

        match consumer.subscribe(topics).await {
            Ok(()) => {
                self.consumer = Some(consumer);
                self.topics = topics.to_vec();
                self.set_state(SubscriberState::Subscribed);
                info!("Subscribed to {topics:?}");
                Ok(())
            }
            Err(e) => {
                self.set_state(SubscriberState::Disconnected);
                Err(e)
            }
        }
    }

    /// Wait up to `timeout` for records and decode them.
    ///
    /// Records that fail to decode are returned as failures next to the
    /// decoded ones. When the transport drops, or when any record of the
    /// batch could not be decoded because the registry is unreachable, the
    /// connection is released without committing and the error is returned.
    pub async fn poll(&mut self, timeout: std::time::Duration) -> Result<PolledBatch> {
        let max = self.config.max_batch_size.max(1);
        let Some(consumer) = self.consumer.as_mut() else {
            return Err(Error::TransportDisconnected(format!(
                "cannot poll while {}",
                self.stats.state
            )));
        };
        self.stats.state = SubscriberState::Polling;

        let raw = match consumer.poll(max, timeout).await {
            Ok(raw) => raw,
            Err(e) => {
                if e.is_systemic() {
                    self.disconnect(&e);
                }
                return Err(e);
            }
        };

        let mut batch = PolledBatch::default();
        for message in raw {
            match decode(&self.decoder, message).await {
                Ok(record) => batch.records.push(record),
                Err(failure) => batch.failures.push(failure),
            }
        }

        // A record the registry could not resolve must stay uncommitted, so
        // the whole batch is dropped and redelivered after reconnecting.
        if let Some(outage) = batch
            .failures
            .iter()
            .find(|f| matches!(f.error, Error::RegistryUnavailable(_)))
        {
            let cause = outage.error.clone();
            self.disconnect(&cause);
            return Err(cause);
        }

        self.consecutive_recoveries = 0;
        self.stats.delivered += batch.records.len() as u64;
        self.stats.failed += batch.failures.len() as u64;
        if !batch.is_empty() {
            debug!(
                "Polled {} records ({} failed)",
                batch.len(),
                batch.failures.len()
            );
            self.set_state(SubscriberState::Processing);
        }
        Ok(batch)
    }

    /// Commit every record of a processed batch.
    pub async fn acknowledge(&mut self, batch: &PolledBatch) -> Result<()> {
        let positions = batch.positions();
        let Some(consumer) = self.consumer.as_mut() else {
            return Err(Error::TransportDisconnected(
                "cannot commit while disconnected".to_string(),
            ));
        };

        if !positions.is_empty() {
            if let Err(e) = consumer.commit(&positions).await {
                if e.is_systemic() {
                    self.disconnect(&e);
                }
                return Err(e);
            }
            debug!("Committed {} partition positions", positions.len());
        }

        self.set_state(SubscriberState::Polling);
        Ok(())
    }

    /// Reconnect and re-subscribe, backing off between attempts.
    ///
    /// Gives up with the last error once `max_reconnect_attempts`
    /// consecutive recoveries have happened without a successful poll.
    /// Returns `Ok` without reconnecting if `shutdown` fires first; the
    /// subscriber is then closed.
    pub async fn reconnect(&mut self, shutdown: &CancellationToken) -> Result<()> {
        self.consumer = None;
        self.set_state(SubscriberState::Disconnected);

        loop {
            if self.consecutive_recoveries >= self.config.max_reconnect_attempts {
                let cause = self.last_error.clone().unwrap_or_else(|| {
                    Error::TransportDisconnected("connection lost".to_string())
                });
                error!(
                    "Giving up after {} reconnect attempts: {cause}",
                    self.consecutive_recoveries
                );
                return Err(cause);
            }

            self.consecutive_recoveries += 1;
            self.stats.reconnect_attempts += 1;
            let delay = self.config.backoff.delay(self.consecutive_recoveries);
            warn!(
                "Reconnecting (attempt {}/{}), waiting {}ms",
                self.consecutive_recoveries,
                self.config.max_reconnect_attempts,
                delay.as_millis()
            );

            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.close();
                    return Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let topics = self.topics.clone();
            match self.subscribe(&topics).await {
                Ok(()) => {
                    info!("Reconnected to {topics:?}");
                    return Ok(());
                }
                Err(e) if e.is_systemic() => {
                    warn!("Reconnect attempt failed: {e}");
                    self.consumer = None;
                    self.last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Poll, dispatch and acknowledge until `shutdown` fires.
    ///
    /// Systemic failures are retried through [`Subscriber::reconnect`]; the
    /// error is returned once its budget is exhausted, or immediately for
    /// non-recoverable errors such as a missing topic. The connection is
    /// released on every exit path.
    pub async fn run<H>(&mut self, handler: &mut H, shutdown: &CancellationToken) -> Result<()>
    where
        H: RecordHandler + ?Sized,
    {
        let result = self.run_inner(handler, shutdown).await;
        self.close();
        result
    }

    async fn run_inner<H>(&mut self, handler: &mut H, shutdown: &CancellationToken) -> Result<()>
    where
        H: RecordHandler + ?Sized,
    {
        if self.consumer.is_none() {
            let topics = self.topics.clone();
            if let Err(e) = self.subscribe(&topics).await {
                if !e.is_systemic() {
                    return Err(e);
                }
                self.last_error = Some(e);
                self.reconnect(shutdown).await?;
            }
        }

        let poll_timeout = self.config.poll_timeout;
        while !shutdown.is_cancelled() && self.state() != SubscriberState::Closed {
            let polled = tokio::select! {
                _ = shutdown.cancelled() => break,
                polled = self.poll(poll_timeout) => polled,
            };

            let batch = match polled {
                Ok(batch) => batch,
                Err(e) if e.is_systemic() => {
                    self.reconnect(shutdown).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            if batch.is_empty() {
                continue;
            }

            for record in &batch.records {
                handler.on_record(record).await;
            }
            for failure in &batch.failures {
                handler.on_failure(failure).await;
            }

            match self.acknowledge(&batch).await {
                Ok(()) => {}
                Err(e) if e.is_systemic() => self.reconnect(shutdown).await?,
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}
