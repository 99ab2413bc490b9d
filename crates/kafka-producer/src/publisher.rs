use avro_codec::Encoder;
use kafka_types::{
    DeliveryFailure, DeliveryOutcome, Error, LogProducer, OutboundMessage, PendingDelivery,
    Record, RecordSchema, Result,
};
use schema_registry::{SchemaRegistry, SubjectNameStrategy};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::PublisherConfig;

/// Receives the outcome of a publish.
///
/// Called exactly once per publish, on a background task. Closures of type
/// `Fn(&DeliveryOutcome)` implement it.
pub trait CompletionHandler: Send + Sync + 'static {
    fn on_complete(&self, outcome: &DeliveryOutcome);
}

impl<F> CompletionHandler for F
where
    F: Fn(&DeliveryOutcome) + Send + Sync + 'static,
{
    fn on_complete(&self, outcome: &DeliveryOutcome) {
        self(outcome)
    }
}

/// Resolves to the same outcome the completion handler received.
///
/// Dropping it does not cancel the publish.
pub struct PendingReceipt {
    rx: oneshot::Receiver<DeliveryOutcome>,
    topic: String,
    key: Option<Vec<u8>>,
}

impl Future for PendingReceipt {
    type Output = DeliveryOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<DeliveryOutcome> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // The completion task went away without reporting (runtime shutdown).
            Poll::Ready(Err(_)) => Poll::Ready(Err(DeliveryFailure {
                topic: self.topic.clone(),
                key: self.key.clone(),
                error: Error::Abandoned,
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Counts of reported outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownReport {
    pub delivered: u64,
    pub failed: u64,
    pub abandoned: u64,
}

impl ShutdownReport {
    pub fn total(&self) -> u64 {
        self.delivered + self.failed + self.abandoned
    }
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ShutdownReport {
        ShutdownReport {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

struct Completion<H> {
    handler: H,
    tx: oneshot::Sender<DeliveryOutcome>,
    counters: Arc<Counters>,
}

impl<H: CompletionHandler> Completion<H> {
    fn complete(self, outcome: DeliveryOutcome) {
        match &outcome {
            Ok(receipt) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Delivered to {}/{} at offset {}",
                    receipt.topic, receipt.partition, receipt.offset
                );
            }
            Err(failure) if failure.error == Error::Abandoned => {
                self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.handler.on_complete(&outcome);
        // Nobody may be waiting on the receipt.
        let _ = self.tx.send(outcome);
    }
}

/// Publishes records of one schema to one topic.
///
/// `publish` returns once the encoded record has been handed to the
/// transport's send buffer. Delivery is reported later through the
/// completion handler and the returned [`PendingReceipt`]. Every failure
/// (a record not matching the schema, an unreachable registry, a full send
/// buffer, a broker rejection) is reported the same way, and none of them
/// stops the publisher.
pub struct Publisher<P, R> {
    transport: P,
    encoder: Encoder<R>,
    schema: RecordSchema,
    config: PublisherConfig,
    tracker: TaskTracker,
    cancel: CancellationToken,
    counters: Arc<Counters>,
}

impl<P: LogProducer, R: SchemaRegistry> Publisher<P, R> {
    /// Publisher registering its schema under `<topic>-value`.
    pub fn new(transport: P, registry: R, schema: RecordSchema, config: PublisherConfig) -> Self {
        let encoder = Encoder::new(
            registry,
            SubjectNameStrategy::TopicName(config.topic.clone()),
        );
        Self::with_encoder(transport, encoder, schema, config)
    }

    pub fn with_encoder(
        transport: P,
        encoder: Encoder<R>,
        schema: RecordSchema,
        config: PublisherConfig,
    ) -> Self {
        Self {
            transport,
            encoder,
            schema,
            config,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn transport(&self) -> &P {
        &self.transport
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    /// Publishes whose outcome has not been reported yet.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Outcomes reported so far.
    pub fn report(&self) -> ShutdownReport {
        self.counters.snapshot()
    }

    /// Encode `record` and hand it to the transport.
    ///
    /// Waits at most `queue_timeout` for space in the send buffer. Publishes
    /// with the same key land in the log in call order.
    pub async fn publish<H>(&self, key: Option<&str>, record: &Record, on_complete: H) -> PendingReceipt
    where
        H: CompletionHandler,
    {
        let key = key.map(|k| k.as_bytes().to_vec());
        let (tx, rx) = oneshot::channel();
        let receipt = PendingReceipt {
            rx,
            topic: self.config.topic.clone(),
            key: key.clone(),
        };
        let completion = Completion {
            handler: on_complete,
            tx,
            counters: self.counters.clone(),
        };

        let topic = self.config.topic.clone();
        match self.hand_off(key.clone(), record).await {
            Ok(delivery) => {
                let cancel = self.cancel.clone();
                self.tracker.spawn(async move {
                    let outcome = tokio::select! {
                        result = delivery => result.map_err(|error| DeliveryFailure { topic, key, error }),
                        _ = cancel.cancelled() => Err(DeliveryFailure { topic, key, error: Error::Abandoned }),
                    };
                    completion.complete(outcome);
                });
            }
            Err(error) => {
                debug!("Publish to '{topic}' failed before hand-off: {error}");
                let failure = DeliveryFailure { topic, key, error };
                self.tracker.spawn(async move { completion.complete(Err(failure)) });
            }
        }

        receipt
    }

    async fn hand_off(&self, key: Option<Vec<u8>>, record: &Record) -> Result<PendingDelivery> {
        let encoded = self.encoder.encode(record, &self.schema).await?;
        let message = OutboundMessage {
            topic: self.config.topic.clone(),
            key,
            payload: encoded.bytes,
        };
        self.transport
            .enqueue(message, self.config.queue_timeout)
            .await
    }

    /// Stop publishing and report every outstanding publish.
    ///
    /// Flushes the transport and waits for outstanding completions, both
    /// bounded by `grace`. Publishes still pending after that are reported
    /// as `Abandoned`. The transport is dropped only once every completion
    /// handler has run.
    pub async fn shutdown(self, grace: Duration) -> ShutdownReport {
        let deadline = tokio::time::Instant::now() + grace;
        info!(
            "Shutting down publisher for topic '{}' with {} publishes in flight",
            self.config.topic,
            self.tracker.len()
        );

        if let Err(e) = self.transport.flush(grace).await {
            warn!("Flush did not complete within {grace:?}: {e}");
        }

        self.tracker.close();
        if tokio::time::timeout_at(deadline, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                "Abandoning {} publishes still pending after {grace:?}",
                self.tracker.len()
            );
            self.cancel.cancel();
            self.tracker.wait().await;
        }

        let report = self.counters.snapshot();
        drop(self.transport);
        info!(
            "Publisher for topic '{}' stopped: {} delivered, {} failed, {} abandoned",
            self.config.topic, report.delivered, report.failed, report.abandoned
        );
        report
    }
}
