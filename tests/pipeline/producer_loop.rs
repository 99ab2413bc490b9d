use avro_pipeline::{drive_producer, user, RandomUserGenerator, RecordGenerator, Schedule};
use kafka_types::{DeliveryOutcome, Record};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{Collect, Harness, TOPIC};

fn schedule(count: Option<u64>) -> Schedule {
    Schedule {
        interval: Duration::from_millis(100),
        count,
        shutdown_grace: Duration::from_secs(1),
    }
}

fn receipts() -> (
    Arc<Mutex<Vec<DeliveryOutcome>>>,
    impl Fn(&DeliveryOutcome) + Clone + Send + Sync + 'static,
) {
    let outcomes: Arc<Mutex<Vec<DeliveryOutcome>>> = Arc::default();
    let sink = outcomes.clone();
    (outcomes, move |outcome: &DeliveryOutcome| {
        sink.lock().unwrap().push(outcome.clone())
    })
}

#[tokio::test(start_paused = true)]
async fn test_count_limit() {
    let harness = Harness::new(2);
    let (outcomes, on_complete) = receipts();
    let mut generator = RandomUserGenerator::new(1);

    let report = drive_producer(
        harness.publisher(16),
        &mut generator,
        on_complete,
        schedule(Some(5)),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(report.delivered, 5);
    assert_eq!(outcomes.lock().unwrap().len(), 5);
    assert_eq!(harness.log.message_count(TOPIC), 5);
}

#[tokio::test(start_paused = true)]
async fn test_stops_on_shutdown() {
    let harness = Harness::new(1);
    let (_, on_complete) = receipts();
    let mut generator = RandomUserGenerator::new(2);
    let shutdown = CancellationToken::new();

    let canceller = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(350)).await;
        canceller.cancel();
    });

    // Ticks at 0, 100, 200 and 300 ms.
    let report = drive_producer(
        harness.publisher(16),
        &mut generator,
        on_complete,
        schedule(None),
        &shutdown,
    )
    .await;
    assert_eq!(report.total(), 4);
    assert_eq!(report.delivered, 4);
}

#[tokio::test(start_paused = true)]
async fn test_generator_exhaustion_ends_loop() {
    let harness = Harness::new(1);
    let (outcomes, on_complete) = receipts();
    let records: Vec<(Option<String>, Record)> = vec![
        (Some("7".into()), user(7, "Alice", 30)),
        (Some("8".into()), user(8, "Bob", 31)),
        (None, user(9, "Grace", 32)),
    ];
    let mut generator = records.into_iter();

    let report = drive_producer(
        harness.publisher(16),
        &mut generator,
        on_complete,
        schedule(None),
        &CancellationToken::new(),
    )
    .await;
    assert_eq!(report.delivered, 3);

    let offsets: Vec<i64> = outcomes
        .lock()
        .unwrap()
        .iter()
        .map(|o| o.as_ref().unwrap().offset)
        .collect();
    assert_eq!(offsets, vec![0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_produced_records_consumed() {
    let harness = Harness::new(3);
    let (_, on_complete) = receipts();
    let mut generator = RandomUserGenerator::new(3);
    let mut expected = RandomUserGenerator::new(3);

    drive_producer(
        harness.publisher(16),
        &mut generator,
        on_complete,
        schedule(Some(12)),
        &CancellationToken::new(),
    )
    .await;

    let shutdown = CancellationToken::new();
    let mut collect = Collect::new(12, &shutdown);
    harness
        .subscriber()
        .run(&mut collect, &shutdown)
        .await
        .unwrap();

    // Same seed, same records; only the cross-partition order differs.
    let mut sent: Vec<Record> = (0..12)
        .filter_map(|_| expected.next_record().map(|(_, record)| record))
        .collect();
    let mut received: Vec<Record> = collect.records.into_iter().map(|r| r.record).collect();
    sent.sort_by_key(|r| format!("{r:?}"));
    received.sort_by_key(|r| format!("{r:?}"));
    assert_eq!(sent, received);
}
