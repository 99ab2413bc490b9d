use avro_pipeline::{user, UserLogger};
use avro_pipeline_kafka_source::{RecordHandler, NULL_RECORD_VALUE};
use kafka_types::{DeliveryOutcome, Error, FieldValue};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::{Collect, Harness, TOPIC};

#[tokio::test]
async fn test_alice_received_exactly_once() {
    let harness = Harness::new(3);
    let alice = user(7, "Alice", 30);

    let publisher = harness.publisher(16);
    let receipt = publisher
        .publish(Some("7"), &alice, |_: &DeliveryOutcome| {})
        .await
        .await
        .unwrap();
    assert_eq!(receipt.topic, TOPIC);
    assert_eq!(receipt.offset, 0);
    let report = publisher.shutdown(std::time::Duration::from_secs(1)).await;
    assert_eq!(report.delivered, 1);

    let shutdown = CancellationToken::new();
    let mut collect = Collect::new(1, &shutdown);
    harness
        .subscriber()
        .run(&mut collect, &shutdown)
        .await
        .unwrap();

    assert_eq!(collect.records.len(), 1);
    let received = &collect.records[0];
    assert_eq!(received.record, alice);
    assert_eq!(received.partition, receipt.partition);
    assert_eq!(received.offset, receipt.offset);
    assert_eq!(received.key_str(), Some("7"));

    // Committed: the group does not see Alice again.
    let mut again = harness.subscriber();
    again.subscribe(&[TOPIC.to_string()]).await.unwrap();
    let batch = again
        .poll(std::time::Duration::from_millis(20))
        .await
        .unwrap();
    assert!(batch.is_empty());
}

#[tokio::test]
async fn test_per_key_order_preserved() {
    let harness = Harness::new(4);
    let publisher = harness.publisher(64);
    let keys = ["a", "b", "c"];
    for i in 0..30 {
        let key = keys[i as usize % keys.len()];
        publisher
            .publish(Some(key), &user(i, key, 20), |_: &DeliveryOutcome| {})
            .await;
    }
    assert_eq!(publisher.shutdown(std::time::Duration::from_secs(1)).await.delivered, 30);

    let shutdown = CancellationToken::new();
    let mut collect = Collect::new(30, &shutdown);
    harness
        .subscriber()
        .run(&mut collect, &shutdown)
        .await
        .unwrap();

    for key in keys {
        let records: Vec<_> = collect
            .records
            .iter()
            .filter(|r| r.key_str() == Some(key))
            .collect();
        let ids: Vec<i32> = records
            .iter()
            .filter_map(|r| r.record.get("id").and_then(FieldValue::as_i32))
            .collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids.len(), 10);
        assert_eq!(ids, sorted, "records of key {key} out of order");

        // One key, one partition, increasing offsets.
        assert!(records.windows(2).all(|w| w[0].partition == w[1].partition));
        assert!(records.windows(2).all(|w| w[0].offset < w[1].offset));
    }
}

#[tokio::test]
async fn test_mismatched_record_never_reaches_consumer() {
    let harness = Harness::new(1);
    let outcomes: Arc<Mutex<Vec<DeliveryOutcome>>> = Arc::default();
    let sink = outcomes.clone();
    let on_complete = move |outcome: &DeliveryOutcome| {
        sink.lock().unwrap().push(outcome.clone());
    };

    let publisher = harness.publisher(16);
    let bad = user(1, "Bob", 40).with("email", "bob@example.com");
    publisher.publish(Some("1"), &bad, on_complete.clone()).await;
    publisher
        .publish(Some("2"), &user(2, "Carol", 50), on_complete)
        .await;
    publisher.shutdown(std::time::Duration::from_secs(1)).await;

    let outcomes = outcomes.lock().unwrap().clone();
    assert_eq!(outcomes.len(), 2);
    let failure = outcomes
        .iter()
        .find_map(|o| o.as_ref().err())
        .expect("one publish fails");
    assert!(matches!(failure.error, Error::SchemaMismatch(_)));
    assert_eq!(harness.log.message_count(TOPIC), 1);

    let shutdown = CancellationToken::new();
    let mut collect = Collect::new(1, &shutdown);
    harness
        .subscriber()
        .run(&mut collect, &shutdown)
        .await
        .unwrap();
    assert_eq!(collect.records[0].record, user(2, "Carol", 50));
    assert!(collect.failures.is_empty());
}

#[tokio::test]
async fn test_logger_skips_null_and_garbage() {
    let harness = Harness::new(1);
    let publisher = harness.publisher(16);
    publisher
        .publish(None, &user(1, "Dave", 33), |_: &DeliveryOutcome| {})
        .await;
    publisher.shutdown(std::time::Duration::from_secs(1)).await;
    harness.log.append_raw(TOPIC, 0, None, None).unwrap();
    harness
        .log
        .append_raw(TOPIC, 0, None, Some(vec![0, 0, 0, 0, 99, 1]))
        .unwrap();

    let mut subscriber = harness.subscriber();
    subscriber.subscribe(&[TOPIC.to_string()]).await.unwrap();
    let batch = subscriber
        .poll(std::time::Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(batch.records.len(), 1);
    assert_eq!(batch.failures.len(), 2);
    assert_eq!(
        batch.failures[0].error,
        Error::MalformedPayload(NULL_RECORD_VALUE.to_string())
    );
    assert!(matches!(batch.failures[1].error, Error::UnknownSchema(_)));

    let mut logger = UserLogger::new();
    for record in &batch.records {
        logger.on_record(record).await;
    }
    for failure in &batch.failures {
        logger.on_failure(failure).await;
    }
    assert_eq!((logger.received(), logger.skipped()), (1, 2));

    subscriber.acknowledge(&batch).await.unwrap();
    assert_eq!(harness.log.committed(crate::GROUP, TOPIC, 0), Some(3));
}
