//! Runs against a real broker. Start one and set `KAFKA_BROKER`, then:
//!
//! ```sh
//! KAFKA_BROKER=localhost:9092 cargo test -p avro-pipeline-kafka-producer -- --ignored
//! ```

use avro_pipeline_kafka_producer::{
    create_topic_if_not_exists, KafkaLogProducer, KafkaProducerConfig,
};
use kafka_types::{LogProducer, OutboundMessage, SecuritySettings};
use std::time::Duration;

fn broker() -> String {
    std::env::var("KAFKA_BROKER").unwrap_or_else(|_| "localhost:9092".to_string())
}

#[tokio::test]
#[ignore]
async fn test_create_topic_twice() {
    let topic = format!("avro-pipeline-admin-{}", std::process::id());
    let security = SecuritySettings::default();
    create_topic_if_not_exists(&broker(), &security, &topic, 3, 1)
        .await
        .unwrap();
    create_topic_if_not_exists(&broker(), &security, &topic, 3, 1)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore]
async fn test_enqueue_and_deliver() {
    let topic = format!("avro-pipeline-producer-{}", std::process::id());
    create_topic_if_not_exists(&broker(), &SecuritySettings::default(), &topic, 1, 1)
        .await
        .unwrap();

    let producer = KafkaLogProducer::new(&KafkaProducerConfig {
        brokers: broker(),
        ..Default::default()
    })
    .unwrap();

    let mut offsets = Vec::new();
    for i in 0..3u8 {
        let delivery = producer
            .enqueue(
                OutboundMessage {
                    topic: topic.clone(),
                    key: Some(b"same-key".to_vec()),
                    payload: vec![0, 0, 0, 0, 1, i],
                },
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        offsets.push(delivery.await.unwrap().offset);
    }
    assert!(offsets.windows(2).all(|w| w[0] < w[1]));
    producer.flush(Duration::from_secs(5)).await.unwrap();
}
