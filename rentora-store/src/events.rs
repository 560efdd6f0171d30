//! Kafka transport for outbound notifications.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rentora_core::notifier::{NotifyError, Notifier};
use rentora_shared::RentalEvent;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    topic, key, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    recipient: &'a str,
    event: &'a RentalEvent,
}

/// Publishes every notification to one topic, keyed by reservation so a
/// reservation's events stay ordered within a partition.
pub struct KafkaNotifier {
    producer: EventProducer,
    topic: String,
}

impl KafkaNotifier {
    pub fn new(producer: EventProducer, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl Notifier for KafkaNotifier {
    async fn send(&self, event: &RentalEvent, recipient: &str) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(&Envelope { recipient, event })
            .map_err(|e| NotifyError::Encoding(e.to_string()))?;
        self.producer
            .publish(&self.topic, &event.reservation_id().to_string(), &payload)
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))
    }
}
