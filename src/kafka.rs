//! Kafka span transport.
//!
//! Publishes each encoded batch as one record to a named topic. The
//! configuration's `overrides` map is passed through to the broker client
//! verbatim, so any client tunable can be set without this crate naming it.

use crate::config::{ConfigError, KafkaConfig};
use crate::sender::{SendError, Sender};
use crate::span::SpanBatch;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const FLUSH_ON_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishes batches to a Kafka topic.
///
/// Construction never touches the network; broker reachability surfaces
/// through `check()` and `send()`.
pub struct KafkaSender {
    producer: FutureProducer,
    topic: String,
    closed: AtomicBool,
}

impl KafkaSender {
    pub fn new(config: &KafkaConfig) -> Result<Self, ConfigError> {
        if config.bootstrap_servers.trim().is_empty() {
            return Err(ConfigError::MissingBootstrapServers);
        }

        let mut client_config = ClientConfig::new();
        client_config.set("bootstrap.servers", &config.bootstrap_servers);
        for (key, value) in &config.overrides {
            client_config.set(key, value);
        }

        let producer: FutureProducer = client_config
            .create()
            .map_err(|e| ConfigError::Broker(e.to_string()))?;

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Sender for KafkaSender {
    async fn send(&self, batch: SpanBatch) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }

        let payload = batch.encode().map_err(|e| SendError::Encode(e.to_string()))?;
        let record = FutureRecord::<(), Vec<u8>>::to(&self.topic).payload(&payload);

        match self.producer.send(record, Timeout::After(SEND_TIMEOUT)).await {
            Ok(_) => Ok(()),
            Err((e, _unsent)) => Err(SendError::Transport(e.to_string())),
        }
    }

    async fn check(&self) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }

        // Metadata fetch on the librdkafka client is blocking.
        let producer = self.producer.clone();
        let topic = self.topic.clone();
        tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(Some(&topic), Timeout::After(CHECK_TIMEOUT))
                .map(|_| ())
        })
        .await
        .map_err(|e| SendError::Transport(e.to_string()))?
        .map_err(|e| SendError::Transport(e.to_string()))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let producer = self.producer.clone();
        let _ = tokio::task::spawn_blocking(move || {
            producer.flush(Timeout::After(FLUSH_ON_CLOSE_TIMEOUT))
        })
        .await;
    }

    fn name(&self) -> &str {
        "kafka"
    }
}
