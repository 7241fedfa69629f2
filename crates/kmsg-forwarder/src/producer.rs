// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Kafka producer for kernel events.
//!
//! The client is configured for ordered delivery onto one partition:
//! - one in-flight request per broker connection, so batches land in production order
//! - leader-only acknowledgement
//! - zstd compression
//! - batches closed by the latency target; size and count limits are set out of reach
//! - no client-side retries
//!
//! Delivery reports are forwarded onto two channels, acknowledgements and failures, which
//! the pipeline drains on dedicated tasks.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer};
use rdkafka::ClientContext;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::RunConfig;
use crate::error::ForwarderError;
use crate::partitioner::PartitionAssignment;

/// Largest message the broker accepts by default.
pub const MAX_MESSAGE_BYTES: usize = 1_000_000;
// count limit per batch, high enough that the latency target closes batches
const MAX_BATCH_MESSAGES: usize = 1_000_000;
const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
// wait before offering a message again when the local producer queue is full
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(10);

/// A serialized event bound for the fixed partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub partition: PartitionAssignment,
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

/// Broker acknowledgement of a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryAck {
    pub partition: i32,
    pub offset: i64,
}

/// A message the broker or client failed to deliver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("partition {partition}: {reason}")]
pub struct DeliveryFailure {
    pub partition: i32,
    pub reason: String,
}

/// Receiving ends of the producer's delivery report channels.
#[derive(Debug)]
pub struct DeliveryReports {
    pub successes: mpsc::UnboundedReceiver<DeliveryAck>,
    pub errors: mpsc::UnboundedReceiver<DeliveryFailure>,
}

/// Sending ends matching [`DeliveryReports`].
#[derive(Debug, Clone)]
pub struct DeliveryReporter {
    successes: mpsc::UnboundedSender<DeliveryAck>,
    errors: mpsc::UnboundedSender<DeliveryFailure>,
}

impl DeliveryReporter {
    #[must_use]
    pub fn channel() -> (Self, DeliveryReports) {
        let (successes_tx, successes_rx) = mpsc::unbounded_channel();
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        (
            DeliveryReporter {
                successes: successes_tx,
                errors: errors_tx,
            },
            DeliveryReports {
                successes: successes_rx,
                errors: errors_rx,
            },
        )
    }

    pub fn acknowledge(&self, ack: DeliveryAck) {
        // receiver gone means the pipeline is already shutting down
        let _ = self.successes.send(ack);
    }

    pub fn fail(&self, failure: DeliveryFailure) {
        let _ = self.errors.send(failure);
    }
}

impl ClientContext for DeliveryReporter {}

impl ProducerContext for DeliveryReporter {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _: Self::DeliveryOpaque) {
        match result {
            Ok(message) => self.acknowledge(DeliveryAck {
                partition: message.partition(),
                offset: message.offset(),
            }),
            Err((error, message)) => self.fail(DeliveryFailure {
                partition: message.partition(),
                reason: error.to_string(),
            }),
        }
    }
}

/// Asynchronous hand-off to the log service.
#[async_trait]
pub trait EventSink {
    /// Enqueues a message in the client's batching buffer. Returns once the message is
    /// accepted locally; delivery is reported on [`DeliveryReports`].
    async fn send(&self, message: OutboundMessage) -> Result<(), ForwarderError>;
}

/// [`EventSink`] backed by a librdkafka producer.
///
/// Dropping the sink discards whatever is still queued; every shutdown is a fatal abort.
pub struct KafkaSink {
    producer: ThreadedProducer<DeliveryReporter>,
}

impl KafkaSink {
    /// Creates the producer and validates the topic against the cluster metadata.
    ///
    /// Returns the sink, its delivery report channels and the topic's partition count.
    /// Blocks while the metadata request is outstanding.
    pub fn connect(config: &RunConfig) -> Result<(Self, DeliveryReports, i32), ForwarderError> {
        let (reporter, reports) = DeliveryReporter::channel();
        let producer: ThreadedProducer<DeliveryReporter> = client_config(config)
            .create_with_context(reporter)
            .map_err(|e| ForwarderError::Config(format!("failed to create producer: {e}")))?;

        let partition_count = fetch_partition_count(&producer, &config.topic)?;
        info!(
            "Connected to {} as {}, topic {} has {} partitions",
            config.brokers.join(","),
            config.client_id,
            config.topic,
            partition_count
        );

        Ok((KafkaSink { producer }, reports, partition_count))
    }
}

#[async_trait]
impl EventSink for KafkaSink {
    async fn send(&self, message: OutboundMessage) -> Result<(), ForwarderError> {
        loop {
            let record = BaseRecord::<(), str>::to(&message.topic)
                .partition(message.partition.get())
                .payload(message.payload.as_str())
                .timestamp(message.timestamp.timestamp_millis());

            match self.producer.send(record) {
                Ok(()) => return Ok(()),
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), _)) => {
                    debug!("Producer queue full, waiting for the current batch");
                }
                Err((error, _)) => {
                    return Err(ForwarderError::Delivery(DeliveryFailure {
                        partition: message.partition.get(),
                        reason: error.to_string(),
                    }))
                }
            }
            tokio::time::sleep(QUEUE_FULL_BACKOFF).await;
        }
    }
}

/// librdkafka settings for ordered, latency driven batching onto a fixed partition.
#[must_use]
pub fn client_config(config: &RunConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", config.brokers.join(","))
        .set("client.id", &config.client_id)
        .set("max.in.flight.requests.per.connection", "1")
        .set("acks", "1")
        .set("compression.type", "zstd")
        .set(
            "linger.ms",
            format!("{}", config.latency_target.as_micros() as f64 / 1000.0),
        )
        .set("batch.size", MAX_MESSAGE_BYTES.to_string())
        .set("batch.num.messages", MAX_BATCH_MESSAGES.to_string())
        .set("message.max.bytes", MAX_MESSAGE_BYTES.to_string())
        .set("message.send.max.retries", "0")
        .set("enable.idempotence", "false")
        .set("topic.metadata.refresh.sparse", "true");
    client_config
}

fn fetch_partition_count(
    producer: &ThreadedProducer<DeliveryReporter>,
    topic: &str,
) -> Result<i32, ForwarderError> {
    let metadata = producer
        .client()
        .fetch_metadata(Some(topic), METADATA_TIMEOUT)
        .map_err(|e| ForwarderError::Config(format!("failed to fetch metadata: {e}")))?;

    let Some(topic_metadata) = metadata.topics().iter().find(|t| t.name() == topic) else {
        return Err(ForwarderError::Config(format!(
            "topic {topic} not found in cluster metadata"
        )));
    };
    if let Some(error) = topic_metadata.error() {
        return Err(ForwarderError::Config(format!(
            "topic {topic} metadata error: {:?}",
            RDKafkaErrorCode::from(error)
        )));
    }

    i32::try_from(topic_metadata.partitions().len())
        .ok()
        .filter(|&count| count > 0)
        .ok_or_else(|| ForwarderError::Config(format!("topic {topic} has no partitions")))
}
