// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Kernel log delivery pipeline.
//!
//! ```text
//!   /dev/kmsg
//!       │  read + decode            (reader thread, blocking)
//!       v
//!   ┌─────────────┐
//!   │ Event queue │ (mpsc, bounded to 100)
//!   └──────┬──────┘
//!          │  serialize + send      (forward task)
//!          v
//!   ┌─────────────┐
//!   │  EventSink  │ (batching, one in-flight request)
//!   └──────┬──────┘
//!          │
//!          ├──> acknowledgements   (drained and discarded)
//!          └──> failures           (first one aborts the pipeline)
//! ```
//!
//! The queue is the only back-pressure point: when it is full the reader stops pulling
//! records from the device. There is no retry and no draining on failure. The first error
//! from any stage moves the pipeline to [`PipelineState::Aborted`] and is returned to the
//! caller, which is expected to exit the process.

use std::convert::Infallible;
use std::io::Write;

use kmsg::device::RecordSource;
use kmsg::{decode, ParsedEvent};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace};

use crate::config::RunConfig;
use crate::error::ForwarderError;
use crate::partitioner::PartitionAssignment;
use crate::producer::{DeliveryReports, EventSink, OutboundMessage};
use crate::serializer::EventSerializer;

/// Capacity of the queue between the reader and the forward task.
pub const QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    /// Terminal.
    Aborted,
}

pub struct DeliveryPipeline<S> {
    topic: String,
    partition: PartitionAssignment,
    serializer: EventSerializer,
    echo: bool,
    sink: S,
    reports: Option<DeliveryReports>,
    state: PipelineState,
}

impl<S> DeliveryPipeline<S>
where
    S: EventSink + Send + Sync,
{
    #[must_use]
    pub fn new(
        config: &RunConfig,
        partition: PartitionAssignment,
        sink: S,
        reports: DeliveryReports,
    ) -> Self {
        DeliveryPipeline {
            topic: config.topic.clone(),
            partition,
            serializer: EventSerializer::new(&config.labels),
            echo: config.stdout,
            sink,
            reports: Some(reports),
            state: PipelineState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Runs the pipeline until the first fatal error. It never stops without one.
    pub async fn run<R>(&mut self, source: R) -> Result<Infallible, ForwarderError>
    where
        R: RecordSource + Send + 'static,
    {
        let error = self.supervise(source).await;
        self.state = PipelineState::Aborted;
        error!("Pipeline aborted in {} stage: {}", error.stage(), error);
        Err(error)
    }

    async fn supervise<R>(&mut self, source: R) -> ForwarderError
    where
        R: RecordSource + Send + 'static,
    {
        let Some(DeliveryReports {
            mut successes,
            mut errors,
        }) = self.reports.take()
        else {
            return ForwarderError::Aborted("pipeline can only run once");
        };
        self.state = PipelineState::Running;

        let (queue_tx, queue_rx) = mpsc::channel::<ParsedEvent>(QUEUE_CAPACITY);
        let reader_done = match spawn_reader(source, queue_tx) {
            Ok(done) => done,
            Err(e) => return e,
        };

        let acks = tokio::spawn(async move {
            let mut delivered: u64 = 0;
            while let Some(ack) = successes.recv().await {
                delivered += 1;
                trace!(
                    "Delivered message {} at offset {} on partition {}",
                    delivered,
                    ack.offset,
                    ack.partition
                );
            }
        });
        let failures = tokio::spawn(async move {
            match errors.recv().await {
                Some(failure) => ForwarderError::Delivery(failure),
                None => ForwarderError::Aborted("delivery report channel closed"),
            }
        });

        info!(
            "Forwarding kernel log to topic {} partition {}",
            self.topic, self.partition
        );

        let error = tokio::select! {
            reader = reader_done => {
                reader.unwrap_or(ForwarderError::Aborted("reader thread exited"))
            }
            forward = self.forward(queue_rx) => forward,
            failure = failures => {
                failure.unwrap_or(ForwarderError::Aborted("delivery failure task panicked"))
            }
        };

        acks.abort();
        error
    }

    async fn forward(&self, mut queue: mpsc::Receiver<ParsedEvent>) -> ForwarderError {
        while let Some(event) = queue.recv().await {
            let payload = self.serializer.serialize(&event);
            if self.echo {
                echo(&event, &payload);
            }

            let message = OutboundMessage {
                topic: self.topic.clone(),
                partition: self.partition,
                payload,
                timestamp: event.read_timestamp,
            };
            if let Err(e) = self.sink.send(message).await {
                return e;
            }
        }
        ForwarderError::Aborted("event queue closed")
    }
}

/// Starts the blocking reader on its own thread. The returned channel yields the error
/// that stopped it.
fn spawn_reader<R>(
    mut source: R,
    queue: mpsc::Sender<ParsedEvent>,
) -> Result<oneshot::Receiver<ForwarderError>, ForwarderError>
where
    R: RecordSource + Send + 'static,
{
    let (done_tx, done_rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("kmsg-reader".to_string())
        .spawn(move || {
            let error = match read_loop(&mut source, &queue) {
                Ok(never) => match never {},
                Err(e) => e,
            };
            debug!("Reader stopped: {}", error);
            let _ = done_tx.send(error);
        })
        .map_err(|e| {
            error!("Failed to spawn reader thread: {}", e);
            ForwarderError::Aborted("failed to spawn reader thread")
        })?;
    Ok(done_rx)
}

fn read_loop<R: RecordSource>(
    source: &mut R,
    queue: &mpsc::Sender<ParsedEvent>,
) -> Result<Infallible, ForwarderError> {
    loop {
        let raw = source.read_record()?;
        let event = decode(&raw)?;
        // blocks while the queue is full
        queue
            .blocking_send(event)
            .map_err(|_| ForwarderError::Aborted("event queue closed"))?;
    }
}

fn echo(event: &ParsedEvent, payload: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "klog: {event:?}\n      {payload}");
}
