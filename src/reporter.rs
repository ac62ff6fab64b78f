//! Batching reporter.
//!
//! [`BatchingReporter`] accumulates spans from any number of producer
//! threads into size/time-bounded batches and hands sealed batches to a
//! [`SenderBoxed`] on a dedicated flush-driver task. `report()` never blocks
//! on I/O: it appends to the open batch under a short-held mutex and at most
//! nudges the driver.
//!
//! # Buffering model
//!
//! One open batch being filled, a bounded queue of sealed batches awaiting
//! delivery, and at most one in-flight send. Sends are sequential to
//! preserve backend ordering. When a seal fires while the queue is full, a
//! whole batch is dropped according to [`OverflowPolicy`] and counted;
//! partial drops never happen, so every delivered message is a valid
//! encoding.
//!
//! Every span that enters the pipeline ends in exactly one of three states:
//! delivered, dropped (counted via the metrics sink), or still buffered.

use crate::metrics::MetricsSink;
use crate::sender::SenderBoxed;
use crate::span::{Span, SpanBatch};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Which batch to drop when a seal fires while the sealed queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop the batch that was just sealed, keeping older spans flowing.
    DropNewest,
    /// Drop the oldest queued batch to make room for the new one.
    DropOldest,
}

/// Tuning knobs for the reporter.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Maximum encoded message size; reaching it seals the open batch.
    pub max_message_bytes: usize,
    /// Optional span-count trigger.
    pub max_batch_spans: Option<usize>,
    /// Maximum age of the open batch before the driver seals it.
    pub report_timeout: Duration,
    /// Capacity of the sealed-batch queue (excludes the open batch and the
    /// in-flight send).
    pub queued_max_batches: usize,
    /// Re-attempts per batch after a failed send before it is dropped.
    pub max_send_retries: u32,
    pub overflow_policy: OverflowPolicy,
    /// Grace period `close()` waits for the final flush.
    pub close_timeout: Duration,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 512 * 1024,
            max_batch_spans: None,
            report_timeout: Duration::from_secs(1),
            queued_max_batches: 1,
            max_send_retries: 1,
            overflow_policy: OverflowPolicy::DropNewest,
            close_timeout: Duration::from_secs(1),
        }
    }
}

/// Batches dropped inside the lock, tallied after it is released.
#[derive(Debug, Default, Clone, Copy)]
struct Dropped {
    spans: usize,
    messages: usize,
}

impl Dropped {
    fn from_batch(batch: &SpanBatch) -> Self {
        Self {
            spans: batch.len(),
            messages: 1,
        }
    }

    fn merge(&mut self, other: Self) {
        self.spans += other.spans;
        self.messages += other.messages;
    }

    fn is_empty(&self) -> bool {
        self.spans == 0 && self.messages == 0
    }
}

struct Buffers {
    open: SpanBatch,
    sealed: VecDeque<SpanBatch>,
    in_flight_spans: usize,
}

impl Buffers {
    fn new() -> Self {
        Self {
            open: SpanBatch::new(),
            sealed: VecDeque::new(),
            in_flight_spans: 0,
        }
    }

    fn queued_spans(&self) -> usize {
        self.open.len() + self.sealed.iter().map(SpanBatch::len).sum::<usize>()
    }

    fn queued_bytes(&self) -> usize {
        self.open.span_bytes() + self.sealed.iter().map(SpanBatch::span_bytes).sum::<usize>()
    }
}

struct Shared {
    buffers: Mutex<Buffers>,
    flush_notify: Notify,
    metrics: Arc<dyn MetricsSink>,
    config: ReporterConfig,
    closed: AtomicBool,
}

impl Shared {
    /// Moves the open batch into the sealed queue, applying the overflow
    /// policy. Caller holds the lock; dropped tallies are emitted later.
    fn seal_locked(&self, buffers: &mut Buffers, bypass_capacity: bool) -> Dropped {
        let batch = std::mem::take(&mut buffers.open);
        if batch.is_empty() {
            return Dropped::default();
        }

        if !bypass_capacity && buffers.sealed.len() >= self.config.queued_max_batches {
            match self.config.overflow_policy {
                OverflowPolicy::DropNewest => return Dropped::from_batch(&batch),
                OverflowPolicy::DropOldest => {
                    let dropped = buffers
                        .sealed
                        .pop_front()
                        .map(|old| Dropped::from_batch(&old))
                        .unwrap_or_default();
                    buffers.sealed.push_back(batch);
                    return dropped;
                }
            }
        }

        buffers.sealed.push_back(batch);
        Dropped::default()
    }

    fn emit_dropped(&self, dropped: Dropped) {
        if dropped.is_empty() {
            return;
        }
        self.metrics.increment_spans_dropped(dropped.spans as u64);
        for _ in 0..dropped.messages {
            self.metrics.increment_messages_dropped();
        }
    }

    fn publish_gauges(&self) {
        let (spans, bytes) = {
            let buffers = self.buffers.lock().unwrap();
            (buffers.queued_spans(), buffers.queued_bytes())
        };
        self.metrics.update_queued_spans(spans as u64);
        self.metrics.update_queued_bytes(bytes as u64);
    }

    fn report(&self, span: Span) {
        if self.closed.load(Ordering::Acquire) {
            self.metrics.increment_spans_dropped(1);
            return;
        }

        let Some(size) = span.encoded_size() else {
            tracing::warn!("dropping span that failed to encode");
            self.metrics.increment_spans_dropped(1);
            return;
        };

        self.metrics.increment_spans(1);
        self.metrics.record_span_bytes(size as u64);

        // A span that alone exceeds the message limit can never be sent.
        if 2 + size > self.config.max_message_bytes {
            tracing::warn!(
                size,
                limit = self.config.max_message_bytes,
                "dropping span larger than the maximum message size"
            );
            self.metrics.increment_spans_dropped(1);
            return;
        }

        let mut dropped = Dropped::default();
        let mut sealed_any = false;
        let starts_batch;
        {
            let mut buffers = self.buffers.lock().unwrap();

            if !buffers.open.is_empty()
                && buffers.open.message_size_with(size) > self.config.max_message_bytes
            {
                dropped.merge(self.seal_locked(&mut buffers, false));
                sealed_any = true;
            }

            starts_batch = buffers.open.is_empty();
            buffers.open.add(span, size);

            let count_trigger = self
                .config
                .max_batch_spans
                .map_or(false, |max| buffers.open.len() >= max);
            if count_trigger || buffers.open.message_size() >= self.config.max_message_bytes {
                dropped.merge(self.seal_locked(&mut buffers, false));
                sealed_any = true;
            }
        }

        self.emit_dropped(dropped);
        self.publish_gauges();
        // Wake the driver to send sealed batches, or to pick up the age
        // deadline of a batch that just opened.
        if sealed_any || starts_batch {
            self.flush_notify.notify_one();
        }
    }

    /// Driver-side age trigger.
    fn seal_if_aged(&self) {
        let mut dropped = Dropped::default();
        {
            let mut buffers = self.buffers.lock().unwrap();
            if !buffers.open.is_empty() && buffers.open.age() >= self.config.report_timeout {
                dropped = self.seal_locked(&mut buffers, false);
            }
        }
        self.emit_dropped(dropped);
        self.publish_gauges();
    }

    /// Final seal during shutdown. Capacity is bypassed so the close-time
    /// flush covers everything still buffered.
    fn seal_for_close(&self) {
        {
            let mut buffers = self.buffers.lock().unwrap();
            let _ = self.seal_locked(&mut buffers, true);
        }
        self.publish_gauges();
    }

    fn take_next_sealed(&self) -> Option<SpanBatch> {
        let batch = {
            let mut buffers = self.buffers.lock().unwrap();
            let batch = buffers.sealed.pop_front()?;
            buffers.in_flight_spans = batch.len();
            batch
        };
        self.publish_gauges();
        Some(batch)
    }

    fn clear_in_flight(&self) {
        let mut buffers = self.buffers.lock().unwrap();
        buffers.in_flight_spans = 0;
    }

    /// Counts and discards everything still buffered once the grace period
    /// has elapsed. The abandoned in-flight batch counts as dropped: its
    /// send was cancelled, not awaited.
    fn discard_remaining(&self) {
        let dropped = {
            let mut buffers = self.buffers.lock().unwrap();
            let mut dropped = Dropped::default();
            if !buffers.open.is_empty() {
                dropped.merge(Dropped::from_batch(&buffers.open));
            }
            for batch in &buffers.sealed {
                dropped.merge(Dropped::from_batch(batch));
            }
            if buffers.in_flight_spans > 0 {
                dropped.merge(Dropped {
                    spans: buffers.in_flight_spans,
                    messages: 1,
                });
            }
            *buffers = Buffers::new();
            dropped
        };

        if !dropped.is_empty() {
            tracing::warn!(
                spans = dropped.spans,
                "shutdown grace period elapsed, dropping unsent spans"
            );
            self.emit_dropped(dropped);
        }
        self.publish_gauges();
    }
}

/// Cheap cloneable handle for span producers.
#[derive(Clone)]
pub struct ReporterHandle {
    shared: Arc<Shared>,
}

impl ReporterHandle {
    /// Accepts a span for eventual delivery. Returns immediately; errors
    /// and backpressure are absorbed by the pipeline and surface only as
    /// metrics and logs.
    pub fn report(&self, span: Span) {
        self.shared.report(span);
    }
}

/// Accumulates spans into batches and drives their delivery.
pub struct BatchingReporter {
    shared: Arc<Shared>,
    driver: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl BatchingReporter {
    /// Creates the reporter and spawns its flush driver on the current
    /// runtime.
    pub async fn new(
        config: ReporterConfig,
        sender: Arc<dyn SenderBoxed>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let shared = Arc::new(Shared {
            buffers: Mutex::new(Buffers::new()),
            flush_notify: Notify::new(),
            metrics,
            config,
            closed: AtomicBool::new(false),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let driver = tokio::spawn(run_driver(Arc::clone(&shared), sender, shutdown_rx));

        Self {
            shared,
            driver: Some(driver),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Handle for producers; clones share the same pipeline.
    pub fn handle(&self) -> ReporterHandle {
        ReporterHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// See [`ReporterHandle::report`].
    pub fn report(&self, span: Span) {
        self.shared.report(span);
    }

    /// Stops the timer, flushes the open batch, and waits up to the
    /// configured grace period for in-flight deliveries. Whatever cannot be
    /// flushed in time is dropped and counted. Idempotent.
    pub async fn close(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        let Some(mut driver) = self.driver.take() else {
            return;
        };

        let grace = self.shared.config.close_timeout;
        if tokio::time::timeout(grace, &mut driver).await.is_err() {
            driver.abort();
            self.shared.discard_remaining();
        }
    }
}

/// Flush driver: seals aged batches and delivers sealed ones, one at a
/// time. Runs until the shutdown signal, then performs the final flush.
async fn run_driver(
    shared: Arc<Shared>,
    sender: Arc<dyn SenderBoxed>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    // Parking horizon while the open batch is empty; any report() that
    // seals a batch wakes the driver through the notify.
    const IDLE_PARK: Duration = Duration::from_secs(3600);

    loop {
        let deadline = {
            let buffers = shared.buffers.lock().unwrap();
            buffers.open.deadline(shared.config.report_timeout)
        };
        let wake_at = deadline.unwrap_or_else(|| Instant::now() + IDLE_PARK);

        tokio::select! {
            _ = shared.flush_notify.notified() => {}
            () = tokio::time::sleep_until(wake_at) => {
                shared.seal_if_aged();
            }
            _ = &mut shutdown_rx => break,
        }

        drain(&shared, sender.as_ref()).await;
    }

    // Final flush before the reporter reports closed.
    shared.seal_for_close();
    drain(&shared, sender.as_ref()).await;
}

async fn drain(shared: &Arc<Shared>, sender: &dyn SenderBoxed) {
    while let Some(batch) = shared.take_next_sealed() {
        send_one(shared, sender, batch).await;
        shared.clear_in_flight();
    }
}

async fn send_one(shared: &Shared, sender: &dyn SenderBoxed, batch: SpanBatch) {
    let spans = batch.len();
    let bytes = batch.message_size();
    let max_attempts = shared.config.max_send_retries + 1;

    for attempt in 1..=max_attempts {
        match sender.send_boxed(batch.clone()).await {
            Ok(()) => {
                shared.metrics.increment_messages();
                shared.metrics.record_message_bytes(bytes as u64);
                return;
            }
            Err(e) if attempt < max_attempts => {
                tracing::warn!(
                    sender = sender.name(),
                    error = %e,
                    attempt,
                    "send failed, retrying"
                );
            }
            Err(e) => {
                tracing::warn!(
                    sender = sender.name(),
                    error = %e,
                    spans,
                    "send failed, dropping batch"
                );
                shared.metrics.increment_spans_dropped(spans as u64);
                shared.metrics.increment_messages_dropped();
            }
        }
    }
}
