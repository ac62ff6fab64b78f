//! Reporter and sender metrics.
//!
//! [`MetricsSink`] is the seam to the hosting process's metrics registry:
//! the pipeline calls it on every accept/drop/queue event and the host maps
//! the calls onto whatever meter/histogram types it runs. [`names`] holds the
//! string identifiers a registry-backed sink is expected to emit under.
//!
//! All counters are monotonically increasing and live for the life of the
//! pipeline; the queued-span and queued-byte values are gauges.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metric name constants for registry-backed sinks.
pub mod names {
    pub const MESSAGE_ACCEPTED: &str = "tracing.reporter.message.accepted";
    pub const MESSAGE_DROPPED: &str = "tracing.reporter.message.dropped";
    pub const SPAN_ACCEPTED: &str = "tracing.reporter.span.accepted";
    pub const SPAN_DROPPED: &str = "tracing.reporter.span.dropped";
    pub const SPAN_BYTES: &str = "tracing.reporter.span.bytes";
    pub const MESSAGE_BYTES: &str = "tracing.reporter.message.bytes";
    pub const QUEUED_SPANS: &str = "tracing.reporter.queued.span";
    pub const QUEUED_BYTES: &str = "tracing.reporter.queued.bytes";
}

/// Receives reporter/sender events.
///
/// Implementations must be cheap and non-blocking: the reporter invokes the
/// sink from the `report()` hot path (outside its batch lock, but still on
/// the producer's thread).
pub trait MetricsSink: Send + Sync {
    /// A message (one encoded batch) was delivered.
    fn increment_messages(&self);

    /// A message was dropped whole, after retries or by overflow policy.
    fn increment_messages_dropped(&self);

    /// `quantity` spans entered the pipeline.
    fn increment_spans(&self, quantity: u64);

    /// `quantity` spans were dropped.
    fn increment_spans_dropped(&self, quantity: u64);

    /// Observed encoded size of one span.
    fn record_span_bytes(&self, bytes: u64);

    /// Observed encoded size of one delivered message.
    fn record_message_bytes(&self, bytes: u64);

    /// Gauge: spans currently buffered (open batch plus sealed queue).
    fn update_queued_spans(&self, count: u64);

    /// Gauge: encoded bytes currently buffered.
    fn update_queued_bytes(&self, bytes: u64);
}

/// Atomic in-process sink with readable accessors.
///
/// Histogram-style events are accumulated as running totals, which is enough
/// for tests and for exporting rates; a registry-backed sink replaces this in
/// production deployments.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    messages: AtomicU64,
    messages_dropped: AtomicU64,
    spans: AtomicU64,
    spans_dropped: AtomicU64,
    span_bytes: AtomicU64,
    message_bytes: AtomicU64,
    queued_spans: AtomicU64,
    queued_bytes: AtomicU64,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> u64 {
        self.messages.load(Ordering::Relaxed)
    }

    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    pub fn spans(&self) -> u64 {
        self.spans.load(Ordering::Relaxed)
    }

    pub fn spans_dropped(&self) -> u64 {
        self.spans_dropped.load(Ordering::Relaxed)
    }

    pub fn span_bytes(&self) -> u64 {
        self.span_bytes.load(Ordering::Relaxed)
    }

    pub fn message_bytes(&self) -> u64 {
        self.message_bytes.load(Ordering::Relaxed)
    }

    pub fn queued_spans(&self) -> u64 {
        self.queued_spans.load(Ordering::Relaxed)
    }

    pub fn queued_bytes(&self) -> u64 {
        self.queued_bytes.load(Ordering::Relaxed)
    }
}

impl MetricsSink for InMemoryMetrics {
    fn increment_messages(&self) {
        self.messages.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_messages_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_spans(&self, quantity: u64) {
        self.spans.fetch_add(quantity, Ordering::Relaxed);
    }

    fn increment_spans_dropped(&self, quantity: u64) {
        self.spans_dropped.fetch_add(quantity, Ordering::Relaxed);
    }

    fn record_span_bytes(&self, bytes: u64) {
        self.span_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn record_message_bytes(&self, bytes: u64) {
        self.message_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn update_queued_spans(&self, count: u64) {
        self.queued_spans.store(count, Ordering::Relaxed);
    }

    fn update_queued_bytes(&self, bytes: u64) {
        self.queued_bytes.store(bytes, Ordering::Relaxed);
    }
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NoopMetrics;

impl NoopMetrics {
    pub fn new() -> Self {
        Self
    }
}

impl MetricsSink for NoopMetrics {
    fn increment_messages(&self) {}
    fn increment_messages_dropped(&self) {}
    fn increment_spans(&self, _quantity: u64) {}
    fn increment_spans_dropped(&self, _quantity: u64) {}
    fn record_span_bytes(&self, _bytes: u64) {}
    fn record_message_bytes(&self, _bytes: u64) {}
    fn update_queued_spans(&self, _count: u64) {}
    fn update_queued_bytes(&self, _bytes: u64) {}
}
