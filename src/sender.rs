//! Transport abstraction for span delivery.
//!
//! A [`Sender`] is a named transport capability: given a [`SpanBatch`],
//! encode and deliver it to one destination, and self-check connectivity.
//! Senders are stateless with respect to spans and safe to reuse across
//! every batch; the flush driver invokes them without extra locking.
//!
//! The trait uses native `impl Future` methods; [`SenderBoxed`] is the
//! object-safe mirror with a blanket implementation, so the pipeline can
//! hold `Arc<dyn SenderBoxed>` for dynamic backend dispatch.

use crate::span::SpanBatch;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Error types for delivery and connectivity checks.
#[derive(Debug, Error, Clone)]
pub enum SendError {
    /// Transport-layer failure (network, broker, HTTP status).
    #[error("transport error: {0}")]
    Transport(String),
    /// The batch could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),
    /// The delivery attempt timed out.
    #[error("send timed out")]
    Timeout,
    /// The sender was closed; no further sends are possible.
    #[error("sender is closed")]
    Closed,
}

/// Trait for delivering span batches to a backend.
///
/// # Note on Object Safety
///
/// The `impl Future` return types are not object-safe. For dynamic dispatch
/// use `Box<dyn SenderBoxed>` / `Arc<dyn SenderBoxed>`.
pub trait Sender: Send + Sync {
    /// Encodes and delivers one batch.
    ///
    /// Transient backend failures are returned as errors, never panics; the
    /// reporter decides whether to retry or count the batch dropped.
    fn send(&self, batch: SpanBatch) -> impl Future<Output = Result<(), SendError>> + Send;

    /// Lightweight connectivity probe.
    fn check(&self) -> impl Future<Output = Result<(), SendError>> + Send;

    /// Releases transport resources. Subsequent sends fail with
    /// [`SendError::Closed`]. Idempotent.
    fn close(&self) -> impl Future<Output = ()> + Send;

    /// Returns the sender name for logging.
    fn name(&self) -> &str;
}

/// Object-safe version of [`Sender`] for dynamic dispatch.
pub trait SenderBoxed: Send + Sync {
    fn send_boxed(
        &self,
        batch: SpanBatch,
    ) -> Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + '_>>;

    fn check_boxed(&self) -> Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + '_>>;

    fn close_boxed(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    fn name(&self) -> &str;
}

/// Blanket implementation: any Sender can be used as SenderBoxed
impl<T: Sender> SenderBoxed for T {
    fn send_boxed(
        &self,
        batch: SpanBatch,
    ) -> Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + '_>> {
        Box::pin(self.send(batch))
    }

    fn check_boxed(&self) -> Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + '_>> {
        Box::pin(self.check())
    }

    fn close_boxed(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.close())
    }

    fn name(&self) -> &str {
        Sender::name(self)
    }
}

/// Writes each encoded span to the log sink.
///
/// Useful in development and as a last-resort destination; `check()` is
/// always healthy since the log sink is local.
#[derive(Debug, Default)]
pub struct ConsoleSender {
    closed: AtomicBool,
}

impl ConsoleSender {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sender for ConsoleSender {
    async fn send(&self, batch: SpanBatch) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }
        for span in &batch.spans {
            let encoded =
                serde_json::to_string(span).map_err(|e| SendError::Encode(e.to_string()))?;
            tracing::info!(target: "span_pipeline::console", "{}", encoded);
        }
        Ok(())
    }

    async fn check(&self) -> Result<(), SendError> {
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn name(&self) -> &str {
        "console"
    }
}

/// Discards every batch silently.
#[derive(Debug, Default)]
pub struct NoopSender {
    closed: AtomicBool,
}

impl NoopSender {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sender for NoopSender {
    async fn send(&self, _batch: SpanBatch) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }
        Ok(())
    }

    async fn check(&self) -> Result<(), SendError> {
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Test sender that records all delivered batches for verification
#[cfg(test)]
pub(crate) struct RecordingSender {
    batches: std::sync::Mutex<Vec<SpanBatch>>,
    closed: AtomicBool,
}

#[cfg(test)]
impl RecordingSender {
    pub(crate) fn new() -> Self {
        Self {
            batches: std::sync::Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn delivered_batches(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub(crate) fn delivered_spans(&self) -> Vec<crate::span::Span> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flat_map(|b| b.spans.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
impl Sender for RecordingSender {
    async fn send(&self, batch: SpanBatch) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }
        self.batches.lock().unwrap().push(batch);
        Ok(())
    }

    async fn check(&self) -> Result<(), SendError> {
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Test sender whose deliveries always fail
#[cfg(test)]
pub(crate) struct FailingSender {
    attempts: std::sync::atomic::AtomicU64,
}

#[cfg(test)]
impl FailingSender {
    pub(crate) fn new() -> Self {
        Self {
            attempts: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub(crate) fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
impl Sender for FailingSender {
    async fn send(&self, _batch: SpanBatch) -> Result<(), SendError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        Err(SendError::Transport("simulated failure".into()))
    }

    async fn check(&self) -> Result<(), SendError> {
        Err(SendError::Transport("simulated failure".into()))
    }

    async fn close(&self) {}

    fn name(&self) -> &str {
        "failing"
    }
}
