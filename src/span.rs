//! Span data model and batch container.
//!
//! The pipeline treats [`Span`] as an opaque record: it is produced by an
//! external tracer, serialized with serde, and never inspected beyond its
//! encoded size in bytes. [`SpanBatch`] is the unit of delivery handed to a
//! sender: an ordered group of spans with a running byte counter and an age.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::{Duration, Instant};

/// The role a span played in the traced operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanKind {
    Internal,
    Client,
    Server,
    Producer,
    Consumer,
}

/// Outcome of the traced operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanStatus {
    Unset,
    Ok,
    Error,
}

/// A typed attribute value attached to a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

/// One recorded unit of traced work.
///
/// Identifiers follow the usual split: a 128-bit trace id shared by every
/// participant in the trace and a 64-bit span id unique within it. A span is
/// immutable once [`finish`](Span::finish)ed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub trace_id: u128,
    pub span_id: u64,
    /// Zero when this span is a trace root.
    pub parent_span_id: u64,
    pub name: String,
    pub kind: SpanKind,
    /// Unix epoch nanoseconds at span start.
    pub start_unix_nanos: u64,
    /// Unix epoch nanoseconds at span end; zero while unfinished.
    pub end_unix_nanos: u64,
    pub status: SpanStatus,
    pub attributes: HashMap<String, AttributeValue>,
}

impl Span {
    /// Creates a started span with the current wall-clock time.
    pub fn new(
        trace_id: u128,
        span_id: u64,
        parent_span_id: u64,
        name: String,
        kind: SpanKind,
    ) -> Self {
        Self {
            trace_id,
            span_id,
            parent_span_id,
            name,
            kind,
            start_unix_nanos: unix_nanos_now(),
            end_unix_nanos: 0,
            status: SpanStatus::Unset,
            attributes: HashMap::new(),
        }
    }

    /// Attaches or replaces an attribute.
    pub fn set_attribute(&mut self, key: String, value: AttributeValue) {
        self.attributes.insert(key, value);
    }

    /// Marks the span finished with the given status, stamping the end time.
    pub fn finish(&mut self, status: SpanStatus) {
        self.end_unix_nanos = unix_nanos_now();
        self.status = status;
    }

    /// Wall-clock duration in nanoseconds; zero while unfinished.
    pub fn duration_nanos(&self) -> u64 {
        self.end_unix_nanos.saturating_sub(self.start_unix_nanos)
    }

    /// Size of this span's JSON encoding in bytes.
    ///
    /// `None` if the span cannot be serialized; the reporter drops and
    /// counts such spans rather than surfacing an error to the producer.
    pub fn encoded_size(&self) -> Option<usize> {
        serde_json::to_vec(self).map(|v| v.len()).ok()
    }
}

fn unix_nanos_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// An ordered group of spans awaiting one delivery attempt.
///
/// The batch tracks the total encoded size of its spans and the instant the
/// first span arrived. Both feed the reporter's flush triggers; senders use
/// [`encode`](SpanBatch::encode) to obtain the message body.
#[derive(Debug, Clone, Default)]
pub struct SpanBatch {
    pub spans: Vec<Span>,
    /// Sum of the spans' individual encoded sizes, excluding list overhead.
    span_bytes: usize,
    first_span_at: Option<Instant>,
}

impl SpanBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a batch from pre-collected spans, measuring each one.
    pub fn with_spans(spans: Vec<Span>) -> Self {
        let mut batch = Self::new();
        for span in spans {
            let size = span.encoded_size().unwrap_or(0);
            batch.add(span, size);
        }
        batch
    }

    /// Appends a span whose encoded size has already been measured.
    pub fn add(&mut self, span: Span, encoded_size: usize) {
        if self.first_span_at.is_none() {
            self.first_span_at = Some(Instant::now());
        }
        self.span_bytes += encoded_size;
        self.spans.push(span);
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Sum of the spans' individual encoded sizes.
    pub fn span_bytes(&self) -> usize {
        self.span_bytes
    }

    /// Encoded size of the JSON-array message this batch produces.
    ///
    /// Two bytes of brackets plus one comma between adjacent spans.
    pub fn message_size(&self) -> usize {
        2 + self.span_bytes + self.spans.len().saturating_sub(1)
    }

    /// Message size if a span of `encoded_size` bytes were appended.
    pub fn message_size_with(&self, encoded_size: usize) -> usize {
        2 + self.span_bytes + encoded_size + self.spans.len()
    }

    /// Time since the first span was added; zero for an empty batch.
    pub fn age(&self) -> Duration {
        self.first_span_at
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Deadline at which the age trigger fires, if the batch is non-empty.
    pub fn deadline(&self, timeout: Duration) -> Option<Instant> {
        self.first_span_at.map(|t| t + timeout)
    }

    /// Serializes the batch into its JSON-array message body.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.spans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(seq: u64) -> Span {
        Span::new(1, seq, 0, format!("op-{}", seq), SpanKind::Internal)
    }

    #[test]
    fn test_span_finish_stamps_end_time() {
        let mut s = span(1);
        assert_eq!(s.status, SpanStatus::Unset);
        assert_eq!(s.duration_nanos(), 0);

        s.finish(SpanStatus::Ok);
        assert_eq!(s.status, SpanStatus::Ok);
        assert!(s.end_unix_nanos >= s.start_unix_nanos);
    }

    #[test]
    fn test_message_size_matches_encoding() {
        let mut batch = SpanBatch::new();
        for seq in 0..3 {
            let s = span(seq);
            let size = s.encoded_size().unwrap();
            batch.add(s, size);
        }

        let encoded = batch.encode().unwrap();
        assert_eq!(batch.message_size(), encoded.len());
    }

    #[test]
    fn test_message_size_with_predicts_next_add() {
        let mut batch = SpanBatch::new();
        let first = span(1);
        let first_size = first.encoded_size().unwrap();
        batch.add(first, first_size);

        let next = span(2);
        let next_size = next.encoded_size().unwrap();
        let predicted = batch.message_size_with(next_size);
        batch.add(next, next_size);
        assert_eq!(batch.message_size(), predicted);
    }

    #[tokio::test]
    async fn test_batch_age_starts_at_first_span() {
        let mut batch = SpanBatch::new();
        assert_eq!(batch.age(), Duration::ZERO);
        assert!(batch.deadline(Duration::from_secs(1)).is_none());

        let s = span(1);
        let size = s.encoded_size().unwrap();
        batch.add(s, size);
        assert!(batch.deadline(Duration::from_secs(1)).is_some());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(batch.age() >= Duration::from_millis(20));
    }

    #[test]
    fn test_with_spans_preserves_order() {
        let batch = SpanBatch::with_spans((0..5).map(span).collect());
        assert_eq!(batch.len(), 5);
        for (i, s) in batch.spans.iter().enumerate() {
            assert_eq!(s.span_id, i as u64);
        }
    }
}
