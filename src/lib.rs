//! Span Export Pipeline
//!
//! An asynchronous pipeline that takes finished trace spans from request
//! instrumentation and delivers them to a pluggable transport backend
//! (console, HTTP, Kafka, AMQP, or a no-op sink) while bounding memory use,
//! tolerating backend outages, and shutting down without silent loss.
//!
//! The moving parts:
//!
//! - [`BatchingReporter`] accumulates spans from any number of producers
//!   into size/time-bounded batches; `report()` never blocks on I/O.
//! - [`Sender`] is the transport capability; one implementation per backend,
//!   selected by [`CollectorConfig`] at construction.
//! - [`PipelineLifecycle`] sequences the startup health check and the
//!   ordered drain-then-close shutdown.
//! - [`SamplingPolicy`] decides which traces enter the pipeline at all.
//! - [`MetricsSink`] receives accept/drop/queue events for the hosting
//!   process's metrics registry.
//!
//! Trace-context propagation, per-backend wire protocols, and configuration
//! loading are external collaborators; this crate is only the pipeline.

pub mod amqp;
pub mod config;
pub mod http;
pub mod kafka;
pub mod lifecycle;
pub mod metrics;
pub mod reporter;
pub mod sampler;
pub mod sender;
pub mod span;

// Re-export main types
pub use amqp::AmqpSender;
pub use config::{
    AmqpConfig, CollectorConfig, ConfigError, ConsoleConfig, EmptyConfig, HttpConfig,
    KafkaConfig, ReportingConfig, TracingPipeline,
};
pub use http::HttpSender;
pub use kafka::KafkaSender;
pub use lifecycle::{LifecycleError, LifecycleState, PipelineLifecycle, StartupCheckPolicy};
pub use metrics::{InMemoryMetrics, MetricsSink, NoopMetrics};
pub use reporter::{BatchingReporter, OverflowPolicy, ReporterConfig, ReporterHandle};
pub use sampler::{
    AlwaysSampler, NeverSampler, RateSampler, Sampler, SamplingPolicy, TrafficDirection,
};
pub use sender::{ConsoleSender, NoopSender, SendError, Sender, SenderBoxed};
pub use span::{AttributeValue, Span, SpanBatch, SpanKind, SpanStatus};
