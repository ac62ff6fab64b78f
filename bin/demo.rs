//! # Span Pipeline Demo
//!
//! End-to-end walkthrough of the pipeline against the console sender:
//! build from a collector configuration, start (connectivity check), report
//! sampled spans from a few producer tasks, then stop with an ordered
//! drain.
//!
//! ## Running
//!
//! ```bash
//! cargo run --bin demo --features demo
//! ```

use span_pipeline::{
    AttributeValue, CollectorConfig, ConsoleConfig, InMemoryMetrics, ReportingConfig, Span,
    SpanKind, SpanStatus, StartupCheckPolicy, TrafficDirection,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = CollectorConfig::Console(ConsoleConfig {
        reporting: ReportingConfig {
            service_name: Some("demo".to_string()),
            sample_rate: 0.5,
            report_timeout: Duration::from_millis(500),
            ..Default::default()
        },
    });

    let metrics = Arc::new(InMemoryMetrics::new());
    let mut pipeline = config
        .build(metrics.clone(), StartupCheckPolicy::FailFast)
        .await?
        .expect("pipeline is enabled");

    pipeline.lifecycle.start().await?;

    let mut producers = vec![];
    for producer_id in 0..4u64 {
        let reporter = pipeline.reporter.clone();
        let sampling = pipeline.sampling.clone();
        producers.push(tokio::spawn(async move {
            for seq in 0..25u64 {
                let trace_id = u128::from(producer_id * 1000 + seq);
                if !sampling.decide(TrafficDirection::Server, trace_id) {
                    continue;
                }

                let mut span = Span::new(
                    trace_id,
                    (producer_id << 48) | seq,
                    0,
                    format!("GET /orders/{}", seq),
                    SpanKind::Server,
                );
                span.set_attribute(
                    "http.status_code".to_string(),
                    AttributeValue::Int(200),
                );
                span.finish(SpanStatus::Ok);
                reporter.report(span);

                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }));
    }
    for producer in producers {
        producer.await?;
    }

    // Let the age trigger flush the tail before the ordered shutdown.
    tokio::time::sleep(Duration::from_millis(700)).await;
    pipeline.lifecycle.stop().await?;

    tracing::info!(
        spans_accepted = metrics.spans(),
        spans_dropped = metrics.spans_dropped(),
        messages = metrics.messages(),
        "demo finished"
    );
    Ok(())
}
