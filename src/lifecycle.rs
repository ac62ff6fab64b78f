//! Startup and shutdown sequencing.
//!
//! [`PipelineLifecycle`] is the plain start/stop contract the hosting
//! process invokes exactly once each around the pipeline. `start()` verifies
//! connectivity; `stop()` drains and closes in the one order that cannot
//! lose spans.

use crate::reporter::BatchingReporter;
use crate::sender::{SendError, SenderBoxed};
use std::sync::Arc;
use thiserror::Error;

/// What to do when the startup connectivity check fails.
///
/// One policy per deployment; the choice is explicit rather than varying by
/// backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartupCheckPolicy {
    /// Log the failure and keep running; tracing is best-effort until the
    /// backend recovers.
    #[default]
    LogAndContinue,
    /// Surface the failure so the host can abort startup.
    FailFast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Started,
    Stopped,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("startup connectivity check failed: {0}")]
    CheckFailed(SendError),
    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },
}

/// Sequences the reporter and sender through `Created → Started → Stopped`.
pub struct PipelineLifecycle {
    reporter: BatchingReporter,
    sender: Arc<dyn SenderBoxed>,
    policy: StartupCheckPolicy,
    state: LifecycleState,
}

impl PipelineLifecycle {
    pub fn new(
        reporter: BatchingReporter,
        sender: Arc<dyn SenderBoxed>,
        policy: StartupCheckPolicy,
    ) -> Self {
        Self {
            reporter,
            sender,
            policy,
            state: LifecycleState::Created,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Handle for producers; valid for the life of the pipeline.
    pub fn reporter(&self) -> crate::reporter::ReporterHandle {
        self.reporter.handle()
    }

    /// Runs the sender's connectivity check and marks the pipeline started.
    ///
    /// A failed check either logs (pipeline runs in degraded, best-effort
    /// mode) or aborts, per [`StartupCheckPolicy`].
    pub async fn start(&mut self) -> Result<(), LifecycleError> {
        if self.state != LifecycleState::Created {
            return Err(LifecycleError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }

        match self.sender.check_boxed().await {
            Ok(()) => {
                tracing::info!(sender = self.sender.name(), "connected to span collector");
            }
            Err(e) => match self.policy {
                StartupCheckPolicy::LogAndContinue => {
                    tracing::error!(
                        sender = self.sender.name(),
                        error = %e,
                        "unable to connect to span collector, tracing is best-effort"
                    );
                }
                StartupCheckPolicy::FailFast => {
                    return Err(LifecycleError::CheckFailed(e));
                }
            },
        }

        self.state = LifecycleState::Started;
        Ok(())
    }

    /// Drains and releases the pipeline.
    ///
    /// The reporter closes before the sender: its close-time flush needs the
    /// sender still open. Reversing the order fails in-flight flushes and
    /// loses spans.
    pub async fn stop(&mut self) -> Result<(), LifecycleError> {
        if self.state != LifecycleState::Started {
            return Err(LifecycleError::InvalidState {
                operation: "stop",
                state: self.state,
            });
        }

        self.reporter.close().await;
        self.sender.close_boxed().await;
        self.state = LifecycleState::Stopped;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::InMemoryMetrics;
    use crate::reporter::ReporterConfig;
    use crate::sender::{FailingSender, RecordingSender};
    use crate::span::{Span, SpanKind};
    use std::time::Duration;

    async fn lifecycle_with(
        sender: Arc<dyn SenderBoxed>,
        policy: StartupCheckPolicy,
    ) -> PipelineLifecycle {
        let config = ReporterConfig {
            report_timeout: Duration::from_secs(60),
            ..Default::default()
        };
        let metrics = Arc::new(InMemoryMetrics::new());
        let reporter = BatchingReporter::new(config, sender.clone(), metrics).await;
        PipelineLifecycle::new(reporter, sender, policy)
    }

    #[tokio::test]
    async fn test_start_stop_walks_the_state_machine() {
        let sender = Arc::new(RecordingSender::new());
        let mut lifecycle = lifecycle_with(sender, StartupCheckPolicy::default()).await;

        assert_eq!(lifecycle.state(), LifecycleState::Created);
        lifecycle.start().await.unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Started);
        lifecycle.stop().await.unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_invalid_transitions_are_errors() {
        let sender = Arc::new(RecordingSender::new());
        let mut lifecycle = lifecycle_with(sender, StartupCheckPolicy::default()).await;

        // stop before start
        assert!(matches!(
            lifecycle.stop().await,
            Err(LifecycleError::InvalidState { operation: "stop", .. })
        ));

        lifecycle.start().await.unwrap();
        assert!(matches!(
            lifecycle.start().await,
            Err(LifecycleError::InvalidState { operation: "start", .. })
        ));

        lifecycle.stop().await.unwrap();
        assert!(matches!(
            lifecycle.stop().await,
            Err(LifecycleError::InvalidState { operation: "stop", .. })
        ));
    }

    #[tokio::test]
    async fn test_log_and_continue_starts_despite_failed_check() {
        let sender = Arc::new(FailingSender::new());
        let mut lifecycle = lifecycle_with(sender, StartupCheckPolicy::LogAndContinue).await;

        lifecycle.start().await.unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Started);
        lifecycle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_fast_aborts_startup() {
        let sender = Arc::new(FailingSender::new());
        let mut lifecycle = lifecycle_with(sender, StartupCheckPolicy::FailFast).await;

        assert!(matches!(
            lifecycle.start().await,
            Err(LifecycleError::CheckFailed(_))
        ));
        assert_eq!(lifecycle.state(), LifecycleState::Created);
    }

    #[tokio::test]
    async fn test_stop_delivers_buffered_spans() {
        let sender = Arc::new(RecordingSender::new());
        let mut lifecycle = lifecycle_with(sender.clone(), StartupCheckPolicy::default()).await;
        lifecycle.start().await.unwrap();

        let handle = lifecycle.reporter();
        for seq in 0..3 {
            handle.report(Span::new(1, seq, 0, format!("op-{}", seq), SpanKind::Internal));
        }
        assert_eq!(sender.delivered_batches(), 0);

        lifecycle.stop().await.unwrap();
        assert_eq!(sender.delivered_spans().len(), 3);
    }
}
