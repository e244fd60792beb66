//! # LogWriter: events as `tracing` records
//!
//! A minimal subscriber that renders orchestrator [`Event`]s through `tracing`.
//! Install any `tracing` subscriber (e.g. `tracing-subscriber`'s `fmt`) to see them.
//!
//! ## Example output
//! ```text
//! INFO  worker spawned worker=1 pid=4242 role="initial"
//! INFO  worker active worker=1 pid=4242 role="initial"
//! WARN  worker exited worker=1 pid=4242 code=Some(1) signal=None
//! WARN  recovery remaining=2 delay_ms=Some(100)
//! ERROR recovery budget exhausted
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind, RECOVER_EXHAUSTED, RECOVER_IN_FLIGHT};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let worker = e.worker.unwrap_or_default();
        let pid = e.pid.unwrap_or_default();
        let role = e.role.map(|r| r.as_str()).unwrap_or("unknown");
        let reason = e.reason.as_deref().unwrap_or("unknown");

        match e.kind {
            EventKind::WorkerSpawned => {
                tracing::info!(worker, pid, role, "worker spawned");
            }
            EventKind::WorkerActive => {
                tracing::info!(worker, pid, role, "worker active");
            }
            EventKind::WorkerRetiring => {
                tracing::info!(worker, pid, role, reason, "worker retiring");
            }
            EventKind::WorkerExited => {
                tracing::warn!(worker, pid, code = ?e.code, signal = ?e.signal, "worker exited");
            }
            EventKind::Recover => match e.reason.as_deref() {
                Some(RECOVER_EXHAUSTED) => {
                    tracing::error!("recovery budget exhausted");
                }
                Some(RECOVER_IN_FLIGHT) => {
                    tracing::info!(remaining = ?e.remaining, "replacement already starting");
                }
                _ => {
                    tracing::warn!(remaining = ?e.remaining, delay_ms = ?e.delay_ms, "recovery");
                }
            },
            EventKind::RestartRequested => {
                tracing::info!(worker, pid, "worker requested restart");
            }
            EventKind::ExitRequested => {
                tracing::warn!(worker, pid, code = ?e.code, "worker requested exit");
            }
            EventKind::Error => {
                tracing::error!(worker, pid, reason, "orchestrator error");
            }
            EventKind::Destroyed => {
                tracing::info!("orchestrator destroyed");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(subscriber = ?e.subscriber, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(subscriber = ?e.subscriber, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
