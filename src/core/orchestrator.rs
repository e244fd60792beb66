//! # Orchestrator: public handle of the hand-off state machine.
//!
//! [`Orchestrator`] is a cheap, cloneable handle onto the actor task that owns
//! all workers. Every call turns into a command on the actor's queue.
//!
//! ## Lifecycle
//! ```text
//! Orchestrator::builder(cfg).build()
//!     ├─► spawns actor          (owns workers, recovery, in-flight transition)
//!     └─► spawns subscriber listener (Bus ─► SubscriberSet)
//!
//! restart()  ─► Transition (shared; resolves with the new active worker)
//! snapshot() ─► Snapshot { phase, active, pending, retiring, recovery_remaining }
//! destroy()  ─► every worker terminated, later restart() → Destroyed
//! drop(last handle) ─► same teardown as destroy(), in the background
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use handover::{Config, LaunchSpec, Orchestrator};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::new(LaunchSpec::new("/usr/local/bin/api"));
//!     let orchestrator = Orchestrator::builder(cfg).build();
//!
//!     let first = orchestrator.restart().await?;
//!     println!("serving from pid {}", first.pid);
//!
//!     // later, e.g. after a deploy:
//!     let next = orchestrator.restart().await?;
//!     println!("handed over to pid {}", next.pid);
//!
//!     orchestrator.destroy().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::core::actor::Command;
use crate::core::builder::OrchestratorBuilder;
use crate::core::shutdown;
use crate::core::{Config, Transition, WorkerInfo};
use crate::error::{RuntimeError, TransitionError};
use crate::events::{Bus, Event};

/// Coarse state of an orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No worker is active and none is negotiating.
    Idle,
    /// A spawned worker has not completed the hand-off yet.
    AwaitingHandoff,
    /// Exactly one active worker, nothing in flight.
    Steady,
    /// Terminal; every worker was terminated.
    Destroyed,
}

/// Point-in-time view of an orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Coarse state.
    pub phase: Phase,
    /// Serving worker.
    pub active: Option<WorkerInfo>,
    /// Worker negotiating the hand-off.
    pub pending: Option<WorkerInfo>,
    /// Workers told to stop whose exit was not observed yet.
    pub retiring: usize,
    /// Automatic recovery attempts left.
    pub recovery_remaining: u32,
}

impl Snapshot {
    fn destroyed() -> Self {
        Self {
            phase: Phase::Destroyed,
            active: None,
            pending: None,
            retiring: 0,
            recovery_remaining: 0,
        }
    }
}

/// Handle onto a running orchestrator.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    commands: mpsc::UnboundedSender<Command>,
    bus: Bus,
    root: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

impl Orchestrator {
    /// Starts building an orchestrator.
    pub fn builder(cfg: Config) -> OrchestratorBuilder {
        OrchestratorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        commands: mpsc::UnboundedSender<Command>,
        bus: Bus,
        root: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                commands,
                bus,
                root,
            }),
        }
    }

    /// Starts a hand-off to a freshly launched worker.
    ///
    /// While a hand-off is in flight every call returns a clone of the same
    /// [`Transition`]; only one worker is ever negotiating. The first worker is
    /// spawned with the `initial` role, replacements with `recurring`.
    ///
    /// Awaiting the transition yields the new active worker, or
    /// - [`TransitionError::Launch`] if spawning failed,
    /// - [`TransitionError::WorkerExited`] if the worker died before `ready`,
    /// - [`TransitionError::Destroyed`] once the orchestrator is gone.
    pub fn restart(&self) -> Transition {
        let (reply, rx) = oneshot::channel();
        if self.inner.commands.send(Command::Restart { reply }).is_err() {
            return Transition::ready(Err(TransitionError::Destroyed));
        }
        Transition::deferred(rx)
    }

    /// Returns the current state.
    pub async fn snapshot(&self) -> Snapshot {
        let (reply, rx) = oneshot::channel();
        if self.inner.commands.send(Command::Snapshot { reply }).is_err() {
            return Snapshot::destroyed();
        }
        rx.await.unwrap_or_else(|_| Snapshot::destroyed())
    }

    /// Terminates every worker and stops accepting hand-offs.
    ///
    /// Waits until all workers exited (at most about `grace`). Idempotent.
    pub async fn destroy(&self) {
        let (reply, rx) = oneshot::channel();
        if self.inner.commands.send(Command::Destroy { reply }).is_err() {
            return;
        }
        let _ = rx.await;
    }

    /// Subscribes to the event stream.
    ///
    /// Only events published after this call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.bus.subscribe()
    }

    /// Returns `true` once the orchestrator started tearing down.
    pub fn is_destroyed(&self) -> bool {
        self.inner.root.is_cancelled()
    }

    /// Runs the usual supervisor main loop.
    ///
    /// 1. Starts the first worker; a launch failure is returned as
    ///    [`RuntimeError::Startup`]. A worker that crashes before `ready` is left
    ///    to automatic recovery.
    /// 2. Waits for SIGINT/SIGTERM/SIGQUIT (Ctrl-C elsewhere), or for the
    ///    orchestrator to be torn down by other means (e.g. a worker's `exit`).
    /// 3. Destroys the orchestrator.
    pub async fn serve_until_signal(&self) -> Result<(), RuntimeError> {
        match self.restart().await {
            Ok(worker) => {
                tracing::info!(worker = %worker.id, pid = worker.pid, "first worker active");
            }
            Err(err @ TransitionError::Launch { .. }) => {
                self.destroy().await;
                return Err(RuntimeError::Startup(err));
            }
            Err(TransitionError::Destroyed) => return Ok(()),
            Err(err) => {
                tracing::warn!(error = %err, "first worker failed, relying on recovery");
            }
        }

        let outcome = tokio::select! {
            res = shutdown::wait_for_shutdown_signal() => res.map_err(RuntimeError::Signal),
            _ = self.inner.root.cancelled() => Ok(()),
        };
        if outcome.is_ok() && !self.is_destroyed() {
            tracing::info!("shutdown signal received");
        }
        self.destroy().await;
        outcome
    }
}
