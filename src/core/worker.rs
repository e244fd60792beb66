//! Worker bookkeeping owned by the orchestrator actor.
//!
//! A [`WorkerProcess`] never touches the OS process: it holds the outbox and the
//! stop token of the worker's link task. Retiring a worker cancels that token;
//! the link does the signalling and reports the exit back to the actor.

use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::{Message, Role};

/// Orchestrator-local worker identifier, unique per orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Wraps a raw id.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a worker is in its life. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Lifecycle {
    /// Spawned, negotiating the hand-off.
    Starting,
    /// Serving.
    Active,
    /// Told to stop, exit not observed yet.
    Retiring,
    /// Process gone.
    Exited,
}

/// Public identity of a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    /// Orchestrator-local id.
    pub id: WorkerId,
    /// OS process id.
    pub pid: u32,
    /// Role the worker was spawned with.
    pub role: Role,
}

pub(crate) struct WorkerProcess {
    info: WorkerInfo,
    lifecycle: Lifecycle,
    outbox: mpsc::UnboundedSender<Message>,
    stop: CancellationToken,
}

impl WorkerProcess {
    pub(crate) fn new(
        info: WorkerInfo,
        outbox: mpsc::UnboundedSender<Message>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            info,
            lifecycle: Lifecycle::Starting,
            outbox,
            stop,
        }
    }

    pub(crate) fn info(&self) -> &WorkerInfo {
        &self.info
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.info.id
    }

    pub(crate) fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Moves to `next`; refuses to go backwards or stay in place.
    pub(crate) fn advance(&mut self, next: Lifecycle) -> bool {
        if next <= self.lifecycle {
            return false;
        }
        self.lifecycle = next;
        true
    }

    /// Best-effort send; a closed channel is reported by the exit event instead.
    pub(crate) fn send(&self, msg: Message) {
        if self.outbox.send(msg).is_err() {
            tracing::debug!(worker = %self.info.id, %msg, "worker link already closed");
        }
    }

    /// Asks the link to terminate the process. Returns `false` if already retiring.
    pub(crate) fn retire(&mut self) -> bool {
        if !self.advance(Lifecycle::Retiring) {
            return false;
        }
        self.stop.cancel();
        true
    }
}
