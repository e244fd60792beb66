//! # Worker link: the task that owns one worker process.
//!
//! One link is spawned per launched worker. It owns everything the launcher
//! returned and bridges the process into the actor's command queue.
//!
//! ## Flow
//! ```text
//! loop (biased):
//!   reader.recv()      → Command::Message { id, msg }   (worker → orchestrator only)
//!   exit               → Command::Exited { id, status }        (done)
//!   outbox.recv()      → writer.send(msg)                      (best-effort)
//!   stop.cancelled()   → terminate()
//!                          ├─ exit within grace → Command::Exited
//!                          └─ grace elapsed     → kill() → exit → Command::Exited
//! ```
//!
//! ## Rules
//! - Frames are polled before the exit future, so everything the worker wrote
//!   before dying reaches the actor ahead of its exit.
//! - Exactly one `Exited` is reported per link.
//! - A worker writing `serve` is logged and dropped; it never reaches the actor.
//! - `stop` is a child of the orchestrator's root token: cancelling the root
//!   terminates every worker.
//! - Send failures are logged at debug level only; the exit report is
//!   authoritative.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::{WorkerId, actor::Command};
use crate::launch::{ExitStatus, Spawned, Terminate};
use crate::protocol::{Direction, Message};

/// Inputs of one link task.
pub(crate) struct Link {
    pub id: WorkerId,
    pub spawned: Spawned,
    pub outbox: mpsc::UnboundedReceiver<Message>,
    pub stop: CancellationToken,
    pub grace: Duration,
    pub commands: mpsc::UnboundedSender<Command>,
}

impl Link {
    /// Spawns the link onto the current runtime.
    pub(crate) fn spawn(self) {
        tokio::spawn(self.run());
    }

    async fn run(self) {
        let Link {
            id,
            spawned,
            mut outbox,
            stop,
            grace,
            commands,
        } = self;
        let Spawned {
            pid,
            channel,
            mut exit,
            terminator,
        } = spawned;
        let (mut reader, mut writer) = channel.split();
        let mut reading = true;
        let mut writing = true;

        let status = loop {
            tokio::select! {
                biased;

                frame = reader.recv(), if reading => match frame {
                    Some(Ok(msg)) if msg.direction() != Direction::WorkerToOrchestrator => {
                        tracing::warn!(
                            worker = %id, pid, %msg,
                            "dropping orchestrator-only message from worker"
                        );
                    }
                    Some(Ok(msg)) => {
                        let _ = commands.send(Command::Message { id, msg });
                    }
                    Some(Err(err)) => {
                        tracing::debug!(worker = %id, pid, error = %err, "control channel unusable");
                        reading = false;
                    }
                    None => reading = false,
                },
                status = &mut exit => break status,
                msg = outbox.recv(), if writing => match msg {
                    Some(msg) => {
                        if let Err(err) = writer.send(msg).await {
                            tracing::debug!(worker = %id, pid, %msg, error = %err, "send to worker failed");
                        }
                    }
                    None => writing = false,
                },
                _ = stop.cancelled() => {
                    break terminate(id, pid, terminator.as_ref(), &mut exit, grace).await;
                }
            }
        };

        tracing::debug!(worker = %id, pid, %status, "worker exited");
        let _ = commands.send(Command::Exited { id, status });
    }
}

/// SIGTERM, then SIGKILL once `grace` elapsed.
async fn terminate(
    id: WorkerId,
    pid: u32,
    terminator: &dyn Terminate,
    exit: &mut BoxFuture<'static, ExitStatus>,
    grace: Duration,
) -> ExitStatus {
    if let Err(err) = terminator.terminate() {
        tracing::warn!(worker = %id, pid, error = %err, "failed to terminate worker");
    }
    match tokio::time::timeout(grace, &mut *exit).await {
        Ok(status) => status,
        Err(_) => {
            tracing::warn!(worker = %id, pid, ?grace, "worker ignored termination, killing");
            if let Err(err) = terminator.kill() {
                tracing::warn!(worker = %id, pid, error = %err, "failed to kill worker");
            }
            exit.await
        }
    }
}
