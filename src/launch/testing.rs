//! In-memory launcher used by the orchestrator tests.
//!
//! Every launch produces a [`FakeWorker`] handed to the test through
//! [`FakeLauncher::next_worker`]. The test plays the worker side of the
//! protocol over an in-memory channel and decides when the "process" exits.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};

use super::{ExitStatus, Launch, LaunchSpec, Spawned, Terminate};
use crate::error::LaunchError;
use crate::protocol::{ControlChannel, Message, Role, env};

const SIGTERM: i32 = 15;
const SIGKILL: i32 = 9;

type ExitSlot = Arc<Mutex<Option<oneshot::Sender<ExitStatus>>>>;

fn finish(slot: &ExitSlot, status: ExitStatus) {
    if let Some(tx) = slot.lock().unwrap().take() {
        let _ = tx.send(status);
    }
}

/// Test side of one launched worker.
pub(crate) struct FakeWorker {
    pub pid: u32,
    pub role: Role,
    pub ipc_timeout: Duration,
    channel: ControlChannel,
    exit: ExitSlot,
    terminated: Arc<AtomicBool>,
}

impl FakeWorker {
    pub async fn send(&mut self, msg: Message) {
        self.channel.send(msg).await.unwrap();
    }

    pub async fn recv(&mut self) -> Option<Message> {
        tokio::time::timeout(Duration::from_secs(5), self.channel.recv())
            .await
            .expect("worker waited too long for a message")
            .map(|r| r.unwrap())
    }

    /// Exits on its own with `code`.
    pub fn crash(&self, code: i32) {
        finish(&self.exit, ExitStatus::exited(code));
    }

    /// Exits as if the pending SIGTERM finally took effect.
    pub fn exit_by_signal(&self) {
        finish(&self.exit, ExitStatus::signaled(SIGTERM));
    }

    pub fn was_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

struct FakeTerminator {
    exit: ExitSlot,
    terminated: Arc<AtomicBool>,
    exit_on_terminate: bool,
}

impl Terminate for FakeTerminator {
    fn terminate(&self) -> std::io::Result<()> {
        self.terminated.store(true, Ordering::SeqCst);
        if self.exit_on_terminate {
            finish(&self.exit, ExitStatus::signaled(SIGTERM));
        }
        Ok(())
    }

    fn kill(&self) -> std::io::Result<()> {
        self.terminated.store(true, Ordering::SeqCst);
        finish(&self.exit, ExitStatus::signaled(SIGKILL));
        Ok(())
    }
}

/// Launcher handing out in-memory workers.
pub(crate) struct FakeLauncher {
    workers: mpsc::UnboundedSender<FakeWorker>,
    launched: AtomicUsize,
    next_pid: AtomicU32,
    fail_next: AtomicBool,
    exit_on_terminate: AtomicBool,
}

/// Receiving side of a [`FakeLauncher`].
pub(crate) struct FakeWorkers {
    rx: mpsc::UnboundedReceiver<FakeWorker>,
    launcher: Arc<FakeLauncher>,
}

impl FakeLauncher {
    pub fn new() -> (Arc<FakeLauncher>, FakeWorkers) {
        let (tx, rx) = mpsc::unbounded_channel();
        let launcher = Arc::new(FakeLauncher {
            workers: tx,
            launched: AtomicUsize::new(0),
            next_pid: AtomicU32::new(1000),
            fail_next: AtomicBool::new(false),
            exit_on_terminate: AtomicBool::new(true),
        });
        let workers = FakeWorkers {
            rx,
            launcher: Arc::clone(&launcher),
        };
        (launcher, workers)
    }
}

impl FakeWorkers {
    pub async fn next_worker(&mut self) -> FakeWorker {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("no worker was launched")
            .expect("launcher dropped")
    }

    /// Returns a worker that was already launched, without waiting.
    pub fn try_next_worker(&mut self) -> Option<FakeWorker> {
        self.rx.try_recv().ok()
    }

    pub fn launched(&self) -> usize {
        self.launcher.launched.load(Ordering::SeqCst)
    }

    pub fn fail_next_launch(&self) {
        self.launcher.fail_next.store(true, Ordering::SeqCst);
    }

    /// Keeps terminated workers alive until the test exits them.
    pub fn hold_exit_on_terminate(&self) {
        self.launcher
            .exit_on_terminate
            .store(false, Ordering::SeqCst);
    }
}

impl Launch for FakeLauncher {
    fn launch(
        &self,
        spec: &LaunchSpec,
        markers: &[(String, String)],
    ) -> Result<Spawned, LaunchError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(LaunchError::Spawn {
                program: spec.display_program(),
                source: std::io::ErrorKind::NotFound.into(),
            });
        }

        let lookup = |key: &str| {
            markers
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        let role = Role::detect_with(lookup).expect("orchestrator must set a role marker");
        let ipc_timeout = env::ipc_timeout_with(lookup);

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let (orchestrator_end, worker_end) = ControlChannel::pair();
        let (exit_tx, exit_rx) = oneshot::channel();
        let exit: ExitSlot = Arc::new(Mutex::new(Some(exit_tx)));
        let terminated = Arc::new(AtomicBool::new(false));

        let terminator = FakeTerminator {
            exit: Arc::clone(&exit),
            terminated: Arc::clone(&terminated),
            exit_on_terminate: self.exit_on_terminate.load(Ordering::SeqCst),
        };
        let worker = FakeWorker {
            pid,
            role,
            ipc_timeout,
            channel: worker_end,
            exit,
            terminated,
        };

        self.launched.fetch_add(1, Ordering::SeqCst);
        let _ = self.workers.send(worker);

        Ok(Spawned {
            pid,
            channel: orchestrator_end,
            exit: exit_rx
                .map(|status| status.unwrap_or(ExitStatus::signaled(SIGKILL)))
                .boxed(),
            terminator: Box::new(terminator),
        })
    }
}
