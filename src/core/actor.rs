//! # Orchestrator actor: the hand-off state machine.
//!
//! A single task owns all orchestration state and consumes one unbounded
//! command queue. Public calls, worker frames, worker exits and recovery timers
//! all arrive as [`Command`]s, so handlers never interleave.
//!
//! ## State
//! ```text
//! active   : Option<WorkerProcess>      the serving worker
//! pending  : Option<WorkerProcess>      spawned, negotiating
//! retiring : HashMap<WorkerId, _>       signalled, exit not seen yet
//! in_flight: Option<InFlight>           shared completion of the current hand-off
//! recovery : RecoveryBudget             attempts left + reset window
//! ```
//!
//! ## Hand-off
//! ```text
//! restart() ──► launch(role, markers) ──► pending, WorkerSpawned
//! ready(pending):
//!   PromoteThenRetire: retire(active) ─► promote(pending) ─► serve, WorkerActive
//!   RetireThenPromote: retire(active) ─► … Exited(old) ─► promote(pending)
//! exit(worker):
//!   WorkerExited ─► reject transition if it was pending
//!               └─► active/pending + auto-recover ─► Recover(remaining) ─► restart() after delay
//! ```
//!
//! ## Terminal paths
//! `destroy()`, an `exit` request from a worker, and dropping every
//! [`Orchestrator`](crate::Orchestrator) handle all run the same teardown:
//! recovery off, in-flight transition rejected, every worker retired, exits
//! awaited for at most `grace` plus a short settle period, then `Destroyed`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::link::Link;
use crate::core::orchestrator::{Phase, Snapshot};
use crate::core::transition::{Completer, Transition};
use crate::core::worker::{Lifecycle, WorkerId, WorkerInfo, WorkerProcess};
use crate::core::{Config, HandoffMode};
use crate::error::TransitionError;
use crate::events::{Bus, Event, EventKind, RECOVER_EXHAUSTED, RECOVER_IN_FLIGHT};
use crate::launch::{ExitStatus, Launch};
use crate::policies::RecoveryBudget;
use crate::protocol::{Message, Role, env};

/// Extra time granted after `grace` for killed workers to be reaped.
const KILL_SETTLE: Duration = Duration::from_secs(1);

/// Called with the requested code when a worker asks the application to exit.
pub type ExitHandler = Arc<dyn Fn(i32) + Send + Sync>;

/// Inputs of the actor.
pub(crate) enum Command {
    Restart { reply: oneshot::Sender<Transition> },
    Snapshot { reply: oneshot::Sender<Snapshot> },
    Destroy { reply: oneshot::Sender<()> },
    Message { id: WorkerId, msg: Message },
    Exited { id: WorkerId, status: ExitStatus },
    Recover { generation: u64 },
}

enum Flow {
    Continue,
    Stop,
}

struct InFlight {
    worker: WorkerId,
    transition: Transition,
    completer: Completer,
}

pub(crate) struct Actor {
    cfg: Config,
    launcher: Arc<dyn Launch>,
    bus: Bus,
    root: CancellationToken,
    commands: mpsc::UnboundedSender<Command>,
    exit_handler: ExitHandler,

    next_id: u64,
    active: Option<WorkerProcess>,
    pending: Option<WorkerProcess>,
    retiring: HashMap<WorkerId, WorkerProcess>,
    in_flight: Option<InFlight>,
    awaiting_retirement: Option<WorkerId>,

    recovery: RecoveryBudget,
    auto_recover: bool,
    recovery_generation: u64,
    scheduled_recovery: Option<u64>,
    destroyed: bool,
    destroy_waiters: Vec<oneshot::Sender<()>>,
}

impl Actor {
    pub(crate) fn new(
        cfg: Config,
        launcher: Arc<dyn Launch>,
        bus: Bus,
        root: CancellationToken,
        commands: mpsc::UnboundedSender<Command>,
        exit_handler: ExitHandler,
    ) -> Self {
        let recovery = RecoveryBudget::new(cfg.recovery);
        Self {
            cfg,
            launcher,
            bus,
            root,
            commands,
            exit_handler,
            next_id: 1,
            active: None,
            pending: None,
            retiring: HashMap::new(),
            in_flight: None,
            awaiting_retirement: None,
            recovery,
            auto_recover: true,
            recovery_generation: 0,
            scheduled_recovery: None,
            destroyed: false,
            destroy_waiters: Vec::new(),
        }
    }

    /// Runs until destroyed, asked to exit, or the root token is cancelled.
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let _guard = self.root.clone().drop_guard();
        let root = self.root.clone();

        loop {
            let cmd = tokio::select! {
                biased;
                _ = root.cancelled() => None,
                cmd = rx.recv() => cmd,
            };
            let Some(cmd) = cmd else {
                self.teardown("dropped", &mut rx).await;
                break;
            };
            if let Flow::Stop = self.handle(cmd, &mut rx).await {
                break;
            }
        }
        tracing::debug!("orchestrator actor stopped");
    }

    async fn handle(
        &mut self,
        cmd: Command,
        rx: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Flow {
        match cmd {
            Command::Restart { reply } => {
                let _ = reply.send(self.restart());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Destroy { reply } => {
                self.destroy_waiters.push(reply);
                self.teardown("destroyed", rx).await;
                return Flow::Stop;
            }
            Command::Message { id, msg } => return self.on_message(id, msg, rx).await,
            Command::Exited { id, status } => self.on_exit(id, status),
            Command::Recover { generation } => {
                if self.scheduled_recovery == Some(generation) {
                    self.scheduled_recovery = None;
                    if self.auto_recover {
                        let _ = self.restart();
                    }
                }
            }
        }
        Flow::Continue
    }

    // ---- restart ----

    fn restart(&mut self) -> Transition {
        if self.destroyed {
            return Transition::ready(Err(TransitionError::Destroyed));
        }
        if let Some(in_flight) = &self.in_flight {
            return in_flight.transition.clone();
        }
        self.scheduled_recovery = None;

        let role = if self.active.is_some() {
            Role::Recurring
        } else {
            Role::Initial
        };
        let markers = env::worker_env(role, self.worker_ipc_timeout());

        let spawned = match self.launcher.launch(&self.cfg.launch, &markers) {
            Ok(spawned) => spawned,
            Err(err) => {
                tracing::warn!(error = %err, label = err.as_label(), "worker launch failed");
                self.bus
                    .publish(Event::new(EventKind::Error).with_reason(err.to_string()));
                return Transition::ready(Err(err.into()));
            }
        };

        let id = WorkerId::new(self.next_id);
        self.next_id += 1;
        let info = WorkerInfo {
            id,
            pid: spawned.pid,
            role,
        };
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let stop = self.root.child_token();
        Link {
            id,
            spawned,
            outbox: outbox_rx,
            stop: stop.clone(),
            grace: self.cfg.grace,
            commands: self.commands.clone(),
        }
        .spawn();

        tracing::debug!(worker = %id, pid = info.pid, role = role.as_str(), "worker spawned");
        self.bus
            .publish(Event::new(EventKind::WorkerSpawned).with_worker(&info));
        self.pending = Some(WorkerProcess::new(info, outbox_tx, stop));

        let (completer, transition) = Transition::pending();
        self.in_flight = Some(InFlight {
            worker: id,
            transition: transition.clone(),
            completer,
        });
        transition
    }

    /// Handshake timeout handed to a new worker.
    ///
    /// With `RetireThenPromote`, `serve` also waits for the old worker to exit,
    /// which takes at most `grace` plus the kill.
    fn worker_ipc_timeout(&self) -> Duration {
        match self.cfg.handoff {
            HandoffMode::PromoteThenRetire => self.cfg.ipc_timeout,
            HandoffMode::RetireThenPromote => self.cfg.ipc_timeout + self.cfg.grace + KILL_SETTLE,
        }
    }

    // ---- worker frames ----

    async fn on_message(
        &mut self,
        id: WorkerId,
        msg: Message,
        rx: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Flow {
        match msg {
            Message::Ready => self.on_ready(id),
            Message::Restart => {
                let Some(active) = self.active.as_ref().filter(|w| w.id() == id) else {
                    tracing::debug!(worker = %id, "ignoring restart request from inactive worker");
                    return Flow::Continue;
                };
                self.bus
                    .publish(Event::new(EventKind::RestartRequested).with_worker(active.info()));
                let _ = self.restart();
            }
            Message::Exit { code } => {
                let Some(info) = self.current(id).map(|w| w.info().clone()) else {
                    tracing::debug!(worker = %id, "ignoring exit request from retired worker");
                    return Flow::Continue;
                };
                self.auto_recover = false;
                self.bus.publish(
                    Event::new(EventKind::ExitRequested)
                        .with_worker(&info)
                        .with_code(code),
                );
                self.teardown("exit-requested", rx).await;
                (self.exit_handler)(code);
                return Flow::Stop;
            }
            // Dropped by the link.
            Message::Serve => {}
        }
        Flow::Continue
    }

    fn on_ready(&mut self, id: WorkerId) {
        if self.pending.as_ref().map(WorkerProcess::id) != Some(id) {
            tracing::debug!(worker = %id, "ignoring ready from non-pending worker");
            return;
        }
        if self.awaiting_retirement.is_some() {
            tracing::debug!(worker = %id, "ignoring duplicate ready");
            return;
        }

        match (self.cfg.handoff, self.active.take()) {
            (_, None) => self.promote(),
            (HandoffMode::PromoteThenRetire, Some(old)) => {
                self.retire(old, "replaced");
                self.promote();
            }
            (HandoffMode::RetireThenPromote, Some(old)) => {
                self.awaiting_retirement = Some(old.id());
                self.retire(old, "replaced");
            }
        }
    }

    fn promote(&mut self) {
        let Some(mut worker) = self.pending.take() else {
            return;
        };
        worker.advance(Lifecycle::Active);
        worker.send(Message::Serve);

        let info = worker.info().clone();
        tracing::debug!(worker = %info.id, pid = info.pid, "worker promoted");
        self.bus
            .publish(Event::new(EventKind::WorkerActive).with_worker(&info));
        if let Some(in_flight) = self.take_in_flight(info.id) {
            in_flight.completer.resolve(Ok(info));
        }
        self.active = Some(worker);
    }

    fn retire(&mut self, mut worker: WorkerProcess, reason: &'static str) {
        if worker.retire() {
            self.bus.publish(
                Event::new(EventKind::WorkerRetiring)
                    .with_worker(worker.info())
                    .with_reason(reason),
            );
        }
        self.retiring.insert(worker.id(), worker);
    }

    /// The active or pending worker with this id.
    fn current(&self, id: WorkerId) -> Option<&WorkerProcess> {
        self.active
            .iter()
            .chain(self.pending.iter())
            .find(|w| w.id() == id)
    }

    // ---- exits ----

    fn on_exit(&mut self, id: WorkerId, status: ExitStatus) {
        let was_pending = self.pending.as_ref().is_some_and(|w| w.id() == id);
        let (worker, mattered) = if self.active.as_ref().is_some_and(|w| w.id() == id) {
            (self.active.take(), true)
        } else if was_pending {
            (self.pending.take(), true)
        } else {
            (self.retiring.remove(&id), false)
        };
        let Some(mut worker) = worker else {
            tracing::debug!(worker = %id, "exit of untracked worker");
            return;
        };
        worker.advance(Lifecycle::Exited);
        let info = worker.info().clone();
        self.bus.publish(
            Event::new(EventKind::WorkerExited)
                .with_worker(&info)
                .with_exit(status),
        );

        if let Some(in_flight) = self.take_in_flight(id) {
            let err = TransitionError::WorkerExited {
                pid: info.pid,
                code: status.code,
            };
            self.bus.publish(
                Event::new(EventKind::Error)
                    .with_worker(&info)
                    .with_reason(err.to_string()),
            );
            in_flight.completer.resolve(Err(err));
        }

        if was_pending {
            // The old worker keeps retiring; nobody is waiting to take over.
            self.awaiting_retirement = None;
        } else if self.awaiting_retirement == Some(id) {
            self.awaiting_retirement = None;
            self.promote();
        }

        if mattered && self.auto_recover {
            self.recover();
        }
    }

    fn take_in_flight(&mut self, worker: WorkerId) -> Option<InFlight> {
        match &self.in_flight {
            Some(f) if f.worker == worker => self.in_flight.take(),
            _ => None,
        }
    }

    // ---- recovery ----

    fn recover(&mut self) {
        if self.in_flight.is_some() {
            // A replacement is already negotiating.
            self.bus.publish(
                Event::new(EventKind::Recover)
                    .with_remaining(self.recovery.remaining())
                    .with_reason(RECOVER_IN_FLIGHT),
            );
            return;
        }

        let Some(granted) = self.recovery.try_consume(Instant::now()) else {
            tracing::warn!("recovery budget exhausted, not relaunching");
            self.bus.publish(
                Event::new(EventKind::Recover)
                    .with_remaining(0)
                    .with_reason(RECOVER_EXHAUSTED),
            );
            return;
        };

        tracing::debug!(
            attempt = granted.attempt,
            remaining = granted.remaining,
            delay = ?granted.delay,
            "recovering worker"
        );
        self.bus.publish(
            Event::new(EventKind::Recover)
                .with_remaining(granted.remaining)
                .with_delay(granted.delay),
        );
        if granted.delay.is_zero() {
            let _ = self.restart();
        } else {
            self.schedule_recovery(granted.delay);
        }
    }

    fn schedule_recovery(&mut self, delay: Duration) {
        self.recovery_generation += 1;
        let generation = self.recovery_generation;
        self.scheduled_recovery = Some(generation);

        let commands = self.commands.clone();
        let root = self.root.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = root.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = commands.send(Command::Recover { generation });
                }
            }
        });
    }

    // ---- snapshot / teardown ----

    fn snapshot(&self) -> Snapshot {
        let phase = if self.destroyed {
            Phase::Destroyed
        } else if self.in_flight.is_some() {
            Phase::AwaitingHandoff
        } else if self.active.is_some() {
            Phase::Steady
        } else {
            Phase::Idle
        };
        Snapshot {
            phase,
            active: self.active.as_ref().map(|w| w.info().clone()),
            pending: self.pending.as_ref().map(|w| w.info().clone()),
            retiring: self.retiring.len(),
            recovery_remaining: self.recovery.remaining(),
        }
    }

    async fn teardown(
        &mut self,
        reason: &'static str,
        rx: &mut mpsc::UnboundedReceiver<Command>,
    ) {
        self.auto_recover = false;
        self.destroyed = true;
        self.scheduled_recovery = None;
        self.awaiting_retirement = None;
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.completer.resolve(Err(TransitionError::Destroyed));
        }
        for worker in self.active.take().into_iter().chain(self.pending.take()) {
            self.retire(worker, reason);
        }
        self.root.cancel();

        let deadline = self.cfg.grace + KILL_SETTLE;
        let drained = tokio::time::timeout(deadline, async {
            while !self.retiring.is_empty() {
                match rx.recv().await {
                    Some(cmd) => self.handle_stopping(cmd),
                    None => break,
                }
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                remaining = self.retiring.len(),
                ?deadline,
                "workers still running after teardown"
            );
        }

        tracing::debug!(reason, "orchestrator torn down");
        self.bus.publish(Event::new(EventKind::Destroyed));
        for waiter in self.destroy_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    /// Commands arriving while workers are being torn down.
    fn handle_stopping(&mut self, cmd: Command) {
        match cmd {
            Command::Exited { id, status } => self.on_exit(id, status),
            Command::Restart { reply } => {
                let _ = reply.send(Transition::ready(Err(TransitionError::Destroyed)));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Destroy { reply } => self.destroy_waiters.push(reply),
            Command::Message { .. } | Command::Recover { .. } => {}
        }
    }
}
