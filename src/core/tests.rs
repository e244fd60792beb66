//! Orchestrator scenarios driven through the in-memory launcher.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use crate::core::{Config, HandoffMode, Orchestrator, Phase, WorkerInfo};
use crate::error::TransitionError;
use crate::events::{Event, EventKind, RECOVER_EXHAUSTED, RECOVER_IN_FLIGHT};
use crate::launch::LaunchSpec;
use crate::launch::testing::{FakeLauncher, FakeWorker, FakeWorkers};
use crate::policies::{BackoffPolicy, RecoveryPolicy};
use crate::protocol::{Message, Role};
use crate::subscribers::Subscribe;

const WAIT: Duration = Duration::from_secs(5);

struct Rig {
    orch: Orchestrator,
    workers: FakeWorkers,
    events: broadcast::Receiver<Event>,
    exits: mpsc::UnboundedReceiver<i32>,
}

fn config() -> Config {
    let mut cfg = Config::new(LaunchSpec::new("worker"));
    cfg.grace = Duration::from_secs(1);
    cfg.recovery = RecoveryPolicy {
        max_attempts: 3,
        reset_window: None,
        backoff: BackoffPolicy::immediate(),
    };
    cfg
}

fn rig(cfg: Config) -> Rig {
    let (launcher, workers) = FakeLauncher::new();
    let (exit_tx, exits) = mpsc::unbounded_channel();
    let orch = Orchestrator::builder(cfg)
        .with_launcher(launcher)
        .with_exit_handler(move |code| {
            let _ = exit_tx.send(code);
        })
        .build();
    let events = orch.subscribe();
    Rig {
        orch,
        workers,
        events,
        exits,
    }
}

/// Starts the first worker and completes its hand-off.
async fn boot(rig: &mut Rig) -> (FakeWorker, WorkerInfo) {
    let transition = rig.orch.restart();
    let mut worker = rig.workers.next_worker().await;
    worker.send(Message::Ready).await;
    let info = transition.await.unwrap();
    assert_eq!(worker.recv().await, Some(Message::Serve));
    (worker, info)
}

/// Collects events up to and including the first one of `kind`.
async fn events_until(events: &mut broadcast::Receiver<Event>, kind: EventKind) -> Vec<Event> {
    tokio::time::timeout(WAIT, async {
        let mut seen = Vec::new();
        loop {
            let ev = events.recv().await.unwrap();
            let done = ev.kind == kind;
            seen.push(ev);
            if done {
                return seen;
            }
        }
    })
    .await
    .expect("event not observed")
}

async fn next_event(events: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
    events_until(events, kind).await.pop().unwrap()
}

fn kinds(events: &[Event]) -> Vec<EventKind> {
    events.iter().map(|e| e.kind).collect()
}

#[tokio::test]
async fn initial_worker_is_promoted_on_ready() {
    let mut rig = rig(config());

    let transition = rig.orch.restart();
    let mut worker = rig.workers.next_worker().await;
    assert_eq!(worker.role, Role::Initial);
    assert_eq!(rig.orch.snapshot().await.phase, Phase::AwaitingHandoff);

    worker.send(Message::Ready).await;
    let info = transition.await.unwrap();
    assert_eq!(info.pid, worker.pid);
    assert_eq!(info.role, Role::Initial);
    assert_eq!(worker.recv().await, Some(Message::Serve));

    let snap = rig.orch.snapshot().await;
    assert_eq!(snap.phase, Phase::Steady);
    assert_eq!(snap.active, Some(info));
    assert_eq!(snap.pending, None);
    assert_eq!(snap.recovery_remaining, 3);

    let seen = events_until(&mut rig.events, EventKind::WorkerActive).await;
    assert_eq!(kinds(&seen), vec![EventKind::WorkerSpawned, EventKind::WorkerActive]);
}

#[tokio::test]
async fn handoff_promotes_new_worker_then_retires_old() {
    let mut rig = rig(config());
    let (old, _) = boot(&mut rig).await;

    let transition = rig.orch.restart();
    let mut new = rig.workers.next_worker().await;
    assert_eq!(new.role, Role::Recurring);
    assert_eq!(new.ipc_timeout, Duration::from_millis(5000));
    assert!(!old.was_terminated());

    new.send(Message::Ready).await;
    let info = transition.await.unwrap();
    assert_eq!(info.pid, new.pid);
    assert_eq!(new.recv().await, Some(Message::Serve));

    let seen = loop {
        let seen = events_until(&mut rig.events, EventKind::WorkerExited).await;
        if seen.last().unwrap().pid == Some(old.pid) {
            break seen;
        }
    };
    assert!(old.was_terminated());
    let activated = seen
        .iter()
        .position(|e| e.kind == EventKind::WorkerActive && e.pid == Some(new.pid))
        .expect("new worker activated");
    assert!(activated < seen.len() - 1);

    let snap = rig.orch.snapshot().await;
    assert_eq!(snap.phase, Phase::Steady);
    assert_eq!(snap.active.map(|w| w.pid), Some(new.pid));
    assert_eq!(snap.retiring, 0);
    assert_eq!(snap.recovery_remaining, 3);
}

#[tokio::test]
async fn concurrent_restarts_share_one_transition() {
    let mut rig = rig(config());
    boot(&mut rig).await;

    let a = rig.orch.restart();
    let b = rig.orch.restart();
    let mut worker = rig.workers.next_worker().await;
    worker.send(Message::Ready).await;

    let (a, b) = tokio::join!(a, b);
    assert_eq!(a.unwrap().pid, worker.pid);
    assert_eq!(b.unwrap().pid, worker.pid);
    assert_eq!(rig.workers.launched(), 2);
    assert!(rig.workers.try_next_worker().is_none());
}

#[tokio::test]
async fn crash_loop_stops_after_budget() {
    let mut rig = rig(config());

    let first = rig.orch.restart();
    let worker = rig.workers.next_worker().await;
    worker.crash(1);
    assert_eq!(
        first.await,
        Err(TransitionError::WorkerExited {
            pid: worker.pid,
            code: Some(1)
        })
    );

    for _ in 0..3 {
        let worker = rig.workers.next_worker().await;
        assert_eq!(worker.role, Role::Initial);
        worker.crash(1);
    }

    let mut recovers = Vec::new();
    for _ in 0..4 {
        recovers.push(next_event(&mut rig.events, EventKind::Recover).await);
    }
    let remaining: Vec<_> = recovers.iter().map(|e| e.remaining).collect();
    assert_eq!(remaining, vec![Some(2), Some(1), Some(0), Some(0)]);
    assert_eq!(recovers[3].reason.as_deref(), Some(RECOVER_EXHAUSTED));
    assert_eq!(recovers[2].reason, None);

    let snap = rig.orch.snapshot().await;
    assert_eq!(snap.phase, Phase::Idle);
    assert_eq!(snap.recovery_remaining, 0);
    assert_eq!(rig.workers.launched(), 4);
    assert!(rig.workers.try_next_worker().is_none());
}

#[tokio::test]
async fn active_crash_is_recovered() {
    let mut rig = rig(config());
    let (worker, _) = boot(&mut rig).await;

    worker.crash(2);
    let exited = next_event(&mut rig.events, EventKind::WorkerExited).await;
    assert_eq!(exited.code, Some(2));
    assert_eq!(next_event(&mut rig.events, EventKind::Recover).await.remaining, Some(2));

    let mut replacement = rig.workers.next_worker().await;
    assert_eq!(replacement.role, Role::Initial);
    replacement.send(Message::Ready).await;
    assert_eq!(replacement.recv().await, Some(Message::Serve));

    let snap = rig.orch.snapshot().await;
    assert_eq!(snap.phase, Phase::Steady);
    assert_eq!(snap.active.map(|w| w.pid), Some(replacement.pid));
    assert_eq!(snap.recovery_remaining, 2);
}

#[tokio::test]
async fn pending_crash_keeps_active_and_retries_as_recurring() {
    let mut rig = rig(config());
    let (active, info) = boot(&mut rig).await;

    let transition = rig.orch.restart();
    let pending = rig.workers.next_worker().await;
    pending.crash(3);
    assert_eq!(
        transition.await,
        Err(TransitionError::WorkerExited {
            pid: pending.pid,
            code: Some(3)
        })
    );

    let retry = rig.workers.next_worker().await;
    assert_eq!(retry.role, Role::Recurring);
    assert!(!active.was_terminated());

    let snap = rig.orch.snapshot().await;
    assert_eq!(snap.active, Some(info));
    assert_eq!(snap.pending.map(|w| w.pid), Some(retry.pid));
}

#[tokio::test]
async fn exit_request_tears_down_and_calls_handler() {
    let mut rig = rig(config());
    let (mut active, _) = boot(&mut rig).await;
    let transition = rig.orch.restart();
    let pending = rig.workers.next_worker().await;

    active.send(Message::Exit { code: 7 }).await;

    let code = tokio::time::timeout(WAIT, rig.exits.recv()).await.unwrap();
    assert_eq!(code, Some(7));
    assert!(active.was_terminated());
    assert!(pending.was_terminated());
    assert_eq!(transition.await, Err(TransitionError::Destroyed));

    let seen = events_until(&mut rig.events, EventKind::Destroyed).await;
    let requested = seen
        .iter()
        .find(|e| e.kind == EventKind::ExitRequested)
        .expect("exit request reported");
    assert_eq!(requested.code, Some(7));
    assert_eq!(requested.pid, Some(active.pid));
    assert!(!seen.iter().any(|e| e.kind == EventKind::Recover));

    assert_eq!(rig.orch.snapshot().await.phase, Phase::Destroyed);
    assert_eq!(rig.orch.restart().await, Err(TransitionError::Destroyed));
}

#[tokio::test]
async fn destroy_terminates_everything_and_rejects_restarts() {
    let mut rig = rig(config());
    let (active, _) = boot(&mut rig).await;
    let transition = rig.orch.restart();
    let pending = rig.workers.next_worker().await;

    rig.orch.destroy().await;

    assert!(active.was_terminated());
    assert!(pending.was_terminated());
    assert!(rig.orch.is_destroyed());
    assert_eq!(transition.await, Err(TransitionError::Destroyed));
    assert_eq!(rig.orch.restart().await, Err(TransitionError::Destroyed));
    assert_eq!(rig.orch.snapshot().await.phase, Phase::Destroyed);

    let seen = events_until(&mut rig.events, EventKind::Destroyed).await;
    let exited = seen
        .iter()
        .filter(|e| e.kind == EventKind::WorkerExited)
        .count();
    assert_eq!(exited, 2);
    assert!(!seen.iter().any(|e| e.kind == EventKind::Recover));

    rig.orch.destroy().await;
}

#[tokio::test]
async fn retire_then_promote_waits_for_old_exit() {
    let mut cfg = config();
    cfg.handoff = HandoffMode::RetireThenPromote;
    let mut rig = rig(cfg);
    rig.workers.hold_exit_on_terminate();
    let (old, _) = boot(&mut rig).await;

    let transition = rig.orch.restart();
    let mut new = rig.workers.next_worker().await;
    new.send(Message::Ready).await;

    let retiring = next_event(&mut rig.events, EventKind::WorkerRetiring).await;
    assert_eq!(retiring.pid, Some(old.pid));
    let snap = rig.orch.snapshot().await;
    assert_eq!(snap.phase, Phase::AwaitingHandoff);
    assert_eq!(snap.active, None);
    assert_eq!(snap.pending.map(|w| w.pid), Some(new.pid));
    assert!(transition.peek().is_none());

    old.exit_by_signal();
    let info = transition.await.unwrap();
    assert_eq!(info.pid, new.pid);
    assert_eq!(new.recv().await, Some(Message::Serve));

    let seen = events_until(&mut rig.events, EventKind::WorkerActive).await;
    assert_eq!(kinds(&seen), vec![EventKind::WorkerExited, EventKind::WorkerActive]);
    assert_eq!(rig.orch.snapshot().await.recovery_remaining, 3);
}

#[tokio::test(start_paused = true)]
async fn retire_then_promote_serves_before_the_worker_gives_up() {
    let mut cfg = Config::new(LaunchSpec::new("worker"));
    cfg.handoff = HandoffMode::RetireThenPromote;
    let mut rig = rig(cfg);
    rig.workers.hold_exit_on_terminate();
    let (old, _) = boot(&mut rig).await;

    let transition = rig.orch.restart();
    let mut new = rig.workers.next_worker().await;
    assert_eq!(new.ipc_timeout, Duration::from_secs(11));

    let start = Instant::now();
    new.send(Message::Ready).await;
    transition.await.unwrap();
    assert_eq!(new.recv().await, Some(Message::Serve));

    let waited = start.elapsed();
    assert!(waited >= Duration::from_secs(5), "served before the grace ran out: {waited:?}");
    assert!(waited < new.ipc_timeout, "served after the worker timed out: {waited:?}");
    assert!(old.was_terminated());
}

#[tokio::test]
async fn active_crash_during_handoff_consumes_nothing() {
    let mut rig = rig(config());
    let (active, _) = boot(&mut rig).await;
    let transition = rig.orch.restart();
    let mut pending = rig.workers.next_worker().await;

    active.crash(1);
    let recover = next_event(&mut rig.events, EventKind::Recover).await;
    assert_eq!(recover.remaining, Some(3));
    assert_eq!(recover.reason.as_deref(), Some(RECOVER_IN_FLIGHT));
    assert_eq!(recover.delay_ms, None);

    pending.send(Message::Ready).await;
    assert_eq!(transition.await.unwrap().pid, pending.pid);
    assert_eq!(rig.workers.launched(), 2);
}

#[tokio::test]
async fn duplicate_ready_is_ignored_and_restart_request_is_honoured() {
    let mut rig = rig(config());

    let transition = rig.orch.restart();
    let mut worker = rig.workers.next_worker().await;
    worker.send(Message::Ready).await;
    worker.send(Message::Ready).await;
    worker.send(Message::Restart).await;
    transition.await.unwrap();

    let replacement = rig.workers.next_worker().await;
    assert_eq!(replacement.role, Role::Recurring);

    let seen = events_until(&mut rig.events, EventKind::RestartRequested).await;
    assert_eq!(
        seen.iter()
            .filter(|e| e.kind == EventKind::WorkerActive)
            .count(),
        1
    );
    assert_eq!(seen.last().unwrap().pid, Some(worker.pid));
    assert_eq!(worker.recv().await, Some(Message::Serve));
}

#[tokio::test]
async fn launch_failure_rejects_transition() {
    let mut rig = rig(config());
    rig.workers.fail_next_launch();

    let err = rig.orch.restart().await.unwrap_err();
    assert!(matches!(err, TransitionError::Launch { .. }));
    assert_eq!(next_event(&mut rig.events, EventKind::Error).await.kind, EventKind::Error);
    assert_eq!(rig.orch.snapshot().await.phase, Phase::Idle);

    boot(&mut rig).await;
    assert_eq!(rig.workers.launched(), 1);
}

#[tokio::test(start_paused = true)]
async fn recovery_waits_for_backoff() {
    let mut cfg = config();
    cfg.recovery.backoff = BackoffPolicy::default();
    let mut rig = rig(cfg);
    let (worker, _) = boot(&mut rig).await;

    worker.crash(1);
    let recover = next_event(&mut rig.events, EventKind::Recover).await;
    assert_eq!(recover.delay_ms, Some(100));
    assert_eq!(rig.orch.snapshot().await.phase, Phase::Idle);

    let replacement = rig.workers.next_worker().await;
    assert_eq!(replacement.role, Role::Initial);
}

#[tokio::test]
async fn dropping_the_last_handle_terminates_workers() {
    let mut rig = rig(config());
    let (worker, _) = boot(&mut rig).await;
    let mut events = rig.orch.subscribe();

    drop(rig.orch);
    next_event(&mut events, EventKind::Destroyed).await;
    assert!(worker.was_terminated());
}

#[derive(Default)]
struct Recorder {
    kinds: Mutex<Vec<EventKind>>,
}

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, ev: &Event) {
        self.kinds.lock().unwrap().push(ev.kind);
    }
}

#[tokio::test]
async fn subscribers_receive_lifecycle_events() {
    let recorder = Arc::new(Recorder::default());
    let (launcher, mut workers) = FakeLauncher::new();
    let orch = Orchestrator::builder(config())
        .with_launcher(launcher)
        .with_subscribers(vec![recorder.clone() as Arc<dyn Subscribe>])
        .build();
    let mut events = orch.subscribe();

    let transition = orch.restart();
    let mut worker = workers.next_worker().await;
    worker.send(Message::Ready).await;
    transition.await.unwrap();
    orch.destroy().await;
    next_event(&mut events, EventKind::Destroyed).await;

    tokio::time::timeout(WAIT, async {
        while recorder.kinds.lock().unwrap().last() != Some(&EventKind::Destroyed) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let kinds = recorder.kinds.lock().unwrap().clone();
    assert_eq!(kinds.first(), Some(&EventKind::WorkerSpawned));
    assert!(kinds.contains(&EventKind::WorkerActive));
    assert!(kinds.contains(&EventKind::WorkerExited));
}
