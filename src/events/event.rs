//! # Lifecycle events emitted by the orchestrator.
//!
//! The [`EventKind`] enum classifies events across three categories:
//! - **Worker events**: one worker's lifecycle (spawned, active, retiring, exited)
//! - **Orchestration events**: decisions of the orchestrator (recover, restart/exit
//!   requests, errors, destroyed)
//! - **Subscriber events**: delivery problems of the fan-out layer
//!
//! The [`Event`] struct carries the metadata: worker identity, exit status,
//! remaining recovery budget, delays and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use handover::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::Recover)
//!     .with_remaining(2)
//!     .with_delay(Duration::from_millis(200));
//!
//! assert_eq!(ev.kind, EventKind::Recover);
//! assert_eq!(ev.remaining, Some(2));
//! assert_eq!(ev.delay_ms, Some(200));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::core::WorkerInfo;
use crate::launch::ExitStatus;
use crate::protocol::Role;

/// `Recover` reason: a replacement is already negotiating, nothing was consumed.
pub const RECOVER_IN_FLIGHT: &str = "in-flight";
/// `Recover` reason: the budget is spent, no relaunch follows.
pub const RECOVER_EXHAUSTED: &str = "exhausted";

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of orchestrator events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `subscriber`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `subscriber`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Worker events ===
    /// A worker process was launched and is negotiating the hand-off.
    ///
    /// Sets: `worker`, `pid`, `role`
    WorkerSpawned,

    /// A worker became the active worker (`serve` was sent).
    ///
    /// Sets: `worker`, `pid`, `role`
    WorkerActive,

    /// A worker was told to terminate.
    ///
    /// Sets: `worker`, `pid`, `role`, `reason` (`"replaced"`, `"exit-requested"`,
    /// `"destroyed"`, `"dropped"`)
    WorkerRetiring,

    /// A worker process exited.
    ///
    /// Sets: `worker`, `pid`, `role`, `code` and/or `signal`
    WorkerExited,

    // === Orchestration events ===
    /// Automatic recovery was considered after the active or pending worker died.
    ///
    /// Sets:
    /// - `remaining`: attempts left (0 when the budget is spent)
    /// - `delay_ms`: delay before the relaunch (only when one was scheduled)
    /// - `reason`: [`RECOVER_IN_FLIGHT`] when a replacement is already
    ///   negotiating, [`RECOVER_EXHAUSTED`] when no attempt is left
    Recover,

    /// The active worker asked for a new hand-off.
    ///
    /// Sets: `worker`, `pid`, `role`
    RestartRequested,

    /// A worker asked the whole supervisor to exit.
    ///
    /// Sets: `worker`, `pid`, `role`, `code`
    ExitRequested,

    /// A hand-off failed or a worker misbehaved.
    ///
    /// Sets: `reason`, optionally `worker`/`pid`/`role`
    Error,

    /// The orchestrator was destroyed; no further events follow.
    Destroyed,
}

/// Orchestrator event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Orchestrator-local worker id.
    pub worker: Option<u64>,
    /// OS process id of the worker.
    pub pid: Option<u32>,
    /// Role the worker was spawned with.
    pub role: Option<Role>,
    /// Exit code (worker exit or requested supervisor exit).
    pub code: Option<i32>,
    /// Terminating signal of the worker.
    pub signal: Option<i32>,
    /// Recovery attempts left.
    pub remaining: Option<u32>,
    /// Delay before a scheduled relaunch in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Name of the subscriber, for subscriber events.
    pub subscriber: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            pid: None,
            role: None,
            code: None,
            signal: None,
            remaining: None,
            delay_ms: None,
            reason: None,
            subscriber: None,
        }
    }

    /// Attaches a worker's identity.
    #[inline]
    pub fn with_worker(mut self, info: &WorkerInfo) -> Self {
        self.worker = Some(info.id.get());
        self.pid = Some(info.pid);
        self.role = Some(info.role);
        self
    }

    /// Attaches how a worker ended.
    #[inline]
    pub fn with_exit(mut self, status: ExitStatus) -> Self {
        self.code = status.code;
        self.signal = status.signal;
        self
    }

    /// Attaches an exit code.
    #[inline]
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Attaches the remaining recovery budget.
    #[inline]
    pub fn with_remaining(mut self, remaining: u32) -> Self {
        self.remaining = Some(remaining);
        self
    }

    /// Attaches a relaunch delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut ev = Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"));
        ev.subscriber = Some(subscriber.into());
        ev
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::SubscriberPanicked).with_reason(info);
        ev.subscriber = Some(subscriber.into());
        ev
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}
