//! # Automatic recovery budget.
//!
//! When the active or pending worker crashes, the orchestrator relaunches it on
//! its own, but only a limited number of times: [`RecoveryPolicy::max_attempts`].
//! Each recovery restart consumes one attempt and is delayed according to
//! [`RecoveryPolicy::backoff`].
//!
//! With a [`RecoveryPolicy::reset_window`], a crash that happens at least that
//! long after the previous recovery restart finds the budget full again. A
//! worker that crashes once a day is recovered forever; a crash loop burns
//! through the budget and stops.
//!
//! ```text
//! crash ──► try_consume(now)
//!             ├─ now - last >= reset_window ─► remaining = max_attempts
//!             ├─ remaining == 0 ─────────────► None (give up, recover(0))
//!             └─ remaining -= 1 ─────────────► Some(Recovery { attempt, remaining, delay })
//! ```

use std::time::Duration;

use tokio::time::Instant;

use crate::policies::BackoffPolicy;

/// Limits on automatic recovery.
#[derive(Clone, Copy, Debug)]
pub struct RecoveryPolicy {
    /// Recovery restarts allowed before giving up (default 3).
    pub max_attempts: u32,
    /// Quiet period after which the budget is replenished; `None` never replenishes.
    pub reset_window: Option<Duration>,
    /// Delay before each recovery restart.
    pub backoff: BackoffPolicy,
}

impl Default for RecoveryPolicy {
    /// Three attempts, a 60s reset window and [`BackoffPolicy::default`].
    fn default() -> Self {
        Self {
            max_attempts: 3,
            reset_window: Some(Duration::from_secs(60)),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RecoveryPolicy {
    /// Never recovers crashed workers.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

/// One granted recovery restart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Recovery {
    /// 0-indexed attempt within the current budget.
    pub attempt: u32,
    /// Attempts left after this one.
    pub remaining: u32,
    /// How long to wait before relaunching.
    pub delay: Duration,
}

/// Mutable bookkeeping for a [`RecoveryPolicy`].
#[derive(Debug)]
pub struct RecoveryBudget {
    policy: RecoveryPolicy,
    remaining: u32,
    last: Option<Instant>,
}

impl RecoveryBudget {
    /// Creates a full budget.
    pub fn new(policy: RecoveryPolicy) -> Self {
        Self {
            remaining: policy.max_attempts,
            policy,
            last: None,
        }
    }

    /// Attempts left right now.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Consumes one attempt, replenishing first if the reset window elapsed.
    ///
    /// Returns `None` once the budget is exhausted.
    pub fn try_consume(&mut self, now: Instant) -> Option<Recovery> {
        if let (Some(window), Some(last)) = (self.policy.reset_window, self.last) {
            if now.saturating_duration_since(last) >= window {
                self.remaining = self.policy.max_attempts;
            }
        }
        if self.remaining == 0 {
            return None;
        }

        let attempt = self.policy.max_attempts - self.remaining;
        self.remaining -= 1;
        self.last = Some(now);
        Some(Recovery {
            attempt,
            remaining: self.remaining,
            delay: self.policy.backoff.next(attempt),
        })
    }
}
