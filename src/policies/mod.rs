//! Recovery policies.
//!
//! This module groups the knobs that control **whether** a crashed worker is
//! relaunched automatically and **how long** to wait before doing so.
//!
//! ## Contents
//! - [`RecoveryPolicy`] attempt budget with a reset window
//! - [`RecoveryBudget`] the orchestrator's running count of attempts
//! - [`BackoffPolicy`] how recovery delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization of those delays
//!
//! ## Quick wiring
//! ```text
//! Config { recovery: RecoveryPolicy { max_attempts, reset_window, backoff } }
//!      └─► core::actor keeps a RecoveryBudget and on every relevant crash:
//!           - try_consume(now) to decide recover / give up
//!           - schedules restart() after Recovery::delay
//! ```
//!
//! ## Defaults
//! - `RecoveryPolicy::default()` → 3 attempts, 60s reset window.
//! - `BackoffPolicy::default()` → first=100ms, factor=2.0, max=5s, jitter=None.

mod backoff;
mod jitter;
mod recovery;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use recovery::{Recovery, RecoveryBudget, RecoveryPolicy};
