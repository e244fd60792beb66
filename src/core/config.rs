//! # Orchestrator configuration.
//!
//! Provides [`Config`], the settings of one orchestrator, and [`HandoffMode`],
//! the ordering of promotion and retirement during a hand-off.
//!
//! Config is consumed by `Orchestrator::builder(config)`. Worker processes do not
//! read it: the parts they need (role, handshake timeout, channel descriptor)
//! travel through environment markers.

use std::time::Duration;

use crate::error::LaunchError;
use crate::launch::LaunchSpec;
use crate::policies::RecoveryPolicy;
use crate::protocol::env::DEFAULT_IPC_TIMEOUT;

/// Ordering of promotion and retirement when a replacement reports `ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandoffMode {
    /// Promote the new worker immediately, then signal the old one.
    ///
    /// Minimizes downtime; both workers briefly run at the same time.
    #[default]
    PromoteThenRetire,
    /// Signal the old worker and promote the new one only after the old one exited.
    ///
    /// No overlap; the gap lasts as long as the old worker takes to stop.
    RetireThenPromote,
}

/// Settings of one orchestrator.
///
/// ## Field semantics
/// - `launch`: what every worker runs
/// - `ipc_timeout`: how long a recurring worker waits for `serve` (passed to workers)
/// - `grace`: time between SIGTERM and SIGKILL for every terminated worker
/// - `handoff`: see [`HandoffMode`]
/// - `recovery`: automatic relaunch after unexpected exits
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
#[derive(Clone, Debug)]
pub struct Config {
    /// Worker command.
    pub launch: LaunchSpec,

    /// Handshake timeout handed to recurring workers.
    ///
    /// With [`HandoffMode::RetireThenPromote`] workers receive
    /// `ipc_timeout + grace + 1s`, since `serve` follows the old worker's exit.
    pub ipc_timeout: Duration,

    /// Maximum time a terminated worker gets before it is killed.
    ///
    /// `destroy()` waits at most about this long for all workers to exit.
    pub grace: Duration,

    /// Hand-off ordering.
    pub handoff: HandoffMode,

    /// Automatic recovery budget and delays.
    pub recovery: RecoveryPolicy,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Receivers that lag behind more than `bus_capacity` events observe
    /// `Lagged` and skip older items.
    pub bus_capacity: usize,
}

impl Config {
    /// Default configuration for the given worker command:
    ///
    /// - `ipc_timeout = 5000ms`
    /// - `grace = 5s`
    /// - `handoff = PromoteThenRetire`
    /// - `recovery = RecoveryPolicy::default()` (3 attempts, 60s reset window)
    /// - `bus_capacity = 1024`
    pub fn new(launch: LaunchSpec) -> Self {
        Self {
            launch,
            ipc_timeout: DEFAULT_IPC_TIMEOUT,
            grace: Duration::from_secs(5),
            handoff: HandoffMode::default(),
            recovery: RecoveryPolicy::default(),
            bus_capacity: 1024,
        }
    }

    /// Default configuration re-running the current executable as the worker.
    pub fn current_exe() -> Result<Self, LaunchError> {
        Ok(Self::new(LaunchSpec::current_exe()?))
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}
