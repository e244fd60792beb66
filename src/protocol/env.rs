//! # Environment markers.
//!
//! The orchestrator tells each worker who it is through environment variables:
//!
//! | Variable               | Meaning                                           |
//! |------------------------|---------------------------------------------------|
//! | [`INITIAL_MARKER`]     | `initial` role: no previous worker to wait behind |
//! | [`RECURRING_MARKER`]   | `recurring` role: replacing an active worker      |
//! | [`IPC_TIMEOUT_VAR`]    | handshake timeout in milliseconds                 |
//! | [`CHANNEL_FD_VAR`]     | inherited control-socket descriptor               |
//!
//! Exactly one role marker is set on a worker; neither is set on the supervisor.
//! Lookups take a closure so they can be exercised without touching the
//! process environment.

use std::time::Duration;

/// Marker present on workers spawned without a predecessor.
pub const INITIAL_MARKER: &str = "HANDOVER_INITIAL";
/// Marker present on workers spawned to replace an active worker.
pub const RECURRING_MARKER: &str = "HANDOVER_RECURRING";
/// Handshake timeout in milliseconds, as a decimal string.
pub const IPC_TIMEOUT_VAR: &str = "HANDOVER_IPC_TIMEOUT";
/// Descriptor number of the inherited control socket.
pub const CHANNEL_FD_VAR: &str = "HANDOVER_CHANNEL_FD";

/// Default handshake timeout (5000 ms).
pub const DEFAULT_IPC_TIMEOUT: Duration = Duration::from_millis(5000);

/// Role of a spawned worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// No worker was active when this one was spawned; it is promoted as soon
    /// as it reports ready.
    Initial,
    /// Spawned to replace an active worker; must wait for `serve`.
    Recurring,
}

impl Role {
    /// Environment variable carrying this role.
    pub fn marker(self) -> &'static str {
        match self {
            Role::Initial => INITIAL_MARKER,
            Role::Recurring => RECURRING_MARKER,
        }
    }

    /// Short stable name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Initial => "initial",
            Role::Recurring => "recurring",
        }
    }

    /// Detects the role of the current process; `None` on the supervisor.
    pub fn detect() -> Option<Role> {
        Self::detect_with(|key| std::env::var(key).ok())
    }

    /// Detects a role through an arbitrary variable lookup.
    ///
    /// A marker counts as present when set to a non-empty value. Should both be
    /// present the stricter `Recurring` wins, so the worker never serves early.
    pub fn detect_with<F>(lookup: F) -> Option<Role>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).is_some_and(|v| !v.is_empty());
        if present(RECURRING_MARKER) {
            Some(Role::Recurring)
        } else if present(INITIAL_MARKER) {
            Some(Role::Initial)
        } else {
            None
        }
    }
}

/// Returns `true` iff this process was not spawned by an orchestrator.
pub fn is_supervisor() -> bool {
    Role::detect().is_none()
}

/// Reads the handshake timeout of the current process.
pub fn ipc_timeout() -> Duration {
    ipc_timeout_with(|key| std::env::var(key).ok())
}

/// Reads the handshake timeout through an arbitrary variable lookup.
///
/// Missing or unparsable values fall back to [`DEFAULT_IPC_TIMEOUT`].
pub fn ipc_timeout_with<F>(lookup: F) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(IPC_TIMEOUT_VAR)
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_IPC_TIMEOUT)
}

/// Builds the marker variables for a worker of `role`.
pub fn worker_env(role: Role, ipc_timeout: Duration) -> Vec<(String, String)> {
    vec![
        (role.marker().to_string(), "1".to_string()),
        (
            IPC_TIMEOUT_VAR.to_string(),
            ipc_timeout.as_millis().to_string(),
        ),
    ]
}
