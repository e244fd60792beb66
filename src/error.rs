//! Error types used by the orchestrator, the worker client and the protocol.
//!
//! This module defines the error enums of the crate:
//!
//! - [`RuntimeError`] errors raised while serving the orchestrator until shutdown.
//! - [`TransitionError`] the outcome of a failed hand-off (`restart()`).
//! - [`LaunchError`] failures of the process-launch collaborator.
//! - [`ClientError`] failures on the worker side of the handshake.
//! - [`ProtocolError`] malformed or oversized control-channel frames.
//!
//! Every type provides `as_label()` a short stable snake_case label for logs/metrics.
//! [`TransitionError`] and [`ClientError`] are `Clone` because a single result is
//! shared by every caller that coalesced onto the same in-flight operation.

use std::time::Duration;

use thiserror::Error;

/// # Errors produced while running the orchestrator until shutdown.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The first hand-off never produced an active worker.
    #[error("initial worker failed to start: {0}")]
    Startup(#[from] TransitionError),

    /// Registering OS signal handlers failed.
    #[error("failed to install shutdown signal handlers: {0}")]
    Signal(#[source] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Startup(_) => "runtime_startup_failed",
            RuntimeError::Signal(_) => "runtime_signal_failed",
        }
    }
}

/// # Errors produced by a hand-off negotiation.
///
/// Returned by awaiting a [`Transition`](crate::Transition). All callers that
/// coalesced onto the same negotiation observe the same (cloned) error.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The worker could not be launched.
    #[error("failed to launch worker: {reason}")]
    Launch {
        /// Rendered launch failure.
        reason: String,
    },

    /// The negotiating worker exited before it reported readiness.
    #[error("worker pid={pid} exited before becoming ready (code={code:?})")]
    WorkerExited {
        /// OS process id of the worker.
        pid: u32,
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
    },

    /// The orchestrator was destroyed; no further transitions are accepted.
    #[error("orchestrator destroyed")]
    Destroyed,
}

impl TransitionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use handover::TransitionError;
    ///
    /// let err = TransitionError::WorkerExited { pid: 42, code: Some(1) };
    /// assert_eq!(err.as_label(), "transition_worker_exited");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TransitionError::Launch { .. } => "transition_launch_failed",
            TransitionError::WorkerExited { .. } => "transition_worker_exited",
            TransitionError::Destroyed => "transition_destroyed",
        }
    }
}

impl From<LaunchError> for TransitionError {
    fn from(err: LaunchError) -> Self {
        TransitionError::Launch {
            reason: err.to_string(),
        }
    }
}

/// # Errors produced by the process-launch collaborator.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LaunchError {
    /// The launch target is missing or could not be resolved.
    #[error("invalid launch configuration: {reason}")]
    Config {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// The OS refused to spawn the program.
    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        /// Program that was being spawned.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The control channel could not be created or attached.
    #[error("failed to set up control channel: {0}")]
    Channel(#[source] std::io::Error),

    /// The spawned child did not report a process id.
    #[error("spawned process has no pid")]
    NoPid,

    /// Spawning workers is not supported on this platform.
    #[error("process launching is not supported on this platform")]
    Unsupported,
}

impl LaunchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LaunchError::Config { .. } => "launch_config",
            LaunchError::Spawn { .. } => "launch_spawn_failed",
            LaunchError::Channel(_) => "launch_channel_failed",
            LaunchError::NoPid => "launch_no_pid",
            LaunchError::Unsupported => "launch_unsupported",
        }
    }
}

/// # Errors produced by the worker side of the handshake.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Called from the supervisor process; the operation only exists inside a worker.
    #[error("not running inside a supervised worker")]
    NotWorker,

    /// The worker has no control channel to the orchestrator.
    #[error("no control channel to the orchestrator")]
    NoChannel,

    /// `serve` did not arrive within the IPC timeout.
    #[error("orchestrator did not confirm readiness within {timeout:?}")]
    Timeout {
        /// The configured IPC timeout.
        timeout: Duration,
    },

    /// The control channel failed or closed while it was expected to be open.
    #[error("control channel failed: {reason}")]
    Channel {
        /// Rendered failure.
        reason: String,
    },
}

impl ClientError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use handover::ClientError;
    ///
    /// assert_eq!(ClientError::NotWorker.as_label(), "client_not_worker");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ClientError::NotWorker => "client_not_worker",
            ClientError::NoChannel => "client_no_channel",
            ClientError::Timeout { .. } => "client_timeout",
            ClientError::Channel { .. } => "client_channel_failed",
        }
    }

    /// Indicates whether the worker should give up and terminate itself.
    ///
    /// A worker that never got `serve` will not be promoted; staying alive only
    /// delays the orchestrator's recovery.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout { .. } | ClientError::Channel { .. }
        )
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        ClientError::Channel {
            reason: err.to_string(),
        }
    }
}

/// # Errors produced while framing control-channel messages.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A token that is not part of the handshake vocabulary.
    #[error("unknown message token {token:?}")]
    UnknownToken {
        /// The offending token.
        token: String,
    },

    /// `exit:` carried something that is not an `i32`.
    #[error("invalid exit code {value:?}")]
    InvalidExitCode {
        /// The unparsable value.
        value: String,
    },

    /// A frame grew past the maximum token length without a terminator.
    #[error("frame exceeds {max} bytes")]
    FrameTooLong {
        /// Maximum accepted frame length.
        max: usize,
    },

    /// Transport failure.
    #[error("control channel I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProtocolError::UnknownToken { .. } => "protocol_unknown_token",
            ProtocolError::InvalidExitCode { .. } => "protocol_invalid_exit_code",
            ProtocolError::FrameTooLong { .. } => "protocol_frame_too_long",
            ProtocolError::Io(_) => "protocol_io",
        }
    }

    /// Returns `true` when the frame is unusable but the stream is still intact.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnknownToken { .. } | ProtocolError::InvalidExitCode { .. }
        )
    }
}
