//! Process-launch collaborator.
//!
//! The orchestrator never touches `std::process` directly: it asks a [`Launch`]
//! implementation for a [`Spawned`] worker made of
//! - the OS process id,
//! - one end of a dedicated [`ControlChannel`],
//! - a future resolving with the process [`ExitStatus`],
//! - a [`Terminate`] handle for fire-and-forget signals.
//!
//! ## Contents
//! - [`LaunchSpec`] what to run (program, args, cwd, env, stdio)
//! - [`ProcessLauncher`] real OS processes with an inherited Unix socket
//!
//! ```text
//! Orchestrator::restart()
//!     └─► Launch::launch(spec, markers) ──► Spawned { pid, channel, exit, terminator }
//!                                               │
//!                                               └─► core::link (owns all four)
//! ```

mod process;
mod spec;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;

use futures::future::BoxFuture;

use crate::{error::LaunchError, protocol::ControlChannel};

pub use process::ProcessLauncher;
pub use spec::{LaunchSpec, StdioMode};

/// How a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitStatus {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal number, if it was killed by one.
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// Normal exit with `code`.
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Death by `signal`.
    pub fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Returns `true` for a zero exit code.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "code={code}"),
            (None, Some(sig)) => write!(f, "signal={sig}"),
            (None, None) => f.write_str("unknown"),
        }
    }
}

/// Fire-and-forget termination of a spawned worker.
///
/// Both calls must return promptly; the exit is observed through
/// [`Spawned::exit`]. A process that is already gone is not an error.
pub trait Terminate: Send + Sync + 'static {
    /// Polite stop request (SIGTERM).
    fn terminate(&self) -> std::io::Result<()>;

    /// Forced stop (SIGKILL) once the grace period ran out.
    fn kill(&self) -> std::io::Result<()>;
}

/// A freshly launched worker.
pub struct Spawned {
    /// OS process id.
    pub pid: u32,
    /// Orchestrator end of the control channel.
    pub channel: ControlChannel,
    /// Resolves once the process exited.
    pub exit: BoxFuture<'static, ExitStatus>,
    /// Signals the process.
    pub terminator: Box<dyn Terminate>,
}

/// Launches worker processes.
///
/// `markers` are the role/timeout environment variables computed by the
/// orchestrator; implementations must add them to the child's environment and
/// wire up the control channel.
pub trait Launch: Send + Sync + 'static {
    /// Spawns one worker.
    fn launch(
        &self,
        spec: &LaunchSpec,
        markers: &[(String, String)],
    ) -> Result<Spawned, LaunchError>;
}
