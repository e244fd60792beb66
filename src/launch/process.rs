//! # OS process launcher.
//!
//! [`ProcessLauncher`] spawns workers with `tokio::process` and hands each one a
//! private Unix socket as its control channel.
//!
//! ## Wiring
//! ```text
//! UnixStream::pair()
//!   ├─► parent end ──► ControlChannel (orchestrator side)
//!   └─► child end  ──► dup2 onto CHANNEL_FD in the child (pre_exec)
//!                      HANDOVER_CHANNEL_FD=<CHANNEL_FD> in its env
//! ```
//!
//! ## Rules
//! - stdin is closed; stdout/stderr follow [`StdioMode`](super::StdioMode).
//! - `kill_on_drop` is set: dropping the exit future (link task aborted or the
//!   runtime torn down) SIGKILLs the worker.
//! - Termination uses SIGTERM, forced termination SIGKILL; a vanished process
//!   (`ESRCH`) is not an error.

use std::process::Stdio;

use tokio::process::{Child, Command};

use super::{ExitStatus, Launch, LaunchSpec, Spawned, StdioMode, Terminate};
use crate::error::LaunchError;
#[cfg(unix)]
use crate::protocol::{ControlChannel, env::CHANNEL_FD_VAR};

/// Descriptor number the control socket is installed at in every worker.
#[cfg(unix)]
pub const CHANNEL_FD: std::os::unix::io::RawFd = 3;

/// Spawns real worker processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    /// Creates a new launcher.
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl Launch for ProcessLauncher {
    fn launch(
        &self,
        spec: &LaunchSpec,
        markers: &[(String, String)],
    ) -> Result<Spawned, LaunchError> {
        use std::os::unix::io::AsRawFd;
        use std::os::unix::net::UnixStream;

        spec.validate()?;

        let (parent_end, child_end) = UnixStream::pair().map_err(LaunchError::Channel)?;
        let child_fd = child_end.as_raw_fd();

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        match spec.stdio {
            StdioMode::Inherit => cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit()),
            StdioMode::Null => cmd.stdout(Stdio::null()).stderr(Stdio::null()),
        };
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }
        for (k, v) in markers {
            cmd.env(k, v);
        }
        cmd.env(CHANNEL_FD_VAR, CHANNEL_FD.to_string());

        // SAFETY: the closure runs between fork and exec and only calls
        // async-signal-safe functions (dup2, fcntl).
        unsafe {
            cmd.pre_exec(move || install_channel_fd(child_fd));
        }

        let child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            program: spec.display_program(),
            source,
        })?;
        drop(child_end);

        let pid = child.id().ok_or(LaunchError::NoPid)?;
        let channel = ControlChannel::from_std(parent_end).map_err(LaunchError::Channel)?;
        tracing::debug!(pid, program = %spec.display_program(), "worker process spawned");

        Ok(Spawned {
            pid,
            channel,
            exit: Box::pin(wait_exit(child, pid)),
            terminator: Box::new(PidTerminator { pid }),
        })
    }
}

#[cfg(not(unix))]
impl Launch for ProcessLauncher {
    fn launch(
        &self,
        _spec: &LaunchSpec,
        _markers: &[(String, String)],
    ) -> Result<Spawned, LaunchError> {
        Err(LaunchError::Unsupported)
    }
}

/// Makes the control socket available at [`CHANNEL_FD`] across `exec`.
#[cfg(unix)]
fn install_channel_fd(fd: std::os::unix::io::RawFd) -> std::io::Result<()> {
    use nix::fcntl::{FcntlArg, FdFlag, fcntl};
    use nix::unistd::dup2;

    if fd == CHANNEL_FD {
        // dup2 onto itself keeps FD_CLOEXEC; clear it explicitly.
        fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty()))?;
    } else {
        dup2(fd, CHANNEL_FD)?;
    }
    Ok(())
}

async fn wait_exit(mut child: Child, pid: u32) -> ExitStatus {
    match child.wait().await {
        Ok(status) => ExitStatus::from(status),
        Err(err) => {
            tracing::warn!(pid, error = %err, "failed to reap worker process");
            ExitStatus::default()
        }
    }
}

/// Signals a worker by pid.
#[derive(Debug, Clone, Copy)]
struct PidTerminator {
    pid: u32,
}

#[cfg(unix)]
impl PidTerminator {
    fn send(&self, signal: nix::sys::signal::Signal) -> std::io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        #[allow(clippy::cast_possible_wrap)]
        let target = Pid::from_raw(self.pid as i32);
        match kill(target, signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(errno.into()),
        }
    }
}

#[cfg(unix)]
impl Terminate for PidTerminator {
    fn terminate(&self) -> std::io::Result<()> {
        self.send(nix::sys::signal::Signal::SIGTERM)
    }

    fn kill(&self) -> std::io::Result<()> {
        self.send(nix::sys::signal::Signal::SIGKILL)
    }
}

#[cfg(not(unix))]
impl Terminate for PidTerminator {
    fn terminate(&self) -> std::io::Result<()> {
        Err(std::io::ErrorKind::Unsupported.into())
    }

    fn kill(&self) -> std::io::Result<()> {
        Err(std::io::ErrorKind::Unsupported.into())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::protocol::{Message, Role, env};

    fn sh(script: &str) -> LaunchSpec {
        LaunchSpec::new("sh").with_args(["-c", script])
    }

    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[tokio::test]
    async fn reports_exit_code() {
        let spawned = ProcessLauncher::new().launch(&sh("exit 3"), &[]).unwrap();
        assert!(spawned.pid > 0);
        assert_eq!(spawned.exit.await, ExitStatus::exited(3));
    }

    #[cfg_attr(miri, ignore)]
    #[tokio::test]
    async fn worker_sees_markers_and_channel_fd() {
        let markers = env::worker_env(Role::Recurring, Duration::from_millis(1234));
        let script = r#"
            [ "$HANDOVER_RECURRING" = "1" ] || exit 10
            [ "$HANDOVER_IPC_TIMEOUT" = "1234" ] || exit 11
            [ "$HANDOVER_CHANNEL_FD" = "3" ] || exit 12
            echo ready >&3
            read reply <&3
            [ "$reply" = "serve" ] || exit 13
        "#;
        let spawned = ProcessLauncher::new().launch(&sh(script), &markers).unwrap();
        let mut channel = spawned.channel;

        let first = tokio::time::timeout(Duration::from_secs(10), channel.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(first, Message::Ready);
        channel.send(Message::Serve).await.unwrap();

        assert_eq!(spawned.exit.await, ExitStatus::exited(0));
    }

    #[cfg_attr(miri, ignore)]
    #[tokio::test]
    async fn terminate_delivers_sigterm() {
        let spawned = ProcessLauncher::new().launch(&sh("sleep 30"), &[]).unwrap();
        spawned.terminator.terminate().unwrap();

        let status = tokio::time::timeout(Duration::from_secs(10), spawned.exit)
            .await
            .unwrap();
        assert_eq!(status.signal, Some(nix::sys::signal::Signal::SIGTERM as i32));
    }

    #[cfg_attr(miri, ignore)]
    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let result = ProcessLauncher::new().launch(&LaunchSpec::new("nonexistent_command_12345"), &[]);
        assert!(matches!(result, Err(LaunchError::Spawn { .. })));
    }
}
