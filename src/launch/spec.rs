//! # Launch specification.
//!
//! [`LaunchSpec`] describes the worker command. The common case is re-running
//! the current executable with its own arguments ([`LaunchSpec::current_exe`]);
//! the process then tells the supervisor and worker roles apart with
//! [`is_supervisor`](crate::is_supervisor).
//!
//! ## Example
//! ```rust
//! use handover::{LaunchSpec, StdioMode};
//!
//! let spec = LaunchSpec::new("/usr/local/bin/api")
//!     .with_args(["--port", "8080"])
//!     .with_env("RUST_LOG", "info")
//!     .with_stdio(StdioMode::Inherit);
//!
//! assert_eq!(spec.args.len(), 2);
//! ```

use std::ffi::OsString;
use std::path::PathBuf;

use crate::error::LaunchError;

/// Where the worker's stdout/stderr go. Stdin is always closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdioMode {
    /// Share the supervisor's stdout/stderr.
    #[default]
    Inherit,
    /// Discard output.
    Null,
}

/// What to run for each worker.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments (program name excluded).
    pub args: Vec<OsString>,
    /// Working directory; `None` inherits the supervisor's.
    pub cwd: Option<PathBuf>,
    /// Extra environment on top of the inherited one.
    pub env: Vec<(OsString, OsString)>,
    /// Output wiring.
    pub stdio: StdioMode,
}

impl LaunchSpec {
    /// Runs `program` without arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            stdio: StdioMode::default(),
        }
    }

    /// Re-runs the current executable with the current arguments.
    pub fn current_exe() -> Result<Self, LaunchError> {
        let program = std::env::current_exe().map_err(|err| LaunchError::Config {
            reason: format!("cannot resolve current executable: {err}"),
        })?;
        Ok(Self::new(program).with_args(std::env::args_os().skip(1)))
    }

    /// Replaces the argument list.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Adds one environment variable.
    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets the working directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Sets the output wiring.
    pub fn with_stdio(mut self, stdio: StdioMode) -> Self {
        self.stdio = stdio;
        self
    }

    /// Human-readable program name for errors and logs.
    pub fn display_program(&self) -> String {
        self.program.display().to_string()
    }

    /// Checks the launch target before spawning.
    ///
    /// Bare names (no path separator) are resolved through `PATH` by the OS at
    /// spawn time and are not checked here.
    pub fn validate(&self) -> Result<(), LaunchError> {
        if self.program.as_os_str().is_empty() {
            return Err(LaunchError::Config {
                reason: "empty program".to_string(),
            });
        }
        if self.program.components().count() > 1 && !self.program.exists() {
            return Err(LaunchError::Config {
                reason: format!("{} does not exist", self.display_program()),
            });
        }
        if let Some(cwd) = &self.cwd {
            if !cwd.is_dir() {
                return Err(LaunchError::Config {
                    reason: format!("working directory {} is not a directory", cwd.display()),
                });
            }
        }
        Ok(())
    }
}
