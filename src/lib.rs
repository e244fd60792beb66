//! # handover
//!
//! **Handover** restarts long-running applications with zero downtime.
//!
//! A supervising process (the orchestrator) keeps the current worker serving
//! while a replacement boots, waits for the replacement to report readiness
//! over a private control channel, and only then retires the previous worker.
//! Crashed workers are relaunched automatically within a bounded budget.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  supervisor process                                worker processes
//! ┌───────────────────────────────────────────┐
//! │ Orchestrator (handle)                     │
//! │   restart() / snapshot() / destroy()      │
//! └──────┬────────────────────────────────────┘
//!        │ Command
//!        ▼
//! ┌───────────────────────────────────────────┐      ┌────────────────────┐
//! │ actor (single task)                       │      │ worker #1 (active) │
//! │  - active / pending / retiring workers    │◄────►│   WorkerClient     │
//! │  - in-flight Transition (shared)          │ link └────────────────────┘
//! │  - RecoveryBudget + BackoffPolicy         │      ┌────────────────────┐
//! │  - Launch (ProcessLauncher by default)    │◄────►│ worker #2 (pending)│
//! └──────┬────────────────────────────────────┘ link │   WorkerClient     │
//!        │ publish(Event)                            └────────────────────┘
//!        ▼
//! ┌───────────────────────────────────────────┐
//! │ Bus (broadcast) ──► SubscriberSet         │
//! │                     ├─► LogWriter         │
//! │                     └─► custom Subscribe  │
//! └───────────────────────────────────────────┘
//! ```
//!
//! ### Hand-off
//! ```text
//! restart()
//!   └─► launch worker (HANDOVER_INITIAL or HANDOVER_RECURRING, control socket)
//!         worker: WorkerClient::await_ready() ── ready ──►
//!   ◄── orchestrator: retire previous worker, promote, serve ──
//!         initial worker: serves right after sending ready
//!         recurring worker: serves once `serve` arrives (≤ ipc timeout)
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                         |
//! |-------------------|---------------------------------------------------------------|--------------------------------------------|
//! | **Orchestration** | Spawn, hand off, retire and recover workers.                  | [`Orchestrator`], [`Transition`]           |
//! | **Worker side**   | Readiness handshake from inside a worker.                     | [`WorkerClient`], [`is_supervisor`]        |
//! | **Protocol**      | Line-framed control messages and environment markers.         | [`Message`], [`Role`], [`ControlChannel`]  |
//! | **Launching**     | Pluggable process launcher.                                   | [`Launch`], [`ProcessLauncher`]            |
//! | **Subscriber API**| Observe lifecycle events (logging, metrics, alerting).        | [`Subscribe`], [`Event`]                   |
//! | **Policies**      | Recovery budget, backoff and jitter.                          | [`RecoveryPolicy`], [`BackoffPolicy`]      |
//! | **Errors**        | Typed errors for every surface.                               | [`TransitionError`], [`ClientError`]       |
//! | **Configuration** | Centralized orchestrator settings.                            | [`Config`], [`LaunchSpec`]                 |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] subscriber backed by `tracing`.
//!
//! ## Example
//! The same binary acts as supervisor or worker depending on the markers the
//! orchestrator sets:
//! ```rust,no_run
//! use handover::{Config, Orchestrator, WorkerClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     if handover::is_supervisor() {
//!         let orchestrator = Orchestrator::builder(Config::current_exe()?).build();
//!         orchestrator.serve_until_signal().await?;
//!         return Ok(());
//!     }
//!
//!     let client = WorkerClient::from_env()?;
//!     // bind sockets, load configuration...
//!     client.await_ready().await?;
//!     // serve traffic until SIGTERM
//!     Ok(())
//! }
//! ```

mod client;
mod core;
mod error;
mod events;
mod launch;
mod policies;
mod protocol;
mod subscribers;

// ---- Public re-exports ----

pub use crate::core::{
    Config, ExitHandler, HandoffMode, Lifecycle, Orchestrator, OrchestratorBuilder, Phase,
    Snapshot, Transition, WorkerId, WorkerInfo,
};
pub use client::WorkerClient;
pub use error::{ClientError, LaunchError, ProtocolError, RuntimeError, TransitionError};
pub use events::{Bus, Event, EventKind, RECOVER_EXHAUSTED, RECOVER_IN_FLIGHT};
pub use launch::{ExitStatus, Launch, LaunchSpec, ProcessLauncher, Spawned, StdioMode, Terminate};
pub use policies::{BackoffPolicy, JitterPolicy, Recovery, RecoveryBudget, RecoveryPolicy};
pub use protocol::{
    ChannelReader, ChannelWriter, ControlChannel, Direction, Message, MessageCodec, Role, Transport,
    env,
};
pub use subscribers::{Subscribe, SubscriberSet};

/// Returns `true` iff this process was not spawned by an orchestrator.
///
/// Shorthand for [`env::is_supervisor`].
pub fn is_supervisor() -> bool {
    env::is_supervisor()
}

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
