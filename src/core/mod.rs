//! Orchestration core.
//!
//! The only public entry point is [`Orchestrator`] (plus its builder, config and
//! result types); everything else is the machinery behind it.
//!
//! ## Wiring
//! ```text
//! Orchestrator (handle) ── Command ──► actor ──► Launch::launch ──► Spawned
//!        ▲                               │  ▲                          │
//!        │                               │  └── Message / Exited ── link (one per worker)
//!   Transition / Snapshot                │
//!                                        └── publish(Event) ──► Bus ──► SubscriberSet
//! ```
//!
//! Internal modules:
//! - [`actor`]: the state machine (spawn, hand-off, retirement, recovery, teardown);
//! - [`link`]: per-worker task bridging frames, exits and termination;
//! - [`worker`]: worker bookkeeping and forward-only lifecycle;
//! - [`transition`]: shared completion future of one hand-off;
//! - [`shutdown`]: OS signal handling for `serve_until_signal`.

mod actor;
mod builder;
mod config;
mod link;
mod orchestrator;
mod shutdown;
mod transition;
mod worker;

#[cfg(test)]
mod tests;

pub use actor::ExitHandler;
pub use builder::OrchestratorBuilder;
pub use config::{Config, HandoffMode};
pub use orchestrator::{Orchestrator, Phase, Snapshot};
pub use transition::Transition;
pub use worker::{Lifecycle, WorkerId, WorkerInfo};
