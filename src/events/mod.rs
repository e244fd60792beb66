//! Orchestrator events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to lifecycle events emitted by the orchestrator actor and
//! the subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: the orchestrator actor, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the subscriber listener (fans out to `SubscriberSet`) and any
//!   receiver obtained through [`Orchestrator::subscribe`](crate::Orchestrator::subscribe).
//!
//! See `core/mod.rs` for the system-level wiring diagram.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind, RECOVER_EXHAUSTED, RECOVER_IN_FLIGHT};
