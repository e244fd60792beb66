//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait and the [`SubscriberSet`]
//! fan-out used by the orchestrator to deliver events from the
//! [`Bus`](crate::events::Bus) to user code.
//!
//! ## Architecture
//! ```text
//! orchestrator actor ── publish(Event) ──► Bus ──► subscriber listener
//!                                                        │
//!                                                        ▼
//!                                                  SubscriberSet::emit
//!                                                        │
//!                                        ┌───────────────┼───────────────┐
//!                                        ▼               ▼               ▼
//!                                    LogWriter        Metrics         Custom
//! ```
//!
//! The optional `logging` feature exports [`LogWriter`], which renders events
//! through `tracing`.

#[cfg(feature = "logging")]
mod log;
mod subscribe;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
