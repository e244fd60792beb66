//! # Subscriber trait
//!
//! `Subscribe` is the extension point for observing the orchestrator: audit
//! logs, metrics, alerting on `recover(0)`. Each subscriber is driven by a
//! dedicated worker loop fed by a bounded queue owned by the
//! [`SubscriberSet`](crate::subscribers::SubscriberSet).
//!
//! ## Contract
//! - Implementations may be slow (I/O, batching, retries); they do **not** block
//!   the orchestrator nor other subscribers.
//! - Each subscriber **declares** its preferred queue capacity via
//!   [`Subscribe::queue_capacity`]. If a queue overflows, events for that
//!   subscriber are **dropped** and a `SubscriberOverflow` event is published.
//!
//! ## Example
//! ```rust
//! use handover::{Event, EventKind, Subscribe};
//!
//! struct GiveUpAlarm;
//!
//! #[async_trait::async_trait]
//! impl Subscribe for GiveUpAlarm {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::Recover && ev.remaining == Some(0) {
//!             // page someone
//!         }
//!     }
//!     fn name(&self) -> &'static str { "give-up-alarm" }
//!     fn queue_capacity(&self) -> usize { 64 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Contract for event subscribers.
///
/// Called from a subscriber-dedicated worker task. Implementations should avoid
/// blocking the async runtime.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handle a single event.
    async fn on_event(&self, event: &Event);

    /// Human-readable name (for logs/metrics).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
