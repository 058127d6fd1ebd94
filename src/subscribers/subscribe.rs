//! # Subscriber extension point.
//!
//! [`Subscribe`] plugs custom observers into the orchestrator: metrics,
//! audit trails, or the real-time transport that pushes grain events to remote
//! clients. Each subscriber is driven by its own worker loop fed by a bounded
//! queue owned by the [`SubscriberSet`](crate::SubscriberSet).
//!
//! ## Contract
//! - Implementations may be slow (I/O, batching); they block neither the
//!   publisher nor other subscribers.
//! - On queue overflow, events for that subscriber are dropped and a
//!   `SubscriberOverflow` event is published.
//! - Delivery is at-least-once per process lifetime at best; use `Event::seq`
//!   to deduplicate downstream.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use grainvisor::{Event, EventKind, Subscribe};
//!
//! struct Push;
//!
//! #[async_trait]
//! impl Subscribe for Push {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind.is_lifecycle() {
//!             let _wire = ev.to_payload();
//!             // send to remote clients...
//!         }
//!     }
//!     fn name(&self) -> &'static str { "push" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Contract for event subscribers.
///
/// Called from a subscriber-dedicated worker task.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
