//! # Event bus for broadcasting orchestrator events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`]. Grain actors,
//! the orchestrator and subscriber workers publish; the subscriber listener,
//! grain stream forwarders and raw [`Bus::subscribe`] receivers consume.
//!
//! ```text
//! Publishers (many):                      Consumers:
//!   GrainActor ──┐                     ┌──► subscriber listener ──► SubscriberSet
//!   Orchestrator ┼──► Bus (broadcast) ─┼──► GrainStream forwarders (per subscribe)
//!   Sub workers ─┘                     └──► raw receivers
//! ```
//!
//! ## Rules
//! - `publish()` never blocks.
//! - A single ring buffer of `capacity` events is shared by all receivers; a
//!   receiver that falls behind observes `RecvError::Lagged(n)` and skips `n`.
//! - No persistence: events sent while nobody listens are lost. Late grain
//!   subscribers get the latest lifecycle event from the replay cache instead.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for orchestrator events.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to every active receiver (dropped if there are none).
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates an independent receiver for events sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
