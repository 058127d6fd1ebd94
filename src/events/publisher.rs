use std::sync::Arc;

use super::{Bus, Event, LatestTracker};

/// Bus plus replay cache: the only way grain lifecycle events are published.
#[derive(Clone)]
pub(crate) struct Publisher {
    bus: Bus,
    latest: Arc<LatestTracker>,
}

impl Publisher {
    pub fn new(bus: Bus) -> Self {
        Self {
            bus,
            latest: Arc::new(LatestTracker::new()),
        }
    }

    /// Updates the replay cache, then broadcasts.
    pub fn publish(&self, ev: Event) {
        self.latest.update(&ev);
        self.bus.publish(ev);
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn latest(&self) -> &Arc<LatestTracker> {
        &self.latest
    }
}
