//! # Latest lifecycle event per grain, ordered by sequence number.
//!
//! The replay cache behind late subscriptions. The orchestrator updates it
//! synchronously before each lifecycle event hits the bus, so a subscriber that
//! subscribes to the bus and then reads the cache misses nothing: at worst it
//! sees the same `seq` twice and drops the duplicate.
//!
//! ```text
//! publish(ev) ──► LatestTracker::update(&ev) ──► Bus::publish(ev)
//!                        │
//!                        ▼
//!          HashMap<grain_id, Event>   (only if ev.seq > cached seq)
//! ```
//!
//! ## Rules
//! - Only lifecycle events with a grain id are cached.
//! - Events with `seq <= cached seq` are rejected as stale.
//! - Entries are forgotten when the janitor purges the grain.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::Event;

/// Thread-safe replay cache.
#[derive(Default)]
pub struct LatestTracker {
    state: RwLock<HashMap<String, Event>>,
}

impl LatestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches `ev` if it is a newer lifecycle event for its grain.
    pub fn update(&self, ev: &Event) -> bool {
        if !ev.kind.is_lifecycle() {
            return false;
        }
        let Some(id) = ev.grain_id.as_deref() else {
            return false;
        };
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        match state.get(id) {
            Some(cached) if ev.seq <= cached.seq => false,
            _ => {
                state.insert(id.to_string(), ev.clone());
                true
            }
        }
    }

    /// Latest lifecycle event of one grain.
    pub fn latest(&self, grain_id: &str) -> Option<Event> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(grain_id)
            .cloned()
    }

    /// Latest events of every grain carrying `client_key`, by sequence.
    pub fn latest_for_client(&self, client_key: &str) -> Vec<Event> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<Event> = state
            .values()
            .filter(|ev| ev.client_key.as_deref() == Some(client_key))
            .cloned()
            .collect();
        out.sort_unstable_by_key(|ev| ev.seq);
        out
    }

    /// Latest events of every grain with `seq >= floor`, by sequence.
    pub fn latest_since(&self, floor: u64) -> Vec<Event> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<Event> = state.values().filter(|ev| ev.seq >= floor).cloned().collect();
        out.sort_unstable_by_key(|ev| ev.seq);
        out
    }

    pub fn forget(&self, grain_id: &str) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(grain_id);
    }
}
