use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use tokio::time::Instant;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Pending {
    due: Instant,
    seq: u64,
    id: Arc<str>,
}

/// Min-heap of delayed grain ids keyed by release instant.
///
/// Ties on the release instant are broken by scheduling order.
#[derive(Debug, Default)]
pub struct DelayGate {
    heap: BinaryHeap<Reverse<Pending>>,
    seq: u64,
}

impl DelayGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `id` for release at `due`.
    ///
    /// Returns true if `due` became the earliest deadline (the driver must re-arm).
    pub fn schedule(&mut self, id: Arc<str>, due: Instant) -> bool {
        let earliest = self.peek_due().is_none_or(|current| due < current);
        self.seq += 1;
        self.heap.push(Reverse(Pending {
            due,
            seq: self.seq,
            id,
        }));
        earliest
    }

    /// Next release instant.
    #[inline]
    pub fn peek_due(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(p)| p.due)
    }

    /// Removes and returns every id due at or before `now`, in release order.
    pub fn pop_due(&mut self, now: Instant) -> Vec<Arc<str>> {
        let mut out = Vec::new();
        while self.heap.peek().is_some_and(|Reverse(p)| p.due <= now) {
            if let Some(Reverse(p)) = self.heap.pop() {
                out.push(p.id);
            }
        }
        out
    }

    /// Removes a still-delayed id. Returns false if it was not held.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.heap.len();
        self.heap.retain(|Reverse(p)| &*p.id != id);
        self.heap.len() != before
    }

    pub fn contains(&self, id: &str) -> bool {
        self.heap.iter().any(|Reverse(p)| &*p.id == id)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
