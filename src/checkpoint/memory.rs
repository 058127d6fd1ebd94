//! In-memory checkpoint store.
//!
//! Thread-safe, process-local. Nothing survives a restart, which makes it the
//! right store for tests and for grains that only need resume-after-terminate.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::{CasResult, CheckpointError, CheckpointRecord, CheckpointStore, Lease, check_fence};

#[derive(Debug, Default)]
struct Slot {
    lease: u64,
    record: Option<CheckpointRecord>,
}

/// In-memory [`CheckpointStore`].
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    slots: RwLock<HashMap<String, Slot>>,
}

fn poison_err<T>(_: PoisonError<T>) -> CheckpointError {
    CheckpointError::Poisoned
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of grains with a stored record.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .map(|s| s.values().filter(|slot| slot.record.is_some()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn acquire(&self, grain_id: &str) -> Result<Lease, CheckpointError> {
        let mut slots = self.slots.write().map_err(poison_err)?;
        let slot = slots.entry(grain_id.to_string()).or_default();
        slot.lease += 1;
        Ok(Lease {
            grain_id: Arc::from(grain_id),
            epoch: slot.lease,
        })
    }

    async fn load(&self, grain_id: &str) -> Result<Option<CheckpointRecord>, CheckpointError> {
        let slots = self.slots.read().map_err(poison_err)?;
        Ok(slots.get(grain_id).and_then(|s| s.record.clone()))
    }

    async fn save(
        &self,
        lease: &Lease,
        step: u32,
        state: Value,
    ) -> Result<CasResult, CheckpointError> {
        let mut slots = self.slots.write().map_err(poison_err)?;
        let slot = slots.entry(lease.grain_id.to_string()).or_default();
        if let Some(rejected) = check_fence(slot.lease, slot.record.as_ref(), lease, step) {
            return Ok(rejected);
        }
        slot.record = Some(CheckpointRecord {
            grain_id: lease.grain_id.to_string(),
            lease: lease.epoch,
            step,
            state,
            updated_at: Utc::now(),
        });
        Ok(CasResult::Success)
    }

    async fn remove(&self, grain_id: &str) -> Result<(), CheckpointError> {
        if let Some(slot) = self.slots.write().map_err(poison_err)?.get_mut(grain_id) {
            slot.record = None;
        }
        Ok(())
    }
}
