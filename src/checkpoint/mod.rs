//! # Checkpoint store: durable progress of durable grains.
//!
//! The execution engine persists one [`CheckpointRecord`] per durable grain:
//! the number of completed steps and the state to resume from. The store is the
//! only shared mutable resource crossing grain boundaries, and each record is
//! owned by exactly one execution attempt at a time.
//!
//! ## Lease fencing
//! ```text
//! attempt #1: acquire("g") → Lease{epoch: 1}   save(lease 1, step 1) → Success
//! attempt #2: acquire("g") → Lease{epoch: 2}   (attempt #1 is now stale)
//! attempt #1: save(lease 1, step 2)            → LeaseConflict{current: 2}
//! ```
//! A save is applied only if the lease epoch is current and the step does not go
//! backwards. The orchestrator never runs two attempts of one grain at once; the
//! fence rejects a stale writer anyway.
//!
//! ## Implementations
//! - [`MemoryCheckpointStore`]: process-local, for tests and ephemeral runs.
//! - [`FileCheckpointStore`]: one JSON document per grain, atomic rename on write.

mod file;
mod memory;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::grains::{HasResultCode, ResultCode};

pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;

/// Persisted progress of one durable grain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub grain_id: String,
    /// Epoch of the lease that wrote this record.
    pub lease: u64,
    /// Number of completed steps; the next step to run.
    pub step: u32,
    /// State handed to the next step.
    pub state: Value,
    pub updated_at: DateTime<Utc>,
}

/// Write ownership of one grain's record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub grain_id: Arc<str>,
    pub epoch: u64,
}

/// Result of a fenced save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasResult {
    /// Record written.
    Success,
    /// A newer lease exists; the writer is stale.
    LeaseConflict {
        /// The current epoch.
        current: u64,
    },
    /// The stored record is already past this step.
    StepRegression {
        /// The stored step.
        stored: u32,
    },
}

impl CasResult {
    /// Returns true if the save was applied.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Storage failures.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("checkpoint store lock poisoned")]
    Poisoned,
}

impl CheckpointError {
    pub fn as_label(&self) -> &'static str {
        match self {
            CheckpointError::Io { .. } => "checkpoint_io",
            CheckpointError::Codec(_) => "checkpoint_codec",
            CheckpointError::Poisoned => "checkpoint_poisoned",
        }
    }
}

impl HasResultCode for CheckpointError {
    fn result_code(&self) -> ResultCode {
        ResultCode::Error
    }
}

/// Durable key-value record of grain progress, keyed by grain id.
#[async_trait]
pub trait CheckpointStore: Send + Sync + 'static {
    /// Claims write ownership of `grain_id`, invalidating every older lease.
    async fn acquire(&self, grain_id: &str) -> Result<Lease, CheckpointError>;

    /// Loads the last persisted record, if any.
    async fn load(&self, grain_id: &str) -> Result<Option<CheckpointRecord>, CheckpointError>;

    /// Persists `step`/`state` if `lease` is current and `step` does not regress.
    async fn save(
        &self,
        lease: &Lease,
        step: u32,
        state: Value,
    ) -> Result<CasResult, CheckpointError>;

    /// Drops the record of `grain_id` (no-op if absent).
    ///
    /// The lease epoch survives, so the next `acquire` still fences every
    /// lease handed out before the removal.
    async fn remove(&self, grain_id: &str) -> Result<(), CheckpointError>;
}

/// Applies the fence to a stored (lease, record) pair.
pub(crate) fn check_fence(
    current_lease: u64,
    stored: Option<&CheckpointRecord>,
    lease: &Lease,
    step: u32,
) -> Option<CasResult> {
    if lease.epoch != current_lease {
        return Some(CasResult::LeaseConflict {
            current: current_lease,
        });
    }
    match stored {
        Some(rec) if rec.step > step => Some(CasResult::StepRegression { stored: rec.step }),
        _ => None,
    }
}
