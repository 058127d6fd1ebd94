//! File-based checkpoint store.
//!
//! One JSON document per grain under a base directory:
//! ```text
//! <dir>/<hex(grain_id)>.json   { "lease": 3, "record": { "step": 2, "state": ..., ... } }
//! ```
//! Removing a checkpoint clears `record` and keeps the document, so lease
//! epochs keep growing across removals.
//! Writes go to a `.tmp` sibling and are renamed into place, so a crash leaves
//! either the previous or the new document. Fenced operations on one grain are
//! serialized by a per-grain async mutex; different grains never contend.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{CasResult, CheckpointError, CheckpointRecord, CheckpointStore, Lease, check_fence};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    lease: u64,
    #[serde(default)]
    record: Option<CheckpointRecord>,
}

/// Directory-backed [`CheckpointStore`].
#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileCheckpointStore {
    /// Opens (and creates) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| CheckpointError::Io {
                path: dir.clone(),
                source,
            })?;
        Ok(Self {
            dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, grain_id: &str) -> PathBuf {
        let name: String = grain_id.bytes().map(|b| format!("{b:02x}")).collect();
        self.dir.join(format!("{name}.json"))
    }

    fn lock_for(&self, grain_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(grain_id.to_string()).or_default())
    }

    async fn read(&self, grain_id: &str) -> Result<Option<Document>, CheckpointError> {
        let path = self.path_for(grain_id);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CheckpointError::Io { path, source }),
        }
    }

    async fn write(&self, grain_id: &str, doc: &Document) -> Result<(), CheckpointError> {
        let path = self.path_for(grain_id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(doc)?;
        let io_err = |source: std::io::Error| CheckpointError::Io {
            path: tmp.clone(),
            source,
        };

        let mut file = fs::File::create(&tmp).await.map_err(io_err)?;
        file.write_all(&bytes).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);

        fs::rename(&tmp, &path)
            .await
            .map_err(|source| CheckpointError::Io { path, source })
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn acquire(&self, grain_id: &str) -> Result<Lease, CheckpointError> {
        let lock = self.lock_for(grain_id);
        let _guard = lock.lock().await;

        let mut doc = self.read(grain_id).await?.unwrap_or_default();
        doc.lease += 1;
        self.write(grain_id, &doc).await?;
        debug!(grain_id, epoch = doc.lease, "checkpoint lease acquired");
        Ok(Lease {
            grain_id: Arc::from(grain_id),
            epoch: doc.lease,
        })
    }

    async fn load(&self, grain_id: &str) -> Result<Option<CheckpointRecord>, CheckpointError> {
        Ok(self.read(grain_id).await?.and_then(|d| d.record))
    }

    async fn save(
        &self,
        lease: &Lease,
        step: u32,
        state: Value,
    ) -> Result<CasResult, CheckpointError> {
        let lock = self.lock_for(&lease.grain_id);
        let _guard = lock.lock().await;

        let mut doc = self.read(&lease.grain_id).await?.unwrap_or_default();
        if let Some(rejected) = check_fence(doc.lease, doc.record.as_ref(), lease, step) {
            return Ok(rejected);
        }
        doc.record = Some(CheckpointRecord {
            grain_id: lease.grain_id.to_string(),
            lease: lease.epoch,
            step,
            state,
            updated_at: Utc::now(),
        });
        self.write(&lease.grain_id, &doc).await?;
        Ok(CasResult::Success)
    }

    async fn remove(&self, grain_id: &str) -> Result<(), CheckpointError> {
        let lock = self.lock_for(grain_id);
        let _guard = lock.lock().await;

        // Keep the document as a tombstone: the lease epoch must not restart.
        let Some(mut doc) = self.read(grain_id).await? else {
            return Ok(());
        };
        if doc.record.take().is_none() {
            return Ok(());
        }
        self.write(grain_id, &doc).await?;
        debug!(grain_id, epoch = doc.lease, "checkpoint removed");
        Ok(())
    }
}
