//! Reconciliation record store
//!
//! Append-only history of reconciliations. Records are written once when a
//! reconciliation reaches its terminal outcome and never modified.

use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use rollout_types::{ReconciliationRecord, TargetId};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Append-only store of reconciliation records
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn append(&self, record: &ReconciliationRecord) -> Result<()>;

    /// All records of `target`, oldest first
    async fn records_for(&self, target: &TargetId) -> Result<Vec<ReconciliationRecord>>;

    async fn latest_for(&self, target: &TargetId) -> Result<Option<ReconciliationRecord>> {
        Ok(self.records_for(target).await?.pop())
    }
}

/// In-memory record store
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<Vec<ReconciliationRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<ReconciliationRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn append(&self, record: &ReconciliationRecord) -> Result<()> {
        self.records.write().push(record.clone());
        Ok(())
    }

    async fn records_for(&self, target: &TargetId) -> Result<Vec<ReconciliationRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| &r.target_id == target)
            .cloned()
            .collect())
    }
}

/// JSON-lines record store; each record is synced before `append` returns
pub struct FileRecordStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileRecordStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(storage)?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<ReconciliationRecord>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage(e)),
        };

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(storage))
            .collect()
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn append(&self, record: &ReconciliationRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record).map_err(storage)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(storage)?;
        file.write_all(&line).await.map_err(storage)?;
        file.sync_data().await.map_err(storage)?;
        Ok(())
    }

    async fn records_for(&self, target: &TargetId) -> Result<Vec<ReconciliationRecord>> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|r| &r.target_id == target)
            .collect())
    }
}

fn storage(e: impl std::fmt::Display) -> ReconcileError {
    ReconcileError::Records(e.to_string())
}
