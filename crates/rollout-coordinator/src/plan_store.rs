//! Plan store
//!
//! Keeps each plan next to its latest report so `status` can be answered by
//! another process, and carries operator abort requests to the process that
//! runs the plan.

use crate::error::{CoordinatorError, Result};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use rollout_types::{DeploymentPlan, PlanId, RolloutReport};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A plan and its most recent report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRecord {
    pub plan: DeploymentPlan,
    pub report: RolloutReport,
}

/// Persistence for plans, reports and abort requests
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Insert or replace the record of `record.plan`
    async fn save(&self, record: &PlanRecord) -> Result<()>;

    async fn load(&self, id: PlanId) -> Result<Option<PlanRecord>>;

    /// All known plans, newest first
    async fn list(&self) -> Result<Vec<PlanRecord>>;

    /// Ask the process running `id` to stop dispatching
    async fn request_abort(&self, id: PlanId) -> Result<()>;

    async fn abort_requested(&self, id: PlanId) -> Result<bool>;
}

/// Poll `store` for an abort request and cancel `token` when one appears
pub fn watch_abort(
    store: Arc<dyn PlanStore>,
    id: PlanId,
    token: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }

            match store.abort_requested(id).await {
                Ok(true) => {
                    info!(plan_id = %id, "Abort requested by operator");
                    token.cancel();
                    return;
                }
                Ok(false) => {}
                Err(e) => warn!(plan_id = %id, error = %e, "Failed to check for abort request"),
            }
        }
    })
}

/// In-memory plan store
#[derive(Default)]
pub struct InMemoryPlanStore {
    plans: DashMap<PlanId, PlanRecord>,
    aborts: DashSet<PlanId>,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanStore for InMemoryPlanStore {
    async fn save(&self, record: &PlanRecord) -> Result<()> {
        self.plans.insert(record.plan.id(), record.clone());
        Ok(())
    }

    async fn load(&self, id: PlanId) -> Result<Option<PlanRecord>> {
        Ok(self.plans.get(&id).map(|r| r.clone()))
    }

    async fn list(&self) -> Result<Vec<PlanRecord>> {
        let mut records: Vec<PlanRecord> = self.plans.iter().map(|r| r.clone()).collect();
        records.sort_by(|a, b| b.plan.created_at().cmp(&a.plan.created_at()));
        Ok(records)
    }

    async fn request_abort(&self, id: PlanId) -> Result<()> {
        self.aborts.insert(id);
        Ok(())
    }

    async fn abort_requested(&self, id: PlanId) -> Result<bool> {
        Ok(self.aborts.contains(&id))
    }
}

/// Plan store under one directory: `<id>.json` per plan, `<id>.abort`
/// markers for abort requests
pub struct FilePlanStore {
    dir: PathBuf,
}

impl FilePlanStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: PlanId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn abort_path(&self, id: PlanId) -> PathBuf {
        self.dir.join(format!("{}.abort", id))
    }
}

#[async_trait]
impl PlanStore for FilePlanStore {
    async fn save(&self, record: &PlanRecord) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(record)?;
        let path = self.record_path(record.plan.id());
        let tmp_path = self.dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));

        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        debug!(plan_id = %record.plan.id(), status = %record.report.status, "Plan saved");
        Ok(())
    }

    async fn load(&self, id: PlanId) -> Result<Option<PlanRecord>> {
        match tokio::fs::read(self.record_path(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<PlanRecord>> {
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_record = path.extension().is_some_and(|ext| ext == "json")
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_record {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            let record: PlanRecord = serde_json::from_slice(&bytes).map_err(|e| {
                CoordinatorError::Store(format!("corrupt plan file {}: {}", path.display(), e))
            })?;
            records.push(record);
        }

        records.sort_by(|a, b| b.plan.created_at().cmp(&a.plan.created_at()));
        Ok(records)
    }

    async fn request_abort(&self, id: PlanId) -> Result<()> {
        tokio::fs::write(self.abort_path(id), chrono::Utc::now().to_rfc3339()).await?;
        Ok(())
    }

    async fn abort_requested(&self, id: PlanId) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.abort_path(id)).await?)
    }
}
