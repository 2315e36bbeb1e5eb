//! File-backed target registry
//!
//! Each target is stored as `<dir>/<target-id>.json`. Writes are atomic and
//! durable: the record goes to a temp file that is fsynced, renamed over the
//! old one, and the directory is fsynced before `upsert` returns.
//!
//! Several processes may open the same directory. `claim` takes an exclusive
//! `flock` on `<dir>/<target-id>.lock` and re-reads the record under it, so
//! a reconciliation never starts from a stale cached copy. Lock files are
//! left in place.

use crate::error::{RegistryError, Result};
use crate::registry::{TargetClaim, TargetFilter, TargetRegistry, TargetSnapshot};
use async_trait::async_trait;
use dashmap::DashMap;
use fs2::FileExt;
use rollout_types::{Target, TargetId};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Durable JSON-per-target registry with an in-memory read cache
pub struct FileTargetRegistry {
    dir: PathBuf,
    cache: Arc<DashMap<TargetId, Target>>,
}

impl FileTargetRegistry {
    /// Open (creating if needed) a registry directory and load every record
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let cache = DashMap::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let target = read_target(&path)?;
            cache.insert(target.id.clone(), target);
        }

        debug!(dir = %dir.display(), targets = cache.len(), "Loaded target registry");

        Ok(Self {
            dir,
            cache: Arc::new(cache),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &TargetId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn lock_path_for(&self, id: &TargetId) -> PathBuf {
        self.dir.join(format!("{}.lock", id))
    }
}

fn read_target(path: &Path) -> Result<Target> {
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| RegistryError::Storage(format!("{}: {}", path.display(), e)))
}

/// Block until the lock is ours, then read the record it guards
fn lock_and_read(lock_path: &Path, path: &Path) -> Result<(File, Option<Target>)> {
    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)?;
    FileExt::lock_exclusive(&lock_file)?;

    let target = match read_target(path) {
        Ok(target) => Some(target),
        Err(RegistryError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };
    Ok((lock_file, target))
}

fn write_durably(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp_path = dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));

    let mut file = File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    // persist the rename itself
    File::open(dir)?.sync_all()
}

#[async_trait]
impl TargetRegistry for FileTargetRegistry {
    async fn get(&self, id: &TargetId) -> Result<Target> {
        self.cache
            .get(id)
            .map(|t| t.clone())
            .ok_or_else(|| RegistryError::TargetNotFound(id.clone()))
    }

    #[instrument(skip(self, target), fields(target_id = %target.id))]
    async fn upsert(&self, target: Target) -> Result<()> {
        if !target.id.is_path_safe() {
            return Err(RegistryError::InvalidTargetId(target.id.to_string()));
        }

        let bytes = serde_json::to_vec_pretty(&target)?;
        let dir = self.dir.clone();
        let path = self.path_for(&target.id);

        tokio::task::spawn_blocking(move || write_durably(&dir, &path, &bytes))
            .await
            .map_err(|e| RegistryError::Storage(format!("write task failed: {}", e)))??;

        self.cache.insert(target.id.clone(), target);
        Ok(())
    }

    async fn list(&self, filter: &TargetFilter) -> Result<TargetSnapshot> {
        Ok(TargetSnapshot::collect(
            self.cache.iter().map(|t| t.value().clone()),
            filter,
        ))
    }

    #[instrument(skip(self), fields(target_id = %id))]
    async fn claim(&self, id: &TargetId) -> Result<TargetClaim> {
        if !id.is_path_safe() {
            return Err(RegistryError::InvalidTargetId(id.to_string()));
        }

        let lock_path = self.lock_path_for(id);
        let path = self.path_for(id);
        let (lock_file, target) = tokio::task::spawn_blocking(move || lock_and_read(&lock_path, &path))
            .await
            .map_err(|e| RegistryError::Storage(format!("lock task failed: {}", e)))??;

        match target {
            Some(target) => {
                self.cache.insert(id.clone(), target);
            }
            None => {
                self.cache.remove(id);
            }
        }
        debug!("Target claimed");
        Ok(TargetClaim::locked(lock_file))
    }
}
