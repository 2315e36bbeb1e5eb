//! Target registry trait
//!
//! The TargetRegistry holds every known deployment target and its last
//! observed state.

use crate::error::{RegistryError, Result};
use async_trait::async_trait;
use rollout_types::{LifecycleState, Target, TargetId};
use std::fs::File;
use std::sync::Arc;

/// Registry of deployment targets
#[async_trait]
pub trait TargetRegistry: Send + Sync {
    /// Get a target by id
    async fn get(&self, id: &TargetId) -> Result<Target>;

    /// Atomically replace the whole record; durable before returning
    async fn upsert(&self, target: Target) -> Result<()>;

    /// Point-in-time snapshot of the targets matching `filter`, ordered by id
    async fn list(&self, filter: &TargetFilter) -> Result<TargetSnapshot>;

    /// Exclusive claim on one target, held for a whole reconciliation.
    ///
    /// Registries shared between processes wait here for other holders and
    /// refresh the target from storage once the claim is granted. The
    /// default suits registries owned by a single process, where the
    /// reconciler's own lock already serializes writers.
    async fn claim(&self, _id: &TargetId) -> Result<TargetClaim> {
        Ok(TargetClaim::local())
    }

    /// Add a target that must not exist yet
    async fn register(&self, target: Target) -> Result<()> {
        if !target.id.is_path_safe() {
            return Err(RegistryError::InvalidTargetId(target.id.to_string()));
        }
        match self.get(&target.id).await {
            Ok(_) => Err(RegistryError::TargetAlreadyExists(target.id.clone())),
            Err(RegistryError::TargetNotFound(_)) => self.upsert(target).await,
            Err(e) => Err(e),
        }
    }

    /// Mark a target decommissioned; targets are never deleted
    async fn decommission(&self, id: &TargetId) -> Result<Target> {
        let mut target = self.get(id).await?;
        if !target.decommissioned {
            target.decommissioned = true;
            target.touch();
            self.upsert(target.clone()).await?;
        }
        Ok(target)
    }
}

/// Guard returned by [`TargetRegistry::claim`]; the claim ends on drop
#[derive(Debug, Default)]
pub struct TargetClaim {
    lock_file: Option<File>,
}

impl TargetClaim {
    /// Claim with nothing to release outside this process
    pub fn local() -> Self {
        Self::default()
    }

    /// Claim backed by an exclusive OS lock on `lock_file`
    pub fn locked(lock_file: File) -> Self {
        Self {
            lock_file: Some(lock_file),
        }
    }

    pub fn is_local(&self) -> bool {
        self.lock_file.is_none()
    }
}

impl Drop for TargetClaim {
    fn drop(&mut self) {
        if let Some(file) = &self.lock_file {
            let _ = fs2::FileExt::unlock(file);
        }
    }
}

/// Selection criteria for [`TargetRegistry::list`]
#[derive(Debug, Clone, Default)]
pub struct TargetFilter {
    /// Only targets in this state
    pub state: Option<LifecycleState>,

    /// Only targets carrying this label value
    pub label: Option<(String, String)>,

    /// Include decommissioned targets
    pub include_decommissioned: bool,
}

impl TargetFilter {
    /// Every target that is still in service
    pub fn active() -> Self {
        Self::default()
    }

    /// Every target, decommissioned ones included
    pub fn all() -> Self {
        Self {
            include_decommissioned: true,
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: LifecycleState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.label = Some((key.into(), value.into()));
        self
    }

    pub fn matches(&self, target: &Target) -> bool {
        if target.decommissioned && !self.include_decommissioned {
            return false;
        }
        if let Some(state) = self.state {
            if target.state != state {
                return false;
            }
        }
        if let Some((key, value)) = &self.label {
            if target.labels.get(key) != Some(value) {
                return false;
            }
        }
        true
    }
}

/// Immutable snapshot returned by [`TargetRegistry::list`]
///
/// Iteration is lazy and can be restarted any number of times; later
/// registry writes are not reflected.
#[derive(Debug, Clone)]
pub struct TargetSnapshot {
    targets: Arc<[Target]>,
}

impl TargetSnapshot {
    pub(crate) fn collect(
        targets: impl Iterator<Item = Target>,
        filter: &TargetFilter,
    ) -> Self {
        let mut selected: Vec<Target> = targets.filter(|t| filter.matches(t)).collect();
        selected.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            targets: selected.into(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Target> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn ids(&self) -> Vec<TargetId> {
        self.targets.iter().map(|t| t.id.clone()).collect()
    }
}

impl<'a> IntoIterator for &'a TargetSnapshot {
    type Item = &'a Target;
    type IntoIter = std::slice::Iter<'a, Target>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
