//! In-memory target registry
//!
//! Suitable for tests and for embedding the reconciler in another process.
//! Nothing survives a restart; use [`crate::FileTargetRegistry`] for that.

use crate::error::{RegistryError, Result};
use crate::registry::{TargetFilter, TargetRegistry, TargetSnapshot};
use async_trait::async_trait;
use dashmap::DashMap;
use rollout_types::{Target, TargetId};

/// In-memory target registry
pub struct InMemoryTargetRegistry {
    targets: DashMap<TargetId, Target>,
}

impl InMemoryTargetRegistry {
    pub fn new() -> Self {
        Self {
            targets: DashMap::new(),
        }
    }

    /// Registry pre-populated with `targets`
    pub fn with_targets(targets: impl IntoIterator<Item = Target>) -> Self {
        let registry = Self::new();
        for target in targets {
            registry.targets.insert(target.id.clone(), target);
        }
        registry
    }
}

impl Default for InMemoryTargetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TargetRegistry for InMemoryTargetRegistry {
    async fn get(&self, id: &TargetId) -> Result<Target> {
        self.targets
            .get(id)
            .map(|t| t.clone())
            .ok_or_else(|| RegistryError::TargetNotFound(id.clone()))
    }

    async fn upsert(&self, target: Target) -> Result<()> {
        self.targets.insert(target.id.clone(), target);
        Ok(())
    }

    async fn list(&self, filter: &TargetFilter) -> Result<TargetSnapshot> {
        Ok(TargetSnapshot::collect(
            self.targets.iter().map(|t| t.value().clone()),
            filter,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollout_types::LifecycleState;
    use semver::Version;

    #[tokio::test]
    async fn test_get_and_upsert() {
        let registry = InMemoryTargetRegistry::new();
        let id = TargetId::new("site-a");

        assert!(matches!(
            registry.get(&id).await,
            Err(RegistryError::TargetNotFound(_))
        ));

        registry.upsert(Target::new("site-a")).await.unwrap();
        let mut target = registry.get(&id).await.unwrap();
        assert_eq!(target.state, LifecycleState::Idle);

        target.observed_version = Some(Version::new(1, 0, 0));
        registry.upsert(target).await.unwrap();
        assert_eq!(
            registry.get(&id).await.unwrap().observed_version,
            Some(Version::new(1, 0, 0))
        );
    }

    #[tokio::test]
    async fn test_list_is_a_snapshot() {
        let registry =
            InMemoryTargetRegistry::with_targets([Target::new("b"), Target::new("a")]);

        let snapshot = registry.list(&TargetFilter::active()).await.unwrap();
        registry.upsert(Target::new("c")).await.unwrap();

        assert_eq!(snapshot.ids(), vec![TargetId::new("a"), TargetId::new("b")]);
        // restartable
        assert_eq!(snapshot.iter().count(), 2);
        assert_eq!(snapshot.iter().count(), 2);
    }

    #[tokio::test]
    async fn test_filters() {
        let mut failed = Target::new("x").with_label("region", "eu");
        failed.state = LifecycleState::Failed;
        let registry = InMemoryTargetRegistry::with_targets([
            failed,
            Target::new("y").with_label("region", "us"),
        ]);

        let by_state = registry
            .list(&TargetFilter::active().with_state(LifecycleState::Failed))
            .await
            .unwrap();
        assert_eq!(by_state.ids(), vec![TargetId::new("x")]);

        let by_label = registry
            .list(&TargetFilter::active().with_label("region", "us"))
            .await
            .unwrap();
        assert_eq!(by_label.ids(), vec![TargetId::new("y")]);
    }

    #[tokio::test]
    async fn test_register_and_decommission() {
        let registry = InMemoryTargetRegistry::new();
        registry.register(Target::new("site-a")).await.unwrap();
        assert!(matches!(
            registry.register(Target::new("site-a")).await,
            Err(RegistryError::TargetAlreadyExists(_))
        ));
        assert!(matches!(
            registry.register(Target::new("a/b")).await,
            Err(RegistryError::InvalidTargetId(_))
        ));

        let target = registry.decommission(&TargetId::new("site-a")).await.unwrap();
        assert!(target.decommissioned);

        assert!(registry.list(&TargetFilter::active()).await.unwrap().is_empty());
        assert_eq!(registry.list(&TargetFilter::all()).await.unwrap().len(), 1);
    }
}
