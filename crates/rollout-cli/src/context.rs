//! Wiring of the stores and collaborators a command needs

use crate::config::{CliConfig, StatePaths};
use crate::error::{CliError, CliResult};
use rollout_artifact::{ArtifactResolver, DirectoryArtifactStore};
use rollout_coordinator::{Coordinator, FilePlanStore};
use rollout_health::StepProber;
use rollout_observability::{AuditSink, FileAuditSink};
use rollout_reconciler::{
    CommandInstaller, EnvSecretStore, FileRecordStore, Reconciler, SecretStore, StaticSecretStore,
};
use rollout_registry::FileTargetRegistry;
use std::sync::Arc;
use tracing::debug;

/// Durable state shared by every command
pub struct Context {
    config: CliConfig,
    paths: StatePaths,
    pub registry: Arc<FileTargetRegistry>,
    pub plans: Arc<FilePlanStore>,
}

impl Context {
    pub async fn open(config: CliConfig, paths: StatePaths) -> CliResult<Self> {
        debug!(state_dir = %paths.root.display(), "Opening state");
        let registry = Arc::new(FileTargetRegistry::open(paths.targets())?);
        let plans = Arc::new(FilePlanStore::open(paths.plans()).await?);
        Ok(Self {
            config,
            paths,
            registry,
            plans,
        })
    }

    pub async fn records(&self) -> CliResult<Arc<FileRecordStore>> {
        Ok(Arc::new(FileRecordStore::open(self.paths.records()).await?))
    }

    pub async fn audit(&self) -> CliResult<Arc<FileAuditSink>> {
        Ok(Arc::new(FileAuditSink::open(self.paths.audit_log.clone()).await?))
    }

    /// Reconciler over the durable stores; needs a configured install action
    pub async fn reconciler(&self, audit: Arc<dyn AuditSink>) -> CliResult<Reconciler> {
        let program = self.config.install.program.clone().ok_or_else(|| {
            CliError::Config("no install action configured; set install.program".into())
        })?;
        let installer = Arc::new(CommandInstaller::new(program, self.config.install.args.clone()));

        let secrets: Arc<dyn SecretStore> = match &self.config.secrets.env_var {
            Some(var) => {
                let mut store = EnvSecretStore::new(var.clone());
                if let Some(username) = &self.config.secrets.username {
                    store = store.with_username(username.clone());
                }
                Arc::new(store)
            }
            None => Arc::new(StaticSecretStore::anonymous()),
        };

        let resolver = Arc::new(ArtifactResolver::new(Arc::new(DirectoryArtifactStore::new(
            self.paths.artifacts.clone(),
        ))));

        Ok(Reconciler::new(
            self.registry.clone(),
            resolver,
            Arc::new(StepProber::new()?),
            installer,
            secrets,
        )
        .with_records(self.records().await?)
        .with_audit(audit)
        .with_lease_ttl(self.config.secrets.lease_ttl()))
    }

    /// Coordinator and reconciler sharing one audit chain
    pub async fn coordinator(&self) -> CliResult<Coordinator> {
        let audit: Arc<dyn AuditSink> = self.audit().await?;
        let reconciler = self.reconciler(audit.clone()).await?;
        Ok(Coordinator::new(Arc::new(reconciler))
            .with_audit(audit)
            .with_plan_store(self.plans.clone()))
    }
}
