//! Reconciler - drives one target to one desired version
//!
//! ```text
//! Idle ─▶ Fetching ─▶ Installing ─▶ Verifying ─▶ Converged
//!            │            │             │
//!            │            └──────┬──────┘
//!            │                   ▼
//!            │              RollingBack ─▶ RolledBack
//!            ▼                   │
//!          Failed ◀──────────────┘
//! ```
//!
//! Every collaborator result is classified into a [`FailureKind`] before the
//! state machine acts on it. `NotFound` and `Unreachable` are retried with
//! backoff and counted against the request's attempt budget; `Corrupt` fails
//! immediately; `Unhealthy` and install failures roll back to the last
//! known-good version.
//!
//! Each transition is persisted to the registry before the next step starts,
//! then written to the audit sink and published as an event.

use crate::backoff::delay_for;
use crate::error::{ReconcileError, Result};
use crate::installer::{InstallOutcome, Installer};
use crate::records::{InMemoryRecordStore, RecordStore};
use crate::request::{ReconcileOutcome, ReconcileRequest};
use crate::secrets::{Lease, SecretStore};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rollout_artifact::{ArtifactResolver, ResolveError};
use rollout_health::{HealthProber, ProbeOutcome};
use rollout_observability::{AuditEvent, AuditSink, PartialAuditRecord};
use rollout_registry::{RegistryError, TargetClaim, TargetRegistry};
use rollout_types::{
    Artifact, Credentials, FailureKind, HealthStatus, LifecycleState, PlanId, RecordId,
    RecordOutcome, ReconciliationRecord, RolloutEvent, RolloutEventEnvelope, Target, TargetError,
    TargetId, TargetResult, Transition,
};
use semver::Version;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(15 * 60);

/// Terminal state of one run of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    Converged,
    RolledBack,
    Failed(FailureKind),
    Cancelled,
}

impl Ending {
    fn result(self) -> TargetResult {
        match self {
            Ending::Converged => TargetResult::Converged,
            Ending::RolledBack => TargetResult::RolledBack,
            Ending::Failed(kind) => TargetResult::Failed { kind },
            Ending::Cancelled => TargetResult::Cancelled,
        }
    }

    fn outcome(self) -> RecordOutcome {
        match self {
            Ending::Converged => RecordOutcome::Succeeded,
            Ending::RolledBack => RecordOutcome::RolledBack,
            Ending::Failed(kind) => RecordOutcome::Failed { kind },
            Ending::Cancelled => RecordOutcome::Cancelled,
        }
    }
}

/// Continue with a value, or stop because the run already ended
type Step<T> = ControlFlow<Ending, T>;

/// Per-target convergence engine
pub struct Reconciler {
    registry: Arc<dyn TargetRegistry>,
    resolver: Arc<ArtifactResolver>,
    prober: Arc<dyn HealthProber>,
    installer: Arc<dyn Installer>,
    secrets: Arc<dyn SecretStore>,
    records: Arc<dyn RecordStore>,
    audit: Option<Arc<dyn AuditSink>>,
    /// One lock per target; held for a whole reconciliation
    locks: DashMap<TargetId, Arc<Mutex<()>>>,
    event_tx: broadcast::Sender<RolloutEventEnvelope>,
    lease_ttl: Duration,
}

impl Reconciler {
    pub fn new(
        registry: Arc<dyn TargetRegistry>,
        resolver: Arc<ArtifactResolver>,
        prober: Arc<dyn HealthProber>,
        installer: Arc<dyn Installer>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(4096);

        Self {
            registry,
            resolver,
            prober,
            installer,
            secrets,
            records: Arc::new(InMemoryRecordStore::new()),
            audit: None,
            locks: DashMap::new(),
            event_tx,
            lease_ttl: DEFAULT_LEASE_TTL,
        }
    }

    pub fn with_records(mut self, records: Arc<dyn RecordStore>) -> Self {
        self.records = records;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    pub fn registry(&self) -> &Arc<dyn TargetRegistry> {
        &self.registry
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    /// Sender shared with the coordinator so plan and target events form
    /// one stream
    pub fn event_sender(&self) -> broadcast::Sender<RolloutEventEnvelope> {
        self.event_tx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RolloutEventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Drive the requested target to the desired version.
    ///
    /// Holds the target's lock and its registry claim until a terminal state
    /// is reached, so a second request for the same target, from this process
    /// or another one sharing the registry, waits and then sees the first
    /// one's result.
    /// Only infrastructure faults (unknown target, registry persistence) are
    /// returned as errors.
    #[instrument(skip_all, fields(target_id = %request.target_id, version = %request.desired_version))]
    pub async fn reconcile(
        &self,
        request: &ReconcileRequest,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome> {
        let lock = self.lock_for(&request.target_id);
        let _guard = lock.lock().await;
        let _claim = self.claim(&request.target_id).await?;

        let target = self.load(&request.target_id).await?;

        if !request.force && target.is_converged_on(&request.desired_version) {
            debug!("Target already runs the desired version");
            return Ok(ReconcileOutcome {
                target,
                result: TargetResult::AlreadyConverged,
                record: None,
                install_attempts: 0,
            });
        }

        if cancel.is_cancelled() {
            debug!("Cancelled before the target was touched");
            return Ok(ReconcileOutcome {
                target,
                result: TargetResult::Cancelled,
                record: None,
                install_attempts: 0,
            });
        }

        let mut run = Run::new(self, request, target);
        let ending = run.drive(cancel).await;
        run.release_lease().await;
        run.finish(ending?).await
    }

    /// Reapply the target's last known-good version.
    ///
    /// A target already `RolledBack` is left untouched and no record is
    /// written.
    #[instrument(skip_all, fields(target_id = %target_id))]
    pub async fn rollback(&self, target_id: &TargetId) -> Result<ReconcileOutcome> {
        let lock = self.lock_for(target_id);
        let _guard = lock.lock().await;
        let _claim = self.claim(target_id).await?;

        let target = self.load(target_id).await?;

        if target.state == LifecycleState::RolledBack {
            debug!("Target already rolled back");
            return Ok(ReconcileOutcome {
                target,
                result: TargetResult::RolledBack,
                record: None,
                install_attempts: 0,
            });
        }

        if !target.state.can_transition_to(LifecycleState::RollingBack) {
            return Err(ReconcileError::NotRollbackable {
                target: target_id.clone(),
                state: target.state,
            });
        }

        let prior = match target.state {
            LifecycleState::Converged => target.previous_version.clone(),
            _ => target
                .observed_version
                .clone()
                .or_else(|| target.previous_version.clone()),
        }
        .ok_or_else(|| ReconcileError::NoPriorVersion(target_id.clone()))?;

        let away = target
            .observed_version
            .clone()
            .unwrap_or_else(|| prior.clone());
        let request = ReconcileRequest::new(target_id.clone(), away);

        let mut run = Run::new(self, &request, target);
        let ending = run
            .roll_back_to(prior, "operator requested rollback".to_string())
            .await;
        run.release_lease().await;
        run.finish(ending?).await
    }

    fn lock_for(&self, target_id: &TargetId) -> Arc<Mutex<()>> {
        self.locks.entry(target_id.clone()).or_default().clone()
    }

    async fn claim(&self, target_id: &TargetId) -> Result<TargetClaim> {
        match self.registry.claim(target_id).await {
            Ok(claim) => Ok(claim),
            Err(RegistryError::InvalidTargetId(_)) => {
                self.locks.remove(target_id);
                Err(ReconcileError::UnknownTarget(target_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read the target; unknown and decommissioned targets drop their lock
    /// entry since they are never reconciled
    async fn load(&self, target_id: &TargetId) -> Result<Target> {
        let target = match self.registry.get(target_id).await {
            Ok(target) => target,
            Err(RegistryError::TargetNotFound(id)) => {
                self.locks.remove(target_id);
                return Err(ReconcileError::UnknownTarget(id));
            }
            Err(e) => return Err(e.into()),
        };

        if target.decommissioned {
            self.locks.remove(target_id);
            return Err(ReconcileError::Decommissioned(target_id.clone()));
        }
        Ok(target)
    }

    async fn audit(&self, record: PartialAuditRecord) {
        if let Some(sink) = &self.audit {
            if let Err(e) = sink.write(record).await {
                error!(error = %e, "Failed to write audit record");
            }
        }
    }

    fn emit(&self, plan_id: Option<PlanId>, event: RolloutEvent) {
        let mut envelope = RolloutEventEnvelope::new(event);
        if envelope.plan_id.is_none() {
            envelope.plan_id = plan_id;
        }
        // no subscribers is fine
        let _ = self.event_tx.send(envelope);
    }
}

/// State of one reconciliation while the target lock is held
struct Run<'a> {
    reconciler: &'a Reconciler,
    request: &'a ReconcileRequest,
    target: Target,
    /// At-rest state the target returns to when cancelled before install
    resting: LifecycleState,
    started_at: DateTime<Utc>,
    transitions: Vec<Transition>,
    /// Failed external attempts, counted against the attempt budget
    failures: u32,
    install_attempts: u32,
    lease: Option<Lease>,
}

impl<'a> Run<'a> {
    fn new(reconciler: &'a Reconciler, request: &'a ReconcileRequest, target: Target) -> Self {
        Self {
            reconciler,
            request,
            resting: target.state,
            target,
            started_at: Utc::now(),
            transitions: Vec::new(),
            failures: 0,
            install_attempts: 0,
            lease: None,
        }
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<Ending> {
        if !self.target.state.is_at_rest() {
            // a previous process stopped mid-reconciliation
            warn!(state = %self.target.state, "Recovering interrupted reconciliation");
            let reason = format!("reconciliation interrupted in state {}", self.target.state);
            self.transition(LifecycleState::Failed, reason).await?;
        }
        self.resting = self.target.state;

        let desired = self.request.desired_version.clone();
        let reason = match &self.target.observed_version {
            Some(observed) if *observed == desired => format!("reinstalling {}", desired),
            Some(observed) => format!("desired {} differs from observed {}", desired, observed),
            None => format!("installing {} on a fresh target", desired),
        };
        self.transition(LifecycleState::Fetching, reason).await?;

        let artifact = match self.fetch(&desired, cancel).await? {
            ControlFlow::Continue(artifact) => artifact,
            ControlFlow::Break(ending) => return Ok(ending),
        };

        if cancel.is_cancelled() {
            return self.cancel_to_rest().await;
        }

        self.transition(
            LifecycleState::Installing,
            format!("artifact {} verified ({})", artifact.version, artifact.fingerprint),
        )
        .await?;

        match self.install(&artifact).await? {
            ControlFlow::Break(ending) => return Ok(ending),
            ControlFlow::Continue(InstallOutcome::Failed { reason }) => {
                return self.recover(FailureKind::InstallFailed, reason).await;
            }
            ControlFlow::Continue(InstallOutcome::Succeeded) => {}
        }

        self.transition(LifecycleState::Verifying, "install reported success")
            .await?;

        match self.verify(&artifact).await? {
            ControlFlow::Break(ending) => Ok(ending),
            ControlFlow::Continue(Some(reason)) => self.recover(FailureKind::Unhealthy, reason).await,
            ControlFlow::Continue(None) => self.converge().await,
        }
    }

    /// Resolve `version`, retrying `NotFound` with backoff
    async fn fetch(&mut self, version: &Version, cancel: &CancellationToken) -> Result<Step<Artifact>> {
        let timeout = self.request.timeouts.resolve;
        let mut not_found = 0;

        let reconciler = self.reconciler;
        loop {
            let resolved = if self.request.force {
                reconciler.resolver.refresh(version, timeout).await
            } else {
                reconciler.resolver.resolve(version, timeout).await
            };
            let error = match resolved {
                Ok(artifact) => return Ok(ControlFlow::Continue(artifact)),
                Err(e) => e,
            };

            if let ResolveError::Corrupt { .. } = error {
                error!(error = %error, "Artifact is corrupt, escalating");
                return self
                    .fail(FailureKind::Corrupt, error.to_string())
                    .await
                    .map(ControlFlow::Break);
            }

            not_found += 1;
            if let ControlFlow::Break(ending) = self.absorb(error.kind(), error.to_string()).await? {
                return Ok(ControlFlow::Break(ending));
            }
            if not_found >= self.request.resolve_attempts {
                return self
                    .fail(
                        FailureKind::NotFound,
                        format!("{} (gave up after {} attempts)", error, not_found),
                    )
                    .await
                    .map(ControlFlow::Break);
            }
            self.retrying(error.kind());

            // nothing has been dispatched yet, so an abort may land here
            let delay = delay_for(&self.request.backoff, not_found - 1);
            let cancelled = tokio::select! {
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if cancelled {
                return self.cancel_to_rest().await.map(ControlFlow::Break);
            }
        }
    }

    /// Dispatch the install action; timeouts are retried within the budget
    async fn install(&mut self, artifact: &Artifact) -> Result<Step<InstallOutcome>> {
        let timeout = self.request.timeouts.install;
        let mut retry = 0;

        loop {
            let credentials = match self.credentials().await? {
                ControlFlow::Continue(credentials) => credentials,
                ControlFlow::Break(ending) => return Ok(ControlFlow::Break(ending)),
            };

            if artifact.version == self.request.desired_version {
                self.install_attempts += 1;
            }
            debug!(version = %artifact.version, "Dispatching install");

            let apply = self
                .reconciler
                .installer
                .apply(artifact, &self.target, &credentials);
            match tokio::time::timeout(timeout, apply).await {
                Ok(outcome) => return Ok(ControlFlow::Continue(outcome)),
                Err(_) => {
                    let message = format!(
                        "install of {} did not finish within {}ms",
                        artifact.version,
                        timeout.as_millis()
                    );
                    if let ControlFlow::Break(ending) = self.absorb(FailureKind::Unreachable, message).await? {
                        return Ok(ControlFlow::Break(ending));
                    }
                    self.retrying(FailureKind::Unreachable);
                    tokio::time::sleep(delay_for(&self.request.backoff, retry)).await;
                    retry += 1;
                }
            }
        }
    }

    /// Probe until the target answers; `Some(reason)` when unhealthy
    async fn verify(&mut self, artifact: &Artifact) -> Result<Step<Option<String>>> {
        let timeout = self.request.timeouts.probe;
        let mut retry = 0;

        loop {
            let credentials = match self.credentials().await? {
                ControlFlow::Continue(credentials) => credentials,
                ControlFlow::Break(ending) => return Ok(ControlFlow::Break(ending)),
            };

            let probe = self
                .reconciler
                .prober
                .probe(&self.target, &artifact.manifest, &credentials, timeout);
            let outcome = tokio::time::timeout(timeout, probe).await.unwrap_or_else(|_| {
                ProbeOutcome::unreachable(format!("no answer within {}ms", timeout.as_millis()))
            });
            self.target.health = outcome.status();

            match outcome {
                ProbeOutcome::Healthy => return Ok(ControlFlow::Continue(None)),
                ProbeOutcome::Unhealthy { reason } => return Ok(ControlFlow::Continue(Some(reason))),
                ProbeOutcome::Unreachable { reason } => {
                    if let ControlFlow::Break(ending) = self.absorb(FailureKind::Unreachable, reason).await? {
                        return Ok(ControlFlow::Break(ending));
                    }
                    self.retrying(FailureKind::Unreachable);
                    tokio::time::sleep(delay_for(&self.request.backoff, retry)).await;
                    retry += 1;
                }
            }
        }
    }

    /// Credentials from the current lease, re-acquired once it expires
    async fn credentials(&mut self) -> Result<Step<Credentials>> {
        if let Some(lease) = &self.lease {
            if !lease.is_expired() {
                return Ok(ControlFlow::Continue(lease.credentials().clone()));
            }
        }
        if let Some(expired) = self.lease.take() {
            debug!(lease_id = %expired.id(), "Lease expired, re-acquiring");
            self.release(expired).await;
        }

        let timeout = self.request.timeouts.lease;
        let mut retry = 0;
        loop {
            let acquire = self
                .reconciler
                .secrets
                .acquire(&self.target.id, self.reconciler.lease_ttl);
            let message = match tokio::time::timeout(timeout, acquire).await {
                Ok(Ok(lease)) => {
                    let credentials = lease.credentials().clone();
                    self.lease = Some(lease);
                    return Ok(ControlFlow::Continue(credentials));
                }
                Ok(Err(e)) => format!("secret store: {}", e),
                Err(_) => format!("secret store did not answer within {}ms", timeout.as_millis()),
            };

            if let ControlFlow::Break(ending) = self.absorb(FailureKind::Unreachable, message).await? {
                return Ok(ControlFlow::Break(ending));
            }
            self.retrying(FailureKind::Unreachable);
            tokio::time::sleep(delay_for(&self.request.backoff, retry)).await;
            retry += 1;
        }
    }

    /// Roll back after `kind`, or fail when there is nothing to roll back to
    async fn recover(&mut self, kind: FailureKind, reason: String) -> Result<Ending> {
        self.target.last_error = Some(TargetError::new(kind, reason.clone()));

        match self.last_known_good() {
            Some(prior) => self.roll_back_to(prior, format!("{}: {}", kind, reason)).await,
            None => {
                warn!(kind = %kind, "No prior version to roll back to");
                self.fail(kind, format!("{}: {}; no prior version to roll back to", kind, reason))
                    .await
            }
        }
    }

    fn last_known_good(&self) -> Option<Version> {
        match &self.target.observed_version {
            Some(observed) if *observed != self.request.desired_version => Some(observed.clone()),
            _ => self.target.previous_version.clone(),
        }
    }

    async fn roll_back_to(&mut self, prior: Version, reason: String) -> Result<Ending> {
        warn!(prior = %prior, reason = %reason, "Rolling back");
        self.transition(
            LifecycleState::RollingBack,
            format!("{}; rolling back to {}", reason, prior),
        )
        .await?;

        let artifact = match self
            .reconciler
            .resolver
            .resolve(&prior, self.request.timeouts.resolve)
            .await
        {
            Ok(artifact) => artifact,
            Err(e) => {
                error!(error = %e, "Rollback artifact unavailable, escalating");
                return self
                    .fail(e.kind(), format!("rollback artifact {}: {}", prior, e))
                    .await;
            }
        };

        match self.install(&artifact).await? {
            ControlFlow::Break(ending) => return Ok(ending),
            ControlFlow::Continue(InstallOutcome::Failed { reason }) => {
                error!(reason = %reason, "Rollback install failed, escalating");
                return self
                    .fail(
                        FailureKind::InstallFailed,
                        format!("rollback install of {} failed: {}", prior, reason),
                    )
                    .await;
            }
            ControlFlow::Continue(InstallOutcome::Succeeded) => {}
        }

        match self.verify(&artifact).await? {
            ControlFlow::Break(ending) => Ok(ending),
            ControlFlow::Continue(Some(reason)) => {
                error!(reason = %reason, "Rollback failed health verification, escalating");
                self.fail(
                    FailureKind::Unhealthy,
                    format!("rollback to {} unhealthy: {}", prior, reason),
                )
                .await
            }
            ControlFlow::Continue(None) => {
                self.target.observed_version = Some(prior.clone());
                self.target.health = HealthStatus::Healthy;
                self.target.consecutive_failures = 0;
                self.transition(LifecycleState::RolledBack, format!("{} verified healthy", prior))
                    .await?;
                Ok(Ending::RolledBack)
            }
        }
    }

    async fn converge(&mut self) -> Result<Ending> {
        let desired = self.request.desired_version.clone();
        if self.target.observed_version.as_ref() != Some(&desired) {
            self.target.previous_version = self.target.observed_version.take();
        }
        self.target.observed_version = Some(desired.clone());
        self.target.health = HealthStatus::Healthy;
        self.target.last_error = None;
        self.target.consecutive_failures = 0;

        self.transition(LifecycleState::Converged, format!("{} verified healthy", desired))
            .await?;
        Ok(Ending::Converged)
    }

    async fn cancel_to_rest(&mut self) -> Result<Ending> {
        info!(state = %self.resting, "Cancelled before install");
        self.transition(self.resting, "cancelled before install").await?;
        Ok(Ending::Cancelled)
    }

    async fn fail(&mut self, kind: FailureKind, message: String) -> Result<Ending> {
        self.target.last_error = Some(TargetError::new(kind, message.clone()));
        self.transition(LifecycleState::Failed, message).await?;
        Ok(Ending::Failed(kind))
    }

    /// Count one failed external attempt; stops the run once the budget is
    /// spent
    async fn absorb(&mut self, kind: FailureKind, message: String) -> Result<Step<()>> {
        self.failures += 1;
        self.target.consecutive_failures += 1;
        self.target.last_error = Some(TargetError::new(kind, message.clone()));

        if self.failures >= self.request.attempt_budget {
            error!(failures = self.failures, kind = %kind, "Attempt budget exhausted");
            let ending = self
                .fail(
                    FailureKind::AttemptBudgetExceeded,
                    format!("{} failed attempts, last {}: {}", self.failures, kind, message),
                )
                .await?;
            return Ok(ControlFlow::Break(ending));
        }
        Ok(ControlFlow::Continue(()))
    }

    fn retrying(&self, kind: FailureKind) {
        warn!(kind = %kind, attempt = self.failures, budget = self.request.attempt_budget, "Retrying");
        self.reconciler.emit(
            self.request.plan_id,
            RolloutEvent::TargetRetrying {
                target_id: self.target.id.clone(),
                kind,
                attempt: self.failures,
            },
        );
    }

    /// Validate, persist, audit and publish one transition
    async fn transition(&mut self, to: LifecycleState, reason: impl Into<String>) -> Result<()> {
        let from = self.target.state;
        if !from.can_transition_to(to) {
            return Err(ReconcileError::IllegalTransition { from, to });
        }

        let transition = Transition {
            from,
            to,
            at: Utc::now(),
            reason: reason.into(),
        };
        self.target.state = to;
        self.target.touch();
        self.reconciler.registry.upsert(self.target.clone()).await?;

        info!(from = %from, to = %to, reason = %transition.reason, "Target transitioned");

        self.reconciler
            .audit(
                PartialAuditRecord::transition(&self.target.id, &self.request.desired_version, &transition)
                    .plan(self.request.plan_id),
            )
            .await;
        self.reconciler.emit(
            self.request.plan_id,
            RolloutEvent::TargetTransitioned {
                target_id: self.target.id.clone(),
                from,
                to,
            },
        );
        self.transitions.push(transition);
        Ok(())
    }

    async fn release_lease(&mut self) {
        if let Some(lease) = self.lease.take() {
            self.release(lease).await;
        }
    }

    async fn release(&self, lease: Lease) {
        let timeout = self.request.timeouts.lease;
        let lease_id = lease.id();
        let release = self.reconciler.secrets.release(lease);
        if tokio::time::timeout(timeout, release).await.is_err() {
            warn!(lease_id = %lease_id, "Secret store did not confirm lease release");
        }
    }

    async fn finish(mut self, ending: Ending) -> Result<ReconcileOutcome> {
        let record = ReconciliationRecord {
            id: RecordId::generate(),
            target_id: self.target.id.clone(),
            artifact_version: self.request.desired_version.clone(),
            plan_id: self.request.plan_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            outcome: ending.outcome(),
            transitions: std::mem::take(&mut self.transitions),
        };

        if let Err(e) = self.reconciler.records.append(&record).await {
            error!(error = %e, "Failed to append reconciliation record");
        }
        self.reconciler
            .audit(
                PartialAuditRecord::new("reconciler", AuditEvent::Outcome { outcome: record.outcome })
                    .target(self.target.id.clone())
                    .version(self.request.desired_version.clone())
                    .plan(self.request.plan_id),
            )
            .await;

        let result = ending.result();
        info!(
            result = %result,
            transitions = record.transitions.len(),
            install_attempts = self.install_attempts,
            "Reconciliation finished"
        );

        Ok(ReconcileOutcome {
            target: self.target,
            result,
            record: Some(record),
            install_attempts: self.install_attempts,
        })
    }
}
