//! Rollout Coordinator - canary first, then batched fan-out
//!
//! The coordinator owns one `DeploymentPlan` per run. It dispatches the
//! canary batch, then the remaining batches in plan order, each bounded by
//! `max_parallel` concurrent reconciliations. After every batch the
//! cumulative failure ratio is compared with the plan's threshold; once it
//! is exceeded no further batch is dispatched. Targets already dispatched
//! always run to a terminal state.
//!
//! The coordinator never retries at the plan level. Retries happen only
//! inside each target's state machine.

use crate::error::{CoordinatorError, Result};
use crate::plan_store::{watch_abort, PlanRecord, PlanStore};
use futures::future::join_all;
use rollout_observability::{AuditEvent, AuditSink, PartialAuditRecord};
use rollout_reconciler::{ReconcileRequest, Reconciler};
use rollout_registry::RegistryError;
use rollout_types::{
    AbortReason, Batch, DeploymentPlan, FailureKind, PlanStatus, RolloutEvent,
    RolloutEventEnvelope, RolloutReport, TargetOutcome, TargetResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

const DEFAULT_ABORT_POLL: Duration = Duration::from_secs(1);

/// Runs deployment plans against a reconciler
pub struct Coordinator {
    reconciler: Arc<Reconciler>,
    event_tx: broadcast::Sender<RolloutEventEnvelope>,
    audit: Option<Arc<dyn AuditSink>>,
    plans: Option<Arc<dyn PlanStore>>,
    abort_poll: Duration,
}

impl Coordinator {
    /// Create a coordinator publishing on the reconciler's event channel
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        let event_tx = reconciler.event_sender();
        Self {
            reconciler,
            event_tx,
            audit: None,
            plans: None,
            abort_poll: DEFAULT_ABORT_POLL,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Persist progress to `store` and honour abort requests found there
    pub fn with_plan_store(mut self, store: Arc<dyn PlanStore>) -> Self {
        self.plans = Some(store);
        self
    }

    pub fn with_abort_poll(mut self, interval: Duration) -> Self {
        self.abort_poll = interval;
        self
    }

    /// Subscribe to plan, batch and target events
    pub fn subscribe(&self) -> broadcast::Receiver<RolloutEventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Reject plans naming targets that are unknown or decommissioned
    pub async fn validate(&self, plan: &DeploymentPlan) -> Result<()> {
        let registry = self.reconciler.registry();
        for id in plan.targets() {
            match registry.get(id).await {
                Ok(target) if target.decommissioned => {
                    return Err(CoordinatorError::DecommissionedTarget(id.clone()))
                }
                Ok(_) => {}
                Err(RegistryError::TargetNotFound(_)) => {
                    return Err(CoordinatorError::UnknownTarget(id.clone()))
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Run `plan` to completion or abort.
    ///
    /// Cancelling `cancel` (directly, or through an abort request in the plan
    /// store) stops dispatch of new batches; in-flight targets observe the
    /// cancellation at their next state boundary.
    #[instrument(skip_all, fields(plan_id = %plan.id(), version = %plan.desired_version()))]
    pub async fn run(&self, plan: &DeploymentPlan, cancel: &CancellationToken) -> Result<RolloutReport> {
        self.validate(plan).await?;

        let policy = plan.policy();
        let batches = plan.batches();
        let mut report = RolloutReport::new(plan);
        report.status = PlanStatus::Running;
        self.save(plan, &report).await;

        let watcher = self
            .plans
            .as_ref()
            .map(|store| watch_abort(store.clone(), plan.id(), cancel.clone(), self.abort_poll));

        info!(
            targets = plan.targets().len(),
            batches = batches.len(),
            max_parallel = policy.max_parallel,
            failure_threshold = policy.failure_threshold,
            "Rollout started"
        );
        self.emit(RolloutEvent::PlanStarted {
            plan_id: plan.id(),
            desired_version: plan.desired_version().clone(),
            targets: plan.targets().len(),
            batches: batches.len(),
        });
        self.audit(
            PartialAuditRecord::new(
                "coordinator",
                AuditEvent::PlanStarted {
                    targets: plan.targets().len(),
                },
            )
            .version(plan.desired_version().clone())
            .plan(Some(plan.id())),
        )
        .await;

        let semaphore = Arc::new(Semaphore::new(policy.max_parallel));
        let mut abort = None;

        for (position, batch) in batches.iter().enumerate() {
            if cancel.is_cancelled() {
                abort = Some(AbortReason::Operator);
                break;
            }

            info!(
                batch = batch.index,
                canary = batch.canary,
                targets = batch.targets.len(),
                "Dispatching batch"
            );
            self.emit(RolloutEvent::BatchStarted {
                plan_id: plan.id(),
                index: batch.index,
                canary: batch.canary,
                targets: batch.targets.len(),
            });

            let outcomes = self.dispatch(plan, batch, &semaphore, cancel).await;
            let failures = outcomes.iter().filter(|o| o.result.is_failure()).count();
            for outcome in outcomes {
                self.emit(RolloutEvent::TargetFinished {
                    plan_id: plan.id(),
                    target_id: outcome.target_id.clone(),
                    result: outcome.result,
                });
                report.record(outcome);
            }

            let ratio = report.failure_ratio();
            info!(batch = batch.index, failures, failure_ratio = ratio, "Batch completed");
            self.emit(RolloutEvent::BatchCompleted {
                plan_id: plan.id(),
                index: batch.index,
                failures,
                failure_ratio: ratio,
            });
            self.save(plan, &report).await;

            // a breach by the last batch leaves nothing to halt
            let remaining = batches.len() - position - 1;
            if ratio > policy.failure_threshold && remaining == 0 {
                warn!(
                    failure_ratio = ratio,
                    threshold = policy.failure_threshold,
                    "Failure threshold exceeded by the last batch"
                );
            } else if ratio > policy.failure_threshold {
                warn!(
                    remaining,
                    failure_ratio = ratio,
                    threshold = policy.failure_threshold,
                    "Failure threshold exceeded, halting dispatch"
                );
                abort = Some(AbortReason::FailureThreshold {
                    ratio,
                    threshold: policy.failure_threshold,
                });
                break;
            }
        }

        if let Some(watcher) = watcher {
            watcher.abort();
        }

        let cancelled = report.count(|r| matches!(r, TargetResult::Cancelled)) > 0;
        if abort.is_none() && cancelled {
            abort = Some(AbortReason::Operator);
        }

        report.status = match abort {
            Some(reason) => {
                warn!(reason = %reason, "Rollout aborted");
                self.emit(RolloutEvent::PlanAborted {
                    plan_id: plan.id(),
                    reason: reason.clone(),
                });
                PlanStatus::Aborted { reason }
            }
            None => {
                let failed = report.unsuccessful();
                if failed.is_empty() {
                    PlanStatus::Succeeded
                } else {
                    PlanStatus::PartiallySucceeded { failed }
                }
            }
        };
        report.finished_at = Some(chrono::Utc::now());
        self.save(plan, &report).await;

        info!(
            status = %report.status,
            succeeded = report.succeeded(),
            failed = report.failed(),
            untouched = report.untouched(),
            "Rollout finished"
        );
        self.emit(RolloutEvent::PlanFinished {
            plan_id: plan.id(),
            status: report.status.clone(),
        });
        self.audit(
            PartialAuditRecord::new(
                "coordinator",
                AuditEvent::PlanFinished {
                    status: report.status.clone(),
                },
            )
            .version(plan.desired_version().clone())
            .plan(Some(plan.id())),
        )
        .await;

        Ok(report)
    }

    /// Reconcile every target of `batch`, at most `max_parallel` at a time,
    /// and wait for all of them
    async fn dispatch(
        &self,
        plan: &DeploymentPlan,
        batch: &Batch,
        semaphore: &Arc<Semaphore>,
        cancel: &CancellationToken,
    ) -> Vec<TargetOutcome> {
        let handles: Vec<_> = batch
            .targets
            .iter()
            .map(|id| {
                let reconciler = self.reconciler.clone();
                let semaphore = semaphore.clone();
                let cancel = cancel.clone();
                let request = ReconcileRequest::from_plan(plan, id.clone());

                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    reconciler.reconcile(&request, &cancel).await
                })
            })
            .collect();

        let results = join_all(handles).await;

        batch
            .targets
            .iter()
            .zip(results)
            .map(|(id, joined)| {
                let (result, message) = match joined {
                    Ok(Ok(outcome)) => {
                        let message = if outcome.result.is_success() {
                            None
                        } else {
                            outcome.target.last_error.as_ref().map(|e| e.to_string())
                        };
                        (outcome.result, message)
                    }
                    Ok(Err(e)) => {
                        error!(target_id = %id, error = %e, "Reconciliation stopped by infrastructure fault");
                        (
                            TargetResult::Failed {
                                kind: FailureKind::Unreachable,
                            },
                            Some(e.to_string()),
                        )
                    }
                    Err(e) => {
                        error!(target_id = %id, error = %e, "Reconciliation task failed");
                        (
                            TargetResult::Failed {
                                kind: FailureKind::Unreachable,
                            },
                            Some(format!("reconciliation task failed: {}", e)),
                        )
                    }
                };

                TargetOutcome {
                    target_id: id.clone(),
                    result,
                    batch: Some(batch.index),
                    message,
                }
            })
            .collect()
    }

    async fn save(&self, plan: &DeploymentPlan, report: &RolloutReport) {
        let Some(store) = &self.plans else {
            return;
        };
        let record = PlanRecord {
            plan: plan.clone(),
            report: report.clone(),
        };
        if let Err(e) = store.save(&record).await {
            warn!(error = %e, "Failed to persist plan progress");
        }
    }

    async fn audit(&self, record: PartialAuditRecord) {
        if let Some(sink) = &self.audit {
            if let Err(e) = sink.write(record).await {
                error!(error = %e, "Failed to write audit record");
            }
        }
    }

    fn emit(&self, event: RolloutEvent) {
        let _ = self.event_tx.send(RolloutEventEnvelope::new(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan_store::InMemoryPlanStore;
    use rollout_artifact::{ArtifactResolver, InMemoryArtifactStore};
    use rollout_health::{ProbeOutcome, ScriptedProber};
    use rollout_reconciler::{ScriptedInstaller, StaticSecretStore};
    use rollout_registry::{InMemoryTargetRegistry, TargetRegistry};
    use rollout_types::{CanarySpec, PlanSpec, PolicySpec, Target, TargetId};
    use semver::Version;

    struct Fixture {
        prober: Arc<ScriptedProber>,
        installer: Arc<ScriptedInstaller>,
        coordinator: Coordinator,
    }

    fn fixture(targets: &[&str], installer: ScriptedInstaller) -> Fixture {
        let registry = Arc::new(InMemoryTargetRegistry::with_targets(
            targets
                .iter()
                .map(|id| Target::new(*id).with_version(Version::new(1, 0, 0))),
        ));
        let store = Arc::new(InMemoryArtifactStore::new());
        store.publish(Version::new(1, 0, 0), "one", vec![]);
        store.publish(Version::new(2, 0, 0), "two", vec![]);

        let prober = Arc::new(ScriptedProber::healthy());
        let installer = Arc::new(installer);
        let reconciler = Arc::new(Reconciler::new(
            registry,
            Arc::new(ArtifactResolver::new(store)),
            prober.clone(),
            installer.clone(),
            Arc::new(StaticSecretStore::anonymous()),
        ));

        Fixture {
            prober,
            installer,
            coordinator: Coordinator::new(reconciler),
        }
    }

    fn plan(targets: &[&str], policy: PolicySpec) -> DeploymentPlan {
        PlanSpec::new("2.0.0", targets.iter().map(|t| t.to_string()).collect())
            .with_policy(policy)
            .validate()
            .unwrap()
    }

    const TARGETS: [&str; 5] = ["a", "b", "c", "d", "e"];

    #[tokio::test(start_paused = true)]
    async fn test_all_converge() {
        let f = fixture(&TARGETS, ScriptedInstaller::new());
        let plan = plan(
            &TARGETS,
            PolicySpec {
                batch_size: 2,
                ..PolicySpec::default()
            },
        );

        let report = f.coordinator.run(&plan, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.status, PlanStatus::Succeeded);
        assert_eq!(report.succeeded(), 5);
        assert!(report.finished_at.is_some());
        // canary, then [b, c], [d, e]
        assert_eq!(report.outcome_for(&TargetId::new("a")).unwrap().batch, Some(0));
        assert_eq!(report.outcome_for(&TargetId::new("e")).unwrap().batch, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_under_threshold_partially_succeed() {
        let f = fixture(&TARGETS, ScriptedInstaller::new());
        f.prober.script("c", [ProbeOutcome::unhealthy("500")]);
        let plan = plan(
            &TARGETS,
            PolicySpec {
                failure_threshold: 0.5,
                ..PolicySpec::default()
            },
        );

        let report = f.coordinator.run(&plan, &CancellationToken::new()).await.unwrap();
        assert_eq!(
            report.status,
            PlanStatus::PartiallySucceeded {
                failed: vec![TargetId::new("c")]
            }
        );
        assert_eq!(
            report.outcome_for(&TargetId::new("c")).unwrap().result,
            TargetResult::RolledBack
        );
        assert!(report.outcome_for(&TargetId::new("c")).unwrap().message.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_uses_cumulative_ratio() {
        let f = fixture(&TARGETS, ScriptedInstaller::new());
        f.prober.script("b", [ProbeOutcome::unhealthy("500")]);
        // canary [a] ok, batch [b, c] has 1 of 3 dispatched failing
        let plan = plan(
            &TARGETS,
            PolicySpec {
                batch_size: 2,
                failure_threshold: 0.3,
                ..PolicySpec::default()
            },
        );

        let report = f.coordinator.run(&plan, &CancellationToken::new()).await.unwrap();
        match &report.status {
            PlanStatus::Aborted {
                reason: AbortReason::FailureThreshold { ratio, threshold },
            } => {
                assert!((ratio - 1.0 / 3.0).abs() < 1e-9);
                assert_eq!(*threshold, 0.3);
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(report.untouched(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_breach_in_last_batch_completes_plan() {
        let f = fixture(&["a", "b"], ScriptedInstaller::new());
        f.prober.script("b", [ProbeOutcome::unhealthy("500")]);
        // canary [a] ok, then [b] is the last batch
        let plan = plan(&["a", "b"], PolicySpec::default());

        let report = f.coordinator.run(&plan, &CancellationToken::new()).await.unwrap();
        assert_eq!(
            report.status,
            PlanStatus::PartiallySucceeded {
                failed: vec![TargetId::new("b")]
            }
        );
        assert_eq!(report.untouched(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_batch_failure_is_partial_success() {
        let f = fixture(&["a"], ScriptedInstaller::new());
        f.prober.script("a", [ProbeOutcome::unhealthy("500")]);

        let report = f
            .coordinator
            .run(&plan(&["a"], PolicySpec::default()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            report.status,
            PlanStatus::PartiallySucceeded {
                failed: vec![TargetId::new("a")]
            }
        );
        assert_eq!(report.status.exit_code(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_parallel_bounds_fan_out() {
        let targets = ["a", "b", "c", "d", "e", "f", "g"];
        let f = fixture(
            &targets,
            ScriptedInstaller::new().with_delay(Duration::from_millis(50)),
        );
        let plan = plan(
            &targets,
            PolicySpec {
                batch_size: 6,
                max_parallel: 2,
                ..PolicySpec::default()
            },
        );

        let report = f.coordinator.run(&plan, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.status, PlanStatus::Succeeded);
        assert!(f.installer.peak_in_flight_total() <= 2);
        assert_eq!(f.installer.total_installs(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_and_decommissioned_targets_rejected() {
        let f = fixture(&["a"], ScriptedInstaller::new());
        let err = f
            .coordinator
            .run(&plan(&["a", "ghost"], PolicySpec::default()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::UnknownTarget(_)));
        assert!(err.is_invalid_input());
        assert_eq!(f.installer.total_installs(), 0);

        f.coordinator
            .reconciler
            .registry()
            .decommission(&TargetId::new("a"))
            .await
            .unwrap();
        let err = f
            .coordinator
            .run(&plan(&["a"], PolicySpec::default()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::DecommissionedTarget(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_touches_nothing() {
        let f = fixture(&TARGETS, ScriptedInstaller::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = f
            .coordinator
            .run(&plan(&TARGETS, PolicySpec::default()), &cancel)
            .await
            .unwrap();
        assert_eq!(
            report.status,
            PlanStatus::Aborted {
                reason: AbortReason::Operator
            }
        );
        assert_eq!(report.untouched(), 5);
        assert_eq!(f.installer.total_installs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_request_stops_dispatch() {
        let f = fixture(
            &TARGETS,
            ScriptedInstaller::new().with_delay(Duration::from_secs(1)),
        );
        let store = Arc::new(InMemoryPlanStore::new());
        let coordinator = f
            .coordinator
            .with_plan_store(store.clone())
            .with_abort_poll(Duration::from_millis(100));
        let plan = plan(
            &TARGETS,
            PolicySpec {
                canary: CanarySpec::size(1),
                ..PolicySpec::default()
            },
        );
        store.request_abort(plan.id()).await.unwrap();

        let report = coordinator.run(&plan, &CancellationToken::new()).await.unwrap();

        // the canary's install was already dispatched and ran to completion
        assert_eq!(
            report.outcome_for(&TargetId::new("a")).unwrap().result,
            TargetResult::Converged
        );
        assert_eq!(report.untouched(), 4);
        assert_eq!(
            report.status,
            PlanStatus::Aborted {
                reason: AbortReason::Operator
            }
        );

        let saved = store.load(plan.id()).await.unwrap().unwrap();
        assert_eq!(saved.report, report);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_bracket_the_plan() {
        let f = fixture(&["a", "b"], ScriptedInstaller::new());
        let mut events = f.coordinator.subscribe();

        f.coordinator
            .run(&plan(&["a", "b"], PolicySpec::default()), &CancellationToken::new())
            .await
            .unwrap();

        let mut kinds = Vec::new();
        while let Ok(envelope) = events.try_recv() {
            kinds.push(envelope.event);
        }
        assert!(matches!(kinds.first(), Some(RolloutEvent::PlanStarted { .. })));
        assert!(matches!(kinds.last(), Some(RolloutEvent::PlanFinished { .. })));
        let finished = kinds
            .iter()
            .filter(|e| matches!(e, RolloutEvent::TargetFinished { .. }))
            .count();
        assert_eq!(finished, 2);
    }
}
