//! End-to-end rollouts against scripted collaborators

use rollout_artifact::{ArtifactResolver, InMemoryArtifactStore};
use rollout_coordinator::Coordinator;
use rollout_health::{ProbeOutcome, ScriptedProber};
use rollout_observability::{AuditEvent, IntegrityVerifier, MemoryAuditSink};
use rollout_reconciler::{
    InMemoryRecordStore, RecordStore, Reconciler, ScriptedInstaller, StaticSecretStore,
};
use rollout_registry::{InMemoryTargetRegistry, TargetRegistry};
use rollout_types::{
    AbortReason, CanarySpec, DeploymentPlan, FailureKind, Fingerprint, HealthStatus, LifecycleState,
    PlanSpec, PlanStatus, PolicySpec, RecordOutcome, Target, TargetId, TargetResult,
};
use semver::Version;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct World {
    registry: Arc<InMemoryTargetRegistry>,
    artifacts: Arc<InMemoryArtifactStore>,
    prober: Arc<ScriptedProber>,
    installer: Arc<ScriptedInstaller>,
    records: Arc<InMemoryRecordStore>,
    audit: Arc<MemoryAuditSink>,
    coordinator: Coordinator,
}

/// Targets running 1.0.0, with 1.0.0 published
fn world(count: usize) -> World {
    let registry = Arc::new(InMemoryTargetRegistry::with_targets((0..count).map(|i| {
        Target::new(format!("site-{:02}", i)).with_version(Version::new(1, 0, 0))
    })));
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    artifacts.publish(Version::new(1, 0, 0), "release 1.0.0", vec![]);

    let prober = Arc::new(ScriptedProber::healthy());
    let installer = Arc::new(ScriptedInstaller::new());
    let records = Arc::new(InMemoryRecordStore::new());
    let audit = Arc::new(MemoryAuditSink::new());

    let reconciler = Reconciler::new(
        registry.clone(),
        Arc::new(ArtifactResolver::new(artifacts.clone())),
        prober.clone(),
        installer.clone(),
        Arc::new(StaticSecretStore::anonymous()),
    )
    .with_records(records.clone())
    .with_audit(audit.clone());

    let coordinator = Coordinator::new(Arc::new(reconciler)).with_audit(audit.clone());

    World {
        registry,
        artifacts,
        prober,
        installer,
        records,
        audit,
        coordinator,
    }
}

fn plan(count: usize, policy: PolicySpec) -> DeploymentPlan {
    PlanSpec::new(
        "2.0.0",
        (0..count).map(|i| format!("site-{:02}", i)).collect(),
    )
    .with_policy(policy)
    .validate()
    .unwrap()
}

fn site(i: usize) -> TargetId {
    TargetId::new(format!("site-{:02}", i))
}

#[tokio::test(start_paused = true)]
async fn healthy_artifact_converges_in_one_pass() {
    let w = world(1);
    w.artifacts.publish(Version::new(2, 0, 0), "release 2.0.0", vec![]);

    let report = w
        .coordinator
        .run(&plan(1, PolicySpec::default()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, PlanStatus::Succeeded);
    assert_eq!(report.status.exit_code(), 0);

    let target = w.registry.get(&site(0)).await.unwrap();
    assert_eq!(target.state, LifecycleState::Converged);
    assert_eq!(target.observed_version, Some(Version::new(2, 0, 0)));
    assert_eq!(target.health, HealthStatus::Healthy);

    let records = w.records.records_for(&site(0)).await.unwrap();
    assert_eq!(records.len(), 1);
    for state in [
        LifecycleState::Fetching,
        LifecycleState::Installing,
        LifecycleState::Verifying,
    ] {
        assert_eq!(records[0].entries_into(state), 1);
    }
    assert_eq!(w.installer.total_installs(), 1);
}

#[tokio::test(start_paused = true)]
async fn corrupt_artifact_fails_without_installing() {
    let w = world(1);
    w.artifacts.publish_with_fingerprint(
        Version::new(2, 0, 0),
        "truncated download",
        Fingerprint::from_sha256([0xab; 32]),
        vec![],
    );

    let report = w
        .coordinator
        .run(&plan(1, PolicySpec::default()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        report.outcome_for(&site(0)).unwrap().result,
        TargetResult::Failed {
            kind: FailureKind::Corrupt
        }
    );
    assert_eq!(w.installer.total_installs(), 0);
    assert_eq!(
        w.registry.get(&site(0)).await.unwrap().state,
        LifecycleState::Failed
    );

    let records = w.records.records_for(&site(0)).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].outcome,
        RecordOutcome::Failed {
            kind: FailureKind::Corrupt
        }
    );
}

#[tokio::test(start_paused = true)]
async fn unhealthy_install_rolls_back_to_prior_artifact() {
    let w = world(1);
    w.artifacts.publish(Version::new(2, 0, 0), "release 2.0.0", vec![]);
    w.prober.script(site(0), [ProbeOutcome::unhealthy("readiness 503")]);

    let report = w
        .coordinator
        .run(&plan(1, PolicySpec::default()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome_for(&site(0)).unwrap().result, TargetResult::RolledBack);
    assert_eq!(report.status.exit_code(), 1);

    let target = w.registry.get(&site(0)).await.unwrap();
    assert_eq!(target.state, LifecycleState::RolledBack);
    assert_eq!(target.observed_version, Some(Version::new(1, 0, 0)));
    assert_eq!(
        w.installer.installs_for(&site(0)),
        vec![Version::new(2, 0, 0), Version::new(1, 0, 0)]
    );

    let record = w.records.latest_for(&site(0)).await.unwrap().unwrap();
    assert_eq!(record.entries_into(LifecycleState::RollingBack), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_canary_aborts_before_fan_out() {
    let w = world(10);
    w.artifacts.publish(Version::new(2, 0, 0), "release 2.0.0", vec![]);
    w.prober.script(site(0), [ProbeOutcome::unhealthy("crash on start")]);

    let report = w
        .coordinator
        .run(
            &plan(
                10,
                PolicySpec {
                    canary: CanarySpec::size(1),
                    ..PolicySpec::default()
                },
            ),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        report.status,
        PlanStatus::Aborted {
            reason: AbortReason::FailureThreshold {
                ratio: 1.0,
                threshold: 0.0
            }
        }
    );
    assert_eq!(report.status.exit_code(), 1);
    assert_eq!(report.untouched(), 9);

    for i in 1..10 {
        let target = w.registry.get(&site(i)).await.unwrap();
        assert_eq!(target.state, LifecycleState::Idle);
        assert!(w.records.records_for(&site(i)).await.unwrap().is_empty());
    }
    assert!(w.installer.installs_for(&site(5)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn unreachable_target_exhausts_attempt_budget() {
    let w = world(1);
    w.artifacts.publish(Version::new(2, 0, 0), "release 2.0.0", vec![]);
    w.prober.script(
        site(0),
        (0..3).map(|_| ProbeOutcome::unreachable("no response within 10000ms")),
    );

    let report = w
        .coordinator
        .run(
            &plan(
                1,
                PolicySpec {
                    attempt_budget: 3,
                    ..PolicySpec::default()
                },
            ),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        report.outcome_for(&site(0)).unwrap().result,
        TargetResult::Failed {
            kind: FailureKind::AttemptBudgetExceeded
        }
    );
    let target = w.registry.get(&site(0)).await.unwrap();
    assert_eq!(target.state, LifecycleState::Failed);
    assert_eq!(
        target.last_failure_kind(),
        Some(FailureKind::AttemptBudgetExceeded)
    );
    assert_eq!(w.prober.calls_for(&site(0)), 3);
    assert!(w.installer.installs_for(&site(0)).len() <= 3);
}

#[tokio::test(start_paused = true)]
async fn audit_trail_is_chained_and_complete() {
    let w = world(2);
    w.artifacts.publish(Version::new(2, 0, 0), "release 2.0.0", vec![]);

    w.coordinator
        .run(&plan(2, PolicySpec::default()), &CancellationToken::new())
        .await
        .unwrap();

    let records = w.audit.records();
    assert!(IntegrityVerifier::verify_chain(&records).valid);

    let transitions = records
        .iter()
        .filter(|r| matches!(r.record.event, AuditEvent::Transition { .. }))
        .count();
    // four transitions per target
    assert_eq!(transitions, 8);
    assert!(matches!(
        records.first().map(|r| &r.record.event),
        Some(AuditEvent::PlanStarted { targets: 2 })
    ));
    assert!(matches!(
        records.last().map(|r| &r.record.event),
        Some(AuditEvent::PlanFinished { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn rerunning_a_converged_plan_changes_nothing() {
    let w = world(3);
    w.artifacts.publish(Version::new(2, 0, 0), "release 2.0.0", vec![]);

    let first = w
        .coordinator
        .run(&plan(3, PolicySpec::default()), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.status, PlanStatus::Succeeded);

    let second = w
        .coordinator
        .run(&plan(3, PolicySpec::default()), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.status, PlanStatus::Succeeded);
    assert_eq!(
        second.count(|r| matches!(r, TargetResult::AlreadyConverged)),
        3
    );
    assert_eq!(w.installer.total_installs(), 3);
    assert_eq!(w.records.len(), 3);
}
