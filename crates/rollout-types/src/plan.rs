//! Deployment plans and rollout policy
//!
//! A plan file is deserialized into [`PlanSpec`], which enumerates every
//! recognised option and rejects unknown ones. [`PlanSpec::validate`] checks
//! all of them eagerly and produces an immutable [`DeploymentPlan`]; nothing
//! downstream re-validates configuration at use time.

use crate::{PlanId, TargetId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Plan validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanValidationError {
    #[error("invalid desired version '{value}': {reason}")]
    InvalidVersion { value: String, reason: String },

    #[error("plan names no targets")]
    NoTargets,

    #[error("target listed more than once: {0}")]
    DuplicateTarget(String),

    #[error("invalid target id '{0}': use ASCII letters, digits, '-', '_' or '.'")]
    InvalidTargetId(String),

    #[error("invalid policy.{field}: {reason}")]
    InvalidPolicy { field: &'static str, reason: String },

    #[error("canary target is not part of the plan: {0}")]
    UnknownCanaryTarget(String),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> PlanValidationError {
    PlanValidationError::InvalidPolicy {
        field,
        reason: reason.into(),
    }
}

// ═══════════════════════════════════════════════════════════════════
// RAW SPECIFICATION (as read from a plan file)
// ═══════════════════════════════════════════════════════════════════

/// Plan as written by an operator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanSpec {
    /// Version every target should converge to
    pub desired_version: String,

    /// Ordered target ids
    pub targets: Vec<String>,

    /// Rollout policy
    #[serde(default)]
    pub policy: PolicySpec,

    /// Reinstall even on targets already running the desired version
    #[serde(default)]
    pub force: bool,
}

/// Rollout policy as written by an operator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PolicySpec {
    /// Targets per fan-out batch after the canary
    pub batch_size: u32,

    /// Concurrent reconciliations within one batch
    pub max_parallel: u32,

    /// Cumulative failure ratio (0.0 - 1.0) above which dispatch halts
    pub failure_threshold: f64,

    /// Canary selection
    pub canary: CanarySpec,

    /// Failed attempts allowed per target within the plan
    pub attempt_budget: u32,

    /// Resolution attempts while the artifact is not yet published
    pub resolve_attempts: u32,

    /// Retry backoff
    pub backoff: BackoffSpec,

    /// Timeouts for external calls
    pub timeouts: TimeoutSpec,
}

impl Default for PolicySpec {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_parallel: 5,
            failure_threshold: 0.0,
            canary: CanarySpec::default(),
            attempt_budget: 3,
            resolve_attempts: 5,
            backoff: BackoffSpec::default(),
            timeouts: TimeoutSpec::default(),
        }
    }
}

/// Canary selection: either the first `size` targets or an explicit list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CanarySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<String>>,
}

/// Retry backoff as written by an operator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BackoffSpec {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    pub jitter: JitterMode,
}

impl Default for BackoffSpec {
    fn default() -> Self {
        Self {
            initial_ms: 500,
            max_ms: 30_000,
            multiplier: 2.0,
            jitter: JitterMode::None,
        }
    }
}

/// External call timeouts as written by an operator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TimeoutSpec {
    pub resolve_ms: u64,
    pub install_ms: u64,
    pub probe_ms: u64,
    /// Acquiring a secret lease
    pub lease_ms: u64,
}

impl Default for TimeoutSpec {
    fn default() -> Self {
        Self {
            resolve_ms: 30_000,
            install_ms: 600_000,
            probe_ms: 10_000,
            lease_ms: 10_000,
        }
    }
}

/// Jitter applied on top of the exponential delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JitterMode {
    #[default]
    None,
    /// Uniform in `[0, delay]`
    Full,
}

// ═══════════════════════════════════════════════════════════════════
// VALIDATED PLAN
// ═══════════════════════════════════════════════════════════════════

/// Validated rollout policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutPolicy {
    pub batch_size: usize,
    pub max_parallel: usize,
    pub failure_threshold: f64,
    /// Canary targets, resolved against the plan's target list
    pub canary: Vec<TargetId>,
    pub attempt_budget: u32,
    pub resolve_attempts: u32,
    pub backoff: BackoffPolicy,
    pub timeouts: Timeouts,
}

/// Exponential backoff with an upper bound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    #[serde(with = "crate::duration_serde")]
    pub initial: Duration,
    #[serde(with = "crate::duration_serde")]
    pub max: Duration,
    pub multiplier: f64,
    pub jitter: JitterMode,
}

impl BackoffPolicy {
    /// Deterministic delay before retry number `retry` (0-based), before jitter.
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.min(64) as i32);
        let millis = (self.initial.as_millis() as f64 * factor).min(self.max.as_millis() as f64);
        Duration::from_millis(millis.round() as u64)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        let spec = BackoffSpec::default();
        Self {
            initial: Duration::from_millis(spec.initial_ms),
            max: Duration::from_millis(spec.max_ms),
            multiplier: spec.multiplier,
            jitter: spec.jitter,
        }
    }
}

/// Timeouts for the reconciler's external calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(with = "crate::duration_serde")]
    pub resolve: Duration,
    #[serde(with = "crate::duration_serde")]
    pub install: Duration,
    #[serde(with = "crate::duration_serde")]
    pub probe: Duration,
    #[serde(with = "crate::duration_serde")]
    pub lease: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        let spec = TimeoutSpec::default();
        Self {
            resolve: Duration::from_millis(spec.resolve_ms),
            install: Duration::from_millis(spec.install_ms),
            probe: Duration::from_millis(spec.probe_ms),
            lease: Duration::from_millis(spec.lease_ms),
        }
    }
}

/// One dispatch unit of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// 0 for the canary batch
    pub index: usize,
    pub canary: bool,
    pub targets: Vec<TargetId>,
}

/// Immutable deployment plan, owned by the coordinator for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    id: PlanId,
    desired_version: semver::Version,
    targets: Vec<TargetId>,
    policy: RolloutPolicy,
    force: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl DeploymentPlan {
    pub fn id(&self) -> PlanId {
        self.id
    }

    pub fn desired_version(&self) -> &semver::Version {
        &self.desired_version
    }

    pub fn targets(&self) -> &[TargetId] {
        &self.targets
    }

    pub fn policy(&self) -> &RolloutPolicy {
        &self.policy
    }

    pub fn force(&self) -> bool {
        self.force
    }

    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.created_at
    }

    /// Split the targets into the canary batch followed by fan-out batches
    /// of at most `batch_size`, preserving plan order.
    pub fn batches(&self) -> Vec<Batch> {
        let canary: HashSet<&TargetId> = self.policy.canary.iter().collect();
        let mut batches = Vec::new();

        if !self.policy.canary.is_empty() {
            batches.push(Batch {
                index: 0,
                canary: true,
                targets: self.policy.canary.clone(),
            });
        }

        let rest: Vec<TargetId> = self
            .targets
            .iter()
            .filter(|t| !canary.contains(t))
            .cloned()
            .collect();

        for chunk in rest.chunks(self.policy.batch_size) {
            batches.push(Batch {
                index: batches.len(),
                canary: false,
                targets: chunk.to_vec(),
            });
        }

        batches
    }
}

impl PlanSpec {
    pub fn new(desired_version: impl Into<String>, targets: Vec<String>) -> Self {
        Self {
            desired_version: desired_version.into(),
            targets,
            policy: PolicySpec::default(),
            force: false,
        }
    }

    pub fn with_policy(mut self, policy: PolicySpec) -> Self {
        self.policy = policy;
        self
    }

    /// Validate every option and produce an immutable plan
    pub fn validate(self) -> Result<DeploymentPlan, PlanValidationError> {
        let desired_version = semver::Version::parse(self.desired_version.trim()).map_err(|e| {
            PlanValidationError::InvalidVersion {
                value: self.desired_version.clone(),
                reason: e.to_string(),
            }
        })?;

        if self.targets.is_empty() {
            return Err(PlanValidationError::NoTargets);
        }

        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(self.targets.len());
        for raw in &self.targets {
            let id = TargetId::new(raw.trim());
            if !id.is_path_safe() {
                return Err(PlanValidationError::InvalidTargetId(raw.clone()));
            }
            if !seen.insert(id.clone()) {
                return Err(PlanValidationError::DuplicateTarget(raw.clone()));
            }
            targets.push(id);
        }

        let policy = self.policy.validate(&targets)?;

        Ok(DeploymentPlan {
            id: PlanId::generate(),
            desired_version,
            targets,
            policy,
            force: self.force,
            created_at: chrono::Utc::now(),
        })
    }
}

impl PolicySpec {
    fn validate(&self, targets: &[TargetId]) -> Result<RolloutPolicy, PlanValidationError> {
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be at least 1"));
        }
        if self.max_parallel == 0 {
            return Err(invalid("max_parallel", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.failure_threshold) {
            return Err(invalid("failure_threshold", "must be between 0.0 and 1.0"));
        }
        if self.attempt_budget == 0 {
            return Err(invalid("attempt_budget", "must be at least 1"));
        }
        if self.resolve_attempts == 0 {
            return Err(invalid("resolve_attempts", "must be at least 1"));
        }

        let backoff = &self.backoff;
        if backoff.initial_ms == 0 {
            return Err(invalid("backoff.initial_ms", "must be greater than 0"));
        }
        if backoff.max_ms < backoff.initial_ms {
            return Err(invalid("backoff.max_ms", "must be >= backoff.initial_ms"));
        }
        if !backoff.multiplier.is_finite() || backoff.multiplier < 1.0 {
            return Err(invalid("backoff.multiplier", "must be >= 1.0"));
        }

        let timeouts = &self.timeouts;
        for (field, value) in [
            ("timeouts.resolve_ms", timeouts.resolve_ms),
            ("timeouts.install_ms", timeouts.install_ms),
            ("timeouts.probe_ms", timeouts.probe_ms),
            ("timeouts.lease_ms", timeouts.lease_ms),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than 0"));
            }
        }

        let canary = self.canary.resolve(targets)?;

        Ok(RolloutPolicy {
            batch_size: self.batch_size as usize,
            max_parallel: self.max_parallel as usize,
            failure_threshold: self.failure_threshold,
            canary,
            attempt_budget: self.attempt_budget,
            resolve_attempts: self.resolve_attempts,
            backoff: BackoffPolicy {
                initial: Duration::from_millis(backoff.initial_ms),
                max: Duration::from_millis(backoff.max_ms),
                multiplier: backoff.multiplier,
                jitter: backoff.jitter,
            },
            timeouts: Timeouts {
                resolve: Duration::from_millis(timeouts.resolve_ms),
                install: Duration::from_millis(timeouts.install_ms),
                probe: Duration::from_millis(timeouts.probe_ms),
                lease: Duration::from_millis(timeouts.lease_ms),
            },
        })
    }
}

impl CanarySpec {
    pub fn size(size: u32) -> Self {
        Self {
            size: Some(size),
            targets: None,
        }
    }

    pub fn targets(targets: Vec<String>) -> Self {
        Self {
            size: None,
            targets: Some(targets),
        }
    }

    fn resolve(&self, targets: &[TargetId]) -> Result<Vec<TargetId>, PlanValidationError> {
        match (&self.size, &self.targets) {
            (Some(_), Some(_)) => Err(invalid("canary", "set either size or targets, not both")),
            (_, Some(listed)) => {
                if listed.is_empty() {
                    return Err(invalid("canary.targets", "must not be empty"));
                }
                let mut canary = Vec::with_capacity(listed.len());
                for raw in listed {
                    let id = TargetId::new(raw.trim());
                    if !targets.contains(&id) {
                        return Err(PlanValidationError::UnknownCanaryTarget(raw.clone()));
                    }
                    if !canary.contains(&id) {
                        canary.push(id);
                    }
                }
                Ok(canary)
            }
            (size, None) => {
                let size = size.unwrap_or(1) as usize;
                if size == 0 || size > targets.len() {
                    return Err(invalid(
                        "canary.size",
                        format!("must be between 1 and {}", targets.len()),
                    ));
                }
                Ok(targets[..size].to_vec())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("site-{:02}", i)).collect()
    }

    #[test]
    fn test_defaults_validate() {
        let plan = PlanSpec::new("1.4.0", ids(3)).validate().unwrap();
        assert_eq!(plan.desired_version(), &semver::Version::new(1, 4, 0));
        assert_eq!(plan.policy().canary, vec![TargetId::new("site-00")]);
        assert_eq!(plan.policy().attempt_budget, 3);
        assert!(!plan.force());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            PlanSpec::new("one.two", ids(1)).validate(),
            Err(PlanValidationError::InvalidVersion { .. })
        ));
        assert_eq!(
            PlanSpec::new("1.0.0", vec![]).validate().unwrap_err(),
            PlanValidationError::NoTargets
        );
        assert_eq!(
            PlanSpec::new("1.0.0", vec!["a".into(), "a".into()])
                .validate()
                .unwrap_err(),
            PlanValidationError::DuplicateTarget("a".into())
        );
        assert!(matches!(
            PlanSpec::new("1.0.0", vec!["../x".into()]).validate(),
            Err(PlanValidationError::InvalidTargetId(_))
        ));
    }

    #[test]
    fn test_rejects_bad_policy() {
        let cases = [
            PolicySpec {
                batch_size: 0,
                ..Default::default()
            },
            PolicySpec {
                max_parallel: 0,
                ..Default::default()
            },
            PolicySpec {
                failure_threshold: 1.5,
                ..Default::default()
            },
            PolicySpec {
                attempt_budget: 0,
                ..Default::default()
            },
            PolicySpec {
                canary: CanarySpec::size(4),
                ..Default::default()
            },
            PolicySpec {
                canary: CanarySpec {
                    size: Some(1),
                    targets: Some(vec!["site-00".into()]),
                },
                ..Default::default()
            },
            PolicySpec {
                backoff: BackoffSpec {
                    multiplier: 0.5,
                    ..Default::default()
                },
                ..Default::default()
            },
            PolicySpec {
                timeouts: TimeoutSpec {
                    probe_ms: 0,
                    ..Default::default()
                },
                ..Default::default()
            },
            PolicySpec {
                timeouts: TimeoutSpec {
                    lease_ms: 0,
                    ..Default::default()
                },
                ..Default::default()
            },
        ];

        for policy in cases {
            let result = PlanSpec::new("1.0.0", ids(3)).with_policy(policy).validate();
            assert!(
                matches!(result, Err(PlanValidationError::InvalidPolicy { .. })),
                "{:?}",
                result
            );
        }
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let yaml = r#"
desired_version: 1.0.0
targets: [a]
policy:
  batch_sise: 3
"#;
        assert!(serde_yaml::from_str::<PlanSpec>(yaml).is_err());
    }

    #[test]
    fn test_yaml_plan_with_explicit_canary() {
        let yaml = r#"
desired_version: 2.1.0
targets: [alpha, beta, gamma, delta]
policy:
  batch_size: 2
  max_parallel: 2
  failure_threshold: 0.25
  canary:
    targets: [gamma]
  backoff:
    initial_ms: 100
    max_ms: 1000
"#;
        let spec: PlanSpec = serde_yaml::from_str(yaml).unwrap();
        let plan = spec.validate().unwrap();
        let batches = plan.batches();

        assert_eq!(batches.len(), 3);
        assert!(batches[0].canary);
        assert_eq!(batches[0].targets, vec![TargetId::new("gamma")]);
        assert_eq!(
            batches[1].targets,
            vec![TargetId::new("alpha"), TargetId::new("beta")]
        );
        assert_eq!(batches[2].targets, vec![TargetId::new("delta")]);
        assert_eq!(plan.policy().backoff.initial, Duration::from_millis(100));
    }

    #[test]
    fn test_unknown_canary_target() {
        let policy = PolicySpec {
            canary: CanarySpec::targets(vec!["omega".into()]),
            ..Default::default()
        };
        assert_eq!(
            PlanSpec::new("1.0.0", ids(2))
                .with_policy(policy)
                .validate()
                .unwrap_err(),
            PlanValidationError::UnknownCanaryTarget("omega".into())
        );
    }

    #[test]
    fn test_backoff_is_capped() {
        let backoff = BackoffPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(1_000),
            multiplier: 2.0,
            jitter: JitterMode::None,
        };
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(4), Duration::from_millis(1_000));
        assert_eq!(backoff.delay(200), Duration::from_millis(1_000));
    }

    proptest! {
        #[test]
        fn batches_cover_every_target_once(
            n in 1usize..40,
            batch_size in 1u32..8,
            canary in 1u32..5,
        ) {
            let canary = canary.min(n as u32);
            let policy = PolicySpec {
                batch_size,
                canary: CanarySpec::size(canary),
                ..Default::default()
            };
            let plan = PlanSpec::new("1.0.0", ids(n)).with_policy(policy).validate().unwrap();
            let batches = plan.batches();

            prop_assert!(batches[0].canary);
            prop_assert_eq!(batches[0].targets.len(), canary as usize);
            for batch in &batches[1..] {
                prop_assert!(!batch.canary);
                prop_assert!(!batch.targets.is_empty());
                prop_assert!(batch.targets.len() <= batch_size as usize);
            }

            let flattened: Vec<TargetId> = batches.into_iter().flat_map(|b| b.targets).collect();
            prop_assert_eq!(flattened, plan.targets().to_vec());
        }
    }
}
