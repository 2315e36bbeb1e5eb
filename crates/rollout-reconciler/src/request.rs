//! Reconciliation requests and outcomes

use rollout_types::{
    BackoffPolicy, DeploymentPlan, PlanId, ReconciliationRecord, Target, TargetId, TargetResult,
    Timeouts,
};
use semver::Version;

/// Everything the reconciler needs to drive one target to one version
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub target_id: TargetId,
    pub desired_version: Version,
    pub plan_id: Option<PlanId>,
    /// Failed external attempts tolerated before `AttemptBudgetExceeded`
    pub attempt_budget: u32,
    /// `NotFound` resolves tolerated before the target fails
    pub resolve_attempts: u32,
    pub backoff: BackoffPolicy,
    pub timeouts: Timeouts,
    /// Reinstall even if the target already runs the desired version
    pub force: bool,
}

impl ReconcileRequest {
    /// Request with default policy, outside of any plan
    pub fn new(target_id: impl Into<TargetId>, desired_version: Version) -> Self {
        Self {
            target_id: target_id.into(),
            desired_version,
            plan_id: None,
            attempt_budget: 3,
            resolve_attempts: 5,
            backoff: BackoffPolicy::default(),
            timeouts: Timeouts::default(),
            force: false,
        }
    }

    /// Request for one target of a plan, carrying the plan's policy
    pub fn from_plan(plan: &DeploymentPlan, target_id: TargetId) -> Self {
        let policy = plan.policy();
        Self {
            target_id,
            desired_version: plan.desired_version().clone(),
            plan_id: Some(plan.id()),
            attempt_budget: policy.attempt_budget,
            resolve_attempts: policy.resolve_attempts,
            backoff: policy.backoff.clone(),
            timeouts: policy.timeouts.clone(),
            force: plan.force(),
        }
    }

    pub fn with_attempt_budget(mut self, budget: u32) -> Self {
        self.attempt_budget = budget;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Terminal result of one reconciliation
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// Target as left in the registry
    pub target: Target,
    pub result: TargetResult,
    /// None when the target was never moved out of its resting state
    pub record: Option<ReconciliationRecord>,
    /// Install dispatches of the desired artifact
    pub install_attempts: u32,
}

impl ReconcileOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_success()
    }
}
