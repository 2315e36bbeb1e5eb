//! Scripted prober for tests

use crate::prober::{HealthProber, ProbeOutcome};
use async_trait::async_trait;
use parking_lot::Mutex;
use rollout_types::{Credentials, Target, TargetId, VerificationStep};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Replays queued outcomes per target, then falls back to a default
pub struct ScriptedProber {
    default: ProbeOutcome,
    scripts: Mutex<HashMap<TargetId, VecDeque<ProbeOutcome>>>,
    calls: Mutex<Vec<TargetId>>,
}

impl ScriptedProber {
    /// Every probe returns `default` unless scripted otherwise
    pub fn new(default: ProbeOutcome) -> Self {
        Self {
            default,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn healthy() -> Self {
        Self::new(ProbeOutcome::Healthy)
    }

    /// Queue outcomes returned, in order, for the next probes of `target`
    pub fn script(&self, target: impl Into<TargetId>, outcomes: impl IntoIterator<Item = ProbeOutcome>) {
        self.scripts
            .lock()
            .entry(target.into())
            .or_default()
            .extend(outcomes);
    }

    /// Number of probes issued against `target`
    pub fn calls_for(&self, target: &TargetId) -> usize {
        self.calls.lock().iter().filter(|id| *id == target).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl HealthProber for ScriptedProber {
    async fn probe(
        &self,
        target: &Target,
        _steps: &[VerificationStep],
        _credentials: &Credentials,
        _timeout: Duration,
    ) -> ProbeOutcome {
        self.calls.lock().push(target.id.clone());
        self.scripts
            .lock()
            .get_mut(&target.id)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| self.default.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_default() {
        let prober = ScriptedProber::healthy();
        prober.script("a", [ProbeOutcome::unreachable("timeout")]);

        let target = Target::new("a");
        let creds = Credentials::anonymous();
        let timeout = Duration::from_secs(1);

        assert!(!prober.probe(&target, &[], &creds, timeout).await.is_healthy());
        assert!(prober.probe(&target, &[], &creds, timeout).await.is_healthy());
        assert_eq!(prober.calls_for(&target.id), 2);
    }
}
