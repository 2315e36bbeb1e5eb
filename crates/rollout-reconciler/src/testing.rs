//! Scripted install action for tests

use crate::installer::{InstallOutcome, Installer};
use async_trait::async_trait;
use parking_lot::Mutex;
use rollout_types::{Artifact, Credentials, Target, TargetId};
use semver::Version;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// One scripted reaction to an install dispatch
#[derive(Debug, Clone)]
pub enum InstallBehaviour {
    Succeed,
    Fail(String),
    /// Never completes; the reconciler's install timeout fires
    Hang,
}

#[derive(Default)]
struct InFlight {
    current: HashMap<TargetId, usize>,
    peak: HashMap<TargetId, usize>,
    total: usize,
    peak_total: usize,
}

/// Installer that replays queued behaviours per target and records calls
pub struct ScriptedInstaller {
    scripts: Mutex<HashMap<TargetId, VecDeque<InstallBehaviour>>>,
    delay: Duration,
    calls: Mutex<Vec<(TargetId, Version)>>,
    in_flight: Mutex<InFlight>,
}

impl ScriptedInstaller {
    /// Every install succeeds unless scripted otherwise
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: Mutex::new(InFlight::default()),
        }
    }

    /// Each install takes `delay` before reporting
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn script(&self, target: impl Into<TargetId>, behaviours: impl IntoIterator<Item = InstallBehaviour>) {
        self.scripts
            .lock()
            .entry(target.into())
            .or_default()
            .extend(behaviours);
    }

    /// Versions dispatched to `target`, in order
    pub fn installs_for(&self, target: &TargetId) -> Vec<Version> {
        self.calls
            .lock()
            .iter()
            .filter(|(id, _)| id == target)
            .map(|(_, version)| version.clone())
            .collect()
    }

    pub fn total_installs(&self) -> usize {
        self.calls.lock().len()
    }

    /// Highest number of simultaneous installs seen for `target`
    pub fn peak_in_flight(&self, target: &TargetId) -> usize {
        self.in_flight.lock().peak.get(target).copied().unwrap_or(0)
    }

    /// Highest number of simultaneous installs seen across all targets
    pub fn peak_in_flight_total(&self) -> usize {
        self.in_flight.lock().peak_total
    }

    fn enter(&self, target: &TargetId) {
        let mut in_flight = self.in_flight.lock();
        in_flight.total += 1;
        in_flight.peak_total = in_flight.peak_total.max(in_flight.total);
        let current = in_flight.current.entry(target.clone()).or_default();
        *current += 1;
        let now = *current;
        let peak = in_flight.peak.entry(target.clone()).or_default();
        *peak = (*peak).max(now);
    }

    fn leave(&self, target: &TargetId) {
        let mut in_flight = self.in_flight.lock();
        in_flight.total = in_flight.total.saturating_sub(1);
        if let Some(current) = in_flight.current.get_mut(target) {
            *current = current.saturating_sub(1);
        }
    }
}

impl Default for ScriptedInstaller {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight count even when the install future is dropped
struct Leave<'a> {
    installer: &'a ScriptedInstaller,
    target: &'a TargetId,
}

impl Drop for Leave<'_> {
    fn drop(&mut self) {
        self.installer.leave(self.target);
    }
}

#[async_trait]
impl Installer for ScriptedInstaller {
    async fn apply(&self, artifact: &Artifact, target: &Target, _credentials: &Credentials) -> InstallOutcome {
        self.calls
            .lock()
            .push((target.id.clone(), artifact.version.clone()));
        let behaviour = self
            .scripts
            .lock()
            .get_mut(&target.id)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(InstallBehaviour::Succeed);

        self.enter(&target.id);
        let _leave = Leave {
            installer: self,
            target: &target.id,
        };

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match behaviour {
            InstallBehaviour::Succeed => InstallOutcome::Succeeded,
            InstallBehaviour::Fail(reason) => InstallOutcome::Failed { reason },
            InstallBehaviour::Hang => std::future::pending().await,
        }
    }
}
