//! Install action collaborator
//!
//! The install action is opaque: it is handed an artifact, a target and
//! credentials, and reports success or failure. It is assumed idempotent at
//! the target, so the reconciler may re-dispatch it after a timeout.

use async_trait::async_trait;
use rollout_types::{Artifact, Credentials, Target};
use std::process::Stdio;
use tracing::{debug, warn};

/// Result of one install dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Succeeded,
    Failed { reason: String },
}

impl InstallOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        InstallOutcome::Failed {
            reason: reason.into(),
        }
    }
}

/// Applies an artifact to a target
#[async_trait]
pub trait Installer: Send + Sync {
    async fn apply(&self, artifact: &Artifact, target: &Target, credentials: &Credentials) -> InstallOutcome;
}

/// Runs a local program (an ansible wrapper, an ssh script, ...) per install
///
/// The artifact and target are passed as `ROLLOUT_*` environment variables;
/// exit status 0 means the install succeeded.
pub struct CommandInstaller {
    program: String,
    args: Vec<String>,
}

impl CommandInstaller {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl Installer for CommandInstaller {
    async fn apply(&self, artifact: &Artifact, target: &Target, credentials: &Credentials) -> InstallOutcome {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .env("ROLLOUT_TARGET_ID", target.id.as_str())
            .env("ROLLOUT_TARGET_ENDPOINT", target.endpoint.as_deref().unwrap_or(""))
            .env("ROLLOUT_ARTIFACT_VERSION", artifact.version.to_string())
            .env("ROLLOUT_ARTIFACT_LOCATOR", &artifact.locator)
            .env("ROLLOUT_ARTIFACT_FINGERPRINT", artifact.fingerprint.to_string())
            .env("ROLLOUT_USERNAME", credentials.username().unwrap_or(""))
            .env("ROLLOUT_SECRET", credentials.secret())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // a timed-out install is re-dispatched, never left running twice
            .kill_on_drop(true);

        let output = match command.output().await {
            Ok(output) => output,
            Err(e) => {
                warn!(program = %self.program, error = %e, "Install command could not be started");
                return InstallOutcome::failed(format!("could not run {}: {}", self.program, e));
            }
        };

        debug!(
            target_id = %target.id,
            status = %output.status,
            stdout = %String::from_utf8_lossy(&output.stdout).trim(),
            "Install command finished"
        );

        if output.status.success() {
            InstallOutcome::Succeeded
        } else {
            InstallOutcome::failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use rollout_types::Fingerprint;

    fn artifact() -> Artifact {
        Artifact {
            version: semver::Version::new(1, 2, 3),
            fingerprint: Fingerprint::from_sha256([0u8; 32]),
            locator: "/srv/artifacts/1.2.3/app.tar.gz".into(),
            manifest: vec![],
        }
    }

    #[tokio::test]
    async fn test_environment_is_exported() {
        let installer = CommandInstaller::new(
            "sh",
            vec![
                "-c".into(),
                "test \"$ROLLOUT_ARTIFACT_VERSION\" = 1.2.3 && test \"$ROLLOUT_TARGET_ID\" = site-a"
                    .into(),
            ],
        );
        let outcome = installer
            .apply(&artifact(), &Target::new("site-a"), &Credentials::anonymous())
            .await;
        assert_eq!(outcome, InstallOutcome::Succeeded);
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails() {
        let installer = CommandInstaller::new("sh", vec!["-c".into(), "echo boom >&2; exit 4".into()]);
        let outcome = installer
            .apply(&artifact(), &Target::new("site-a"), &Credentials::anonymous())
            .await;
        match outcome {
            InstallOutcome::Failed { reason } => assert!(reason.contains("boom")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program_fails() {
        let installer = CommandInstaller::new("/nonexistent/rollout-install", vec![]);
        let outcome = installer
            .apply(&artifact(), &Target::new("site-a"), &Credentials::anonymous())
            .await;
        assert!(matches!(outcome, InstallOutcome::Failed { .. }));
    }
}
