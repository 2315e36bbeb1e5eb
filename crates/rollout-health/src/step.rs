//! Manifest-driven prober
//!
//! Runs the artifact's verification steps in order and stops at the first
//! one that does not pass. A target whose manifest has no steps gets a
//! single `GET <endpoint>/health`.

use crate::error::HealthResult;
use crate::prober::{HealthProber, ProbeOutcome};
use async_trait::async_trait;
use reqwest::Client;
use rollout_types::{Credentials, StepCheck, Target, VerificationStep};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

const DEFAULT_HEALTH_PATH: &str = "/health";

/// Prober that executes `http_get` and `command` verification steps
pub struct StepProber {
    client: Client,
}

impl StepProber {
    pub fn new() -> HealthResult<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }

    async fn run_steps(
        &self,
        target: &Target,
        steps: &[VerificationStep],
        credentials: &Credentials,
    ) -> ProbeOutcome {
        if steps.is_empty() {
            let default = VerificationStep::http_get("health", DEFAULT_HEALTH_PATH);
            return self.run_step(target, &default, credentials).await;
        }

        for step in steps {
            let outcome = self.run_step(target, step, credentials).await;
            if !outcome.is_healthy() {
                return outcome;
            }
        }
        ProbeOutcome::Healthy
    }

    async fn run_step(
        &self,
        target: &Target,
        step: &VerificationStep,
        credentials: &Credentials,
    ) -> ProbeOutcome {
        let started = Instant::now();
        let outcome = match &step.check {
            StepCheck::HttpGet {
                path,
                expect_status,
            } => self.http_get(target, path, *expect_status, credentials).await,
            StepCheck::Command { program, args } => {
                run_command(target, program, args, credentials).await
            }
        };

        debug!(
            step = %step.name,
            latency_ms = started.elapsed().as_millis() as u64,
            outcome = %outcome,
            "Verification step finished"
        );
        outcome
    }

    async fn http_get(
        &self,
        target: &Target,
        path: &str,
        expect_status: u16,
        credentials: &Credentials,
    ) -> ProbeOutcome {
        let Some(endpoint) = target.endpoint.as_deref() else {
            return ProbeOutcome::unreachable("target has no endpoint");
        };
        let url = format!(
            "{}/{}",
            endpoint.trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        let mut request = self.client.get(&url);
        if !credentials.is_anonymous() {
            request = match credentials.username() {
                Some(user) => request.basic_auth(user, Some(credentials.secret())),
                None => request.bearer_auth(credentials.secret()),
            };
        }

        match request.send().await {
            Ok(response) if response.status().as_u16() == expect_status => ProbeOutcome::Healthy,
            Ok(response) => ProbeOutcome::unhealthy(format!(
                "GET {} returned {}, expected {}",
                url,
                response.status().as_u16(),
                expect_status
            )),
            Err(e) if e.is_builder() => {
                ProbeOutcome::unhealthy(format!("invalid probe url {}: {}", url, e))
            }
            Err(e) => ProbeOutcome::unreachable(format!("GET {} failed: {}", url, e)),
        }
    }
}

async fn run_command(
    target: &Target,
    program: &str,
    args: &[String],
    credentials: &Credentials,
) -> ProbeOutcome {
    let mut command = tokio::process::Command::new(program);
    command
        .args(args)
        .env("ROLLOUT_TARGET_ID", target.id.as_str())
        .env("ROLLOUT_TARGET_ENDPOINT", target.endpoint.as_deref().unwrap_or(""))
        .env("ROLLOUT_SECRET", credentials.secret())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match command.output().await {
        Ok(output) => output,
        Err(e) => {
            warn!(program, error = %e, "Probe command could not be started");
            return ProbeOutcome::unreachable(format!("could not run {}: {}", program, e));
        }
    };

    if output.status.success() {
        ProbeOutcome::Healthy
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        ProbeOutcome::unhealthy(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        ))
    }
}

#[async_trait]
impl HealthProber for StepProber {
    #[instrument(skip_all, fields(target_id = %target.id, steps = steps.len()))]
    async fn probe(
        &self,
        target: &Target,
        steps: &[VerificationStep],
        credentials: &Credentials,
        timeout: Duration,
    ) -> ProbeOutcome {
        match tokio::time::timeout(timeout, self.run_steps(target, steps, credentials)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                ProbeOutcome::unreachable(format!("no response within {}ms", timeout.as_millis()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Serve one canned HTTP status on a local port
    async fn serve_status(status: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{}", addr)
    }

    fn target(endpoint: &str) -> Target {
        Target::new("site-a").with_endpoint(endpoint)
    }

    #[tokio::test]
    async fn test_default_health_check() {
        let endpoint = serve_status("200 OK").await;
        let prober = StepProber::new().unwrap();
        let outcome = prober
            .probe(&target(&endpoint), &[], &Credentials::new("t"), TIMEOUT)
            .await;
        assert_eq!(outcome, ProbeOutcome::Healthy);
    }

    #[tokio::test]
    async fn test_bad_status_is_unhealthy() {
        let endpoint = serve_status("503 Service Unavailable").await;
        let prober = StepProber::new().unwrap();
        let steps = [VerificationStep::http_get("api", "/ready")];
        let outcome = prober
            .probe(&target(&endpoint), &steps, &Credentials::anonymous(), TIMEOUT)
            .await;
        assert!(matches!(outcome, ProbeOutcome::Unhealthy { .. }));
    }

    #[tokio::test]
    async fn test_silent_target_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        // accept and hold connections without ever answering
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let prober = StepProber::new().unwrap();
        let outcome = prober
            .probe(
                &target(&endpoint),
                &[],
                &Credentials::anonymous(),
                Duration::from_millis(200),
            )
            .await;
        assert_eq!(outcome.failure_kind(), Some(rollout_types::FailureKind::Unreachable));
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_unreachable() {
        let prober = StepProber::new().unwrap();
        let outcome = prober
            .probe(&Target::new("x"), &[], &Credentials::anonymous(), TIMEOUT)
            .await;
        assert!(matches!(outcome, ProbeOutcome::Unreachable { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_steps_run_in_order() {
        let prober = StepProber::new().unwrap();
        let passing = [VerificationStep::command("ok", "true", vec![])];
        assert!(prober
            .probe(&Target::new("x"), &passing, &Credentials::anonymous(), TIMEOUT)
            .await
            .is_healthy());

        let failing = [
            VerificationStep::command("ok", "true", vec![]),
            VerificationStep::command(
                "smoke",
                "sh",
                vec!["-c".into(), "test \"$ROLLOUT_TARGET_ID\" = y".into()],
            ),
        ];
        let outcome = prober
            .probe(&Target::new("x"), &failing, &Credentials::anonymous(), TIMEOUT)
            .await;
        assert!(matches!(outcome, ProbeOutcome::Unhealthy { .. }));
    }
}
