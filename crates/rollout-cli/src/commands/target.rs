//! Target commands

use crate::context::Context;
use crate::error::{CliError, CliResult};
use crate::output::{self, colored_result, print_success, print_warning, OutputFormat};
use clap::Subcommand;
use rollout_observability::{AuditEvent, AuditSink, PartialAuditRecord};
use rollout_reconciler::RecordStore;
use rollout_registry::{TargetFilter, TargetRegistry};
use rollout_types::{Target, TargetId, TargetResult};
use serde::Serialize;
use std::sync::Arc;
use tabled::Tabled;
use tracing::error;

/// Target subcommands
#[derive(Subcommand)]
pub enum TargetCommands {
    /// Register a new target
    Add {
        /// Target ID
        target_id: String,

        /// Address used by the install action and health checks
        #[arg(short, long)]
        endpoint: Option<String>,

        /// Version already running on the target
        #[arg(long = "running")]
        running: Option<String>,

        /// Labels as key=value
        #[arg(short, long = "label")]
        labels: Vec<String>,
    },

    /// List targets
    List {
        /// Include decommissioned targets
        #[arg(short, long)]
        all: bool,
    },

    /// Show one target
    Get {
        /// Target ID
        target_id: String,
    },

    /// Take a target out of service; it is kept but never reconciled again
    Decommission {
        /// Target ID
        target_id: String,
    },

    /// Reapply the target's last known-good version
    Rollback {
        /// Target ID
        target_id: String,
    },

    /// Show reconciliation history
    History {
        /// Target ID
        target_id: String,
    },
}

/// Table row for target display
#[derive(Debug, Serialize, Tabled)]
struct TargetRow {
    id: String,
    state: String,
    version: String,
    health: String,
    failures: u32,
    endpoint: String,
}

impl From<Target> for TargetRow {
    fn from(t: Target) -> Self {
        let state = if t.decommissioned {
            format!("{} (decommissioned)", t.state)
        } else {
            t.state.to_string()
        };
        Self {
            id: t.id.to_string(),
            state,
            version: t
                .observed_version
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".into()),
            health: t.health.to_string(),
            failures: t.consecutive_failures,
            endpoint: t.endpoint.unwrap_or_else(|| "-".into()),
        }
    }
}

/// Table row for reconciliation history
#[derive(Debug, Serialize, Tabled)]
struct RecordRow {
    finished: String,
    version: String,
    outcome: String,
    transitions: String,
    plan: String,
}

fn parse_label(raw: &str) -> CliResult<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(CliError::InvalidInput(format!(
            "label must be key=value: {}",
            raw
        ))),
    }
}

/// Execute a target command
pub async fn execute(command: TargetCommands, ctx: &Context, format: OutputFormat) -> CliResult<i32> {
    match command {
        TargetCommands::Add {
            target_id,
            endpoint,
            running,
            labels,
        } => {
            let mut target = Target::new(target_id);
            if let Some(endpoint) = endpoint {
                target = target.with_endpoint(endpoint);
            }
            if let Some(running) = running {
                let version = semver::Version::parse(&running).map_err(|e| {
                    CliError::InvalidInput(format!("invalid version '{}': {}", running, e))
                })?;
                target = target.with_version(version);
            }
            for raw in &labels {
                let (key, value) = parse_label(raw)?;
                target = target.with_label(key, value);
            }

            let id = target.id.clone();
            ctx.registry.register(target).await?;
            print_success(&format!("Target {} registered", id));
            Ok(0)
        }

        TargetCommands::List { all } => {
            let filter = if all {
                TargetFilter::all()
            } else {
                TargetFilter::active()
            };
            let snapshot = ctx.registry.list(&filter).await?;
            let rows: Vec<TargetRow> = snapshot.iter().cloned().map(TargetRow::from).collect();
            output::print_output(rows, format)?;
            Ok(0)
        }

        TargetCommands::Get { target_id } => {
            let target = ctx.registry.get(&TargetId::new(target_id)).await?;
            output::print_single(&target, format)?;
            Ok(0)
        }

        TargetCommands::Decommission { target_id } => {
            let id = TargetId::new(target_id);
            let target = ctx.registry.decommission(&id).await?;

            let audit = ctx.audit().await?;
            if let Err(e) = audit
                .write(PartialAuditRecord::new("operator", AuditEvent::TargetDecommissioned).target(id.clone()))
                .await
            {
                error!(target_id = %id, error = %e, "Failed to write audit record");
            }

            print_success(&format!(
                "Target {} decommissioned (last state {})",
                id, target.state
            ));
            Ok(0)
        }

        TargetCommands::Rollback { target_id } => {
            let id = TargetId::new(target_id);
            let audit: Arc<dyn AuditSink> = ctx.audit().await?;
            let reconciler = ctx.reconciler(audit).await?;
            let outcome = reconciler.rollback(&id).await?;

            match outcome.result {
                TargetResult::RolledBack => {
                    let version = outcome
                        .target
                        .observed_version
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "-".into());
                    if outcome.record.is_none() {
                        print_warning(&format!("Target {} was already rolled back", id));
                    } else {
                        print_success(&format!("Target {} rolled back to {}", id, version));
                    }
                    Ok(0)
                }
                other => {
                    print_warning(&format!("Rollback of {}: {}", id, colored_result(&other)));
                    Ok(1)
                }
            }
        }

        TargetCommands::History { target_id } => {
            let id = TargetId::new(target_id);
            // surfaces unknown targets as errors rather than an empty history
            ctx.registry.get(&id).await?;

            let records = ctx.records().await?.records_for(&id).await?;
            if format != OutputFormat::Table {
                return output::print_single(&records, format).map(|_| 0);
            }

            let rows: Vec<RecordRow> = records
                .into_iter()
                .rev()
                .map(|r| RecordRow {
                    finished: r.finished_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    version: r.artifact_version.to_string(),
                    outcome: r.outcome.to_string(),
                    transitions: r
                        .transitions
                        .iter()
                        .map(|t| t.to.to_string())
                        .collect::<Vec<_>>()
                        .join(" > "),
                    plan: r
                        .plan_id
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "manual".into()),
                })
                .collect();
            output::print_output(rows, format)?;
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_label() {
        assert_eq!(
            parse_label("region=eu-west").unwrap(),
            ("region".to_string(), "eu-west".to_string())
        );
        assert!(parse_label("no-separator").is_err());
        assert!(parse_label("=value").is_err());
    }
}
