//! Plan commands: start, status, abort, list

use crate::context::Context;
use crate::error::{CliError, CliResult};
use crate::output::{
    self, colored_result, colored_status, print_event, print_info, print_success, print_warning,
    OutputFormat,
};
use rollout_coordinator::{CoordinatorError, PlanStore};
use rollout_types::{DeploymentPlan, PlanId, PlanSpec, RolloutReport};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Table row for a target outcome
#[derive(Debug, Serialize, Tabled)]
struct OutcomeRow {
    target: String,
    result: String,
    batch: String,
    message: String,
}

/// Table row for plan listings
#[derive(Debug, Serialize, Tabled)]
struct PlanRow {
    id: String,
    version: String,
    status: String,
    targets: usize,
    created: String,
}

/// Read a YAML or JSON plan file and validate it
pub fn load_plan(path: &Path) -> CliResult<DeploymentPlan> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| CliError::InvalidPlan(format!("{}: {}", path.display(), e)))?;

    let spec: PlanSpec = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&contents)
            .map_err(|e| CliError::InvalidPlan(format!("{}: {}", path.display(), e)))?,
        _ => serde_yaml::from_str(&contents)
            .map_err(|e| CliError::InvalidPlan(format!("{}: {}", path.display(), e)))?,
    };

    spec.validate()
        .map_err(|e| CliError::InvalidPlan(format!("{}: {}", path.display(), e)))
}

fn parse_plan_id(raw: &str) -> CliResult<PlanId> {
    raw.parse()
        .map_err(|_| CliError::InvalidInput(format!("not a plan id: {}", raw)))
}

/// Run a plan to completion; returns the plan's exit code
pub async fn start(ctx: &Context, plan_file: &Path, format: OutputFormat) -> CliResult<i32> {
    let plan = load_plan(plan_file)?;
    let coordinator = ctx.coordinator().await?;
    coordinator.validate(&plan).await?;

    let progress = format == OutputFormat::Table;
    if progress {
        print_info(&format!(
            "Plan {} rolling out {} to {} targets",
            plan.id(),
            plan.desired_version(),
            plan.targets().len()
        ));
    }

    let mut events = coordinator.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) if progress => print_event(&event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Progress output fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                print_warning("Interrupted; no further targets will be dispatched");
                cancel.cancel();
            }
        })
    };

    let result = coordinator.run(&plan, &cancel).await;
    interrupt.abort();
    // closes the event channel
    drop(coordinator);
    let _ = printer.await;

    let report = result?;
    print_report(&report, format)?;
    Ok(report.status.exit_code())
}

/// Show the latest report of a plan; exit code is 0 while it runs
pub async fn status(ctx: &Context, plan_id: &str, format: OutputFormat) -> CliResult<i32> {
    let id = parse_plan_id(plan_id)?;
    let record = ctx
        .plans
        .load(id)
        .await?
        .ok_or(CoordinatorError::PlanNotFound(id))?;

    print_report(&record.report, format)?;
    Ok(if record.report.status.is_finished() {
        record.report.status.exit_code()
    } else {
        0
    })
}

/// Ask the process running a plan to stop dispatching
pub async fn abort(ctx: &Context, plan_id: &str) -> CliResult<i32> {
    let id = parse_plan_id(plan_id)?;
    let record = ctx
        .plans
        .load(id)
        .await?
        .ok_or(CoordinatorError::PlanNotFound(id))?;

    if record.report.status.is_finished() {
        return Err(CoordinatorError::PlanFinished(id).into());
    }

    ctx.plans.request_abort(id).await?;
    print_success(&format!(
        "Abort requested for plan {}; in-flight targets finish, no new ones start",
        id
    ));
    Ok(0)
}

/// List known plans, newest first
pub async fn list(ctx: &Context, format: OutputFormat) -> CliResult<i32> {
    let rows: Vec<PlanRow> = ctx
        .plans
        .list()
        .await?
        .into_iter()
        .map(|record| PlanRow {
            id: record.plan.id().to_string(),
            version: record.plan.desired_version().to_string(),
            status: record.report.status.to_string(),
            targets: record.plan.targets().len(),
            created: record.plan.created_at().format("%Y-%m-%d %H:%M:%S").to_string(),
        })
        .collect();

    output::print_output(rows, format)?;
    Ok(0)
}

fn print_report(report: &RolloutReport, format: OutputFormat) -> CliResult<()> {
    if format != OutputFormat::Table {
        return output::print_single(report, format);
    }

    println!();
    println!("Plan:     {}", report.plan_id);
    println!("Version:  {}", report.desired_version);
    println!("Status:   {}", colored_status(&report.status));
    println!("Started:  {}", report.started_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(finished) = report.finished_at {
        println!("Finished: {}", finished.format("%Y-%m-%d %H:%M:%S"));
    }
    println!(
        "Targets:  {} succeeded, {} failed, {} untouched (failure ratio {:.2})",
        report.succeeded(),
        report.failed(),
        report.untouched(),
        report.failure_ratio()
    );
    println!();

    let rows: Vec<OutcomeRow> = report
        .targets
        .iter()
        .map(|outcome| OutcomeRow {
            target: outcome.target_id.to_string(),
            result: colored_result(&outcome.result).to_string(),
            batch: outcome
                .batch
                .map(|b| b.to_string())
                .unwrap_or_else(|| "-".into()),
            message: outcome.message.clone().unwrap_or_default(),
        })
        .collect();
    output::print_output(rows, format)
}
