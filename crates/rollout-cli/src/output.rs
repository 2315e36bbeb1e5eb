//! Output formatting utilities

use crate::error::CliResult;
use colored::*;
use rollout_types::{EventSeverity, PlanStatus, RolloutEvent, RolloutEventEnvelope, TargetResult};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

/// Print a vector of items in the specified format
pub fn print_output<T: Serialize + Tabled>(data: Vec<T>, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No results".dimmed());
            } else {
                println!("{}", Table::new(data));
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&data)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&data)?),
    }
    Ok(())
}

/// Print a single item in the specified format
pub fn print_single<T: Serialize>(data: &T, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Table | OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(data)?)
        }
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(data)?),
    }
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

pub fn colored_status(status: &PlanStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        PlanStatus::Succeeded => text.green(),
        PlanStatus::PartiallySucceeded { .. } => text.yellow(),
        PlanStatus::Aborted { .. } => text.red(),
        PlanStatus::Pending | PlanStatus::Running => text.blue(),
    }
}

pub fn colored_result(result: &TargetResult) -> ColoredString {
    let text = result.to_string();
    match result {
        TargetResult::Converged | TargetResult::AlreadyConverged => text.green(),
        TargetResult::RolledBack => text.yellow(),
        TargetResult::Failed { .. } => text.red(),
        TargetResult::Cancelled | TargetResult::Untouched => text.dimmed(),
    }
}

/// One progress line for a rollout event
pub fn print_event(envelope: &RolloutEventEnvelope) {
    let severity = match envelope.severity {
        EventSeverity::Info => "INFO".blue(),
        EventSeverity::Warning => "WARN".yellow(),
        EventSeverity::Error => "ERROR".red(),
    };
    let time = envelope.timestamp.format("%H:%M:%S").to_string();

    let line = match &envelope.event {
        RolloutEvent::PlanStarted {
            desired_version,
            targets,
            batches,
            ..
        } => format!(
            "rollout of {} to {} targets in {} batches",
            desired_version, targets, batches
        ),
        RolloutEvent::BatchStarted {
            index,
            canary,
            targets,
            ..
        } => {
            let kind = if *canary { "canary batch" } else { "batch" };
            format!("{} {} started ({} targets)", kind, index, targets)
        }
        RolloutEvent::BatchCompleted {
            index,
            failures,
            failure_ratio,
            ..
        } => format!(
            "batch {} completed: {} failed, failure ratio {:.2}",
            index, failures, failure_ratio
        ),
        RolloutEvent::TargetTransitioned {
            target_id, from, to,
        } => format!("{}: {} -> {}", target_id, from, to),
        RolloutEvent::TargetRetrying {
            target_id,
            kind,
            attempt,
        } => format!("{}: {} (failed attempt {}), retrying", target_id, kind, attempt),
        RolloutEvent::TargetFinished {
            target_id, result, ..
        } => format!("{}: {}", target_id, colored_result(result)),
        RolloutEvent::PlanAborted { reason, .. } => format!("dispatch halted: {}", reason),
        RolloutEvent::PlanFinished { status, .. } => {
            format!("plan finished: {}", colored_status(status))
        }
    };

    println!("{} {} {}", time.dimmed(), severity, line);
}
