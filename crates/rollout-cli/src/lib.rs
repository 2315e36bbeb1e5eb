//! Rollout CLI - drive fleet rollouts from the terminal
//!
//! Operators use it to:
//! - Start a deployment plan and follow its progress
//! - Check the status of a running or finished plan from another shell
//! - Abort a running plan
//! - Register, inspect, roll back and decommission targets
//!
//! Exit codes: 0 when a plan succeeds, 1 when it is aborted or only partially
//! succeeds, 2 when the input (plan file, plan id, target id) is invalid.

#![deny(unsafe_code)]

use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

mod commands;
mod config;
mod context;
mod error;
mod output;

use commands::{plan, target};
pub use config::{CliConfig, InstallConfig, SecretsConfig, StatePaths};
use context::Context;
pub use error::{CliError, CliResult, EXIT_INVALID_INPUT};
pub use output::OutputFormat;

/// Rollout CLI application
#[derive(Parser)]
#[command(name = "rollout")]
#[command(about = "Rollout - idempotent, rollback-capable fleet deployments", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ROLLOUT_CONFIG")]
    config: Option<PathBuf>,

    /// State directory, overrides `state_dir` from the config file
    #[arg(long, env = "ROLLOUT_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Output format (table, json, yaml)
    #[arg(short, long, default_value = "table")]
    output: OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Run a deployment plan (YAML or JSON) to completion
    Start {
        /// Plan file
        plan_file: PathBuf,
    },

    /// Show the status of a plan
    Status {
        /// Plan ID
        plan_id: String,
    },

    /// Stop a running plan from dispatching further targets
    Abort {
        /// Plan ID
        plan_id: String,
    },

    /// List plans, newest first
    Plans,

    /// Manage targets
    Target {
        #[command(subcommand)]
        command: target::TargetCommands,
    },

    /// Show the effective configuration
    Config,
}

/// Run using the current process arguments; returns the process exit code.
pub async fn run() -> i32 {
    match run_with_args(std::env::args_os()).await {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&e.to_string());
            e.exit_code()
        }
    }
}

/// Run using the provided argument iterator.
pub async fn run_with_args<I, T>(args: I) -> CliResult<i32>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    let config = CliConfig::load(cli.config.as_deref())?;

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging = logging.with_level("debug");
    }
    rollout_observability::init_logging(&logging)?;

    let paths = config.paths(cli.state_dir.as_deref())?;

    if let Commands::Config = cli.command {
        println!("State:     {}", paths.root.display());
        println!("Artifacts: {}", paths.artifacts.display());
        println!("Audit log: {}", paths.audit_log.display());
        output::print_single(&config, cli.output)?;
        return Ok(0);
    }

    let ctx = Context::open(config, paths).await?;

    match cli.command {
        Commands::Start { plan_file } => plan::start(&ctx, &plan_file, cli.output).await,
        Commands::Status { plan_id } => plan::status(&ctx, &plan_id, cli.output).await,
        Commands::Abort { plan_id } => plan::abort(&ctx, &plan_id).await,
        Commands::Plans => plan::list(&ctx, cli.output).await,
        Commands::Target { command } => target::execute(command, &ctx, cli.output).await,
        Commands::Config => Ok(0),
    }
}
