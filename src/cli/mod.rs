//! Command-line interface for execloop.
//!
//! Provides commands for running step lists, inspecting the ledger, and
//! extracting structured results from arbitrary text.

use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use crate::config::ExecutorConfig;
use crate::core::{extract_first_object, Ledger, Orchestrator};
use crate::domain::{ExecutionReport, RunStatus};

/// execloop - Sequential command executor with an audit ledger
#[derive(Parser, Debug)]
#[command(name = "execloop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Ledger database path (overrides config file and EXECLOOP_HOME)
    #[arg(long, global = true, env = "EXECLOOP_LEDGER")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a step list, rolling back on failure
    Run {
        /// Step list (JSON, or YAML with a .yaml/.yml extension)
        #[arg(short, long)]
        commands: PathBuf,

        /// Rollback step list, used only if a step fails
        #[arg(short, long)]
        rollback: Option<PathBuf>,

        /// Run name (generated from the current time if not provided)
        #[arg(long)]
        run_name: Option<String>,
    },

    /// Create or upgrade the ledger schema
    DbInit,

    /// Count rows per ledger table
    DbStats,

    /// Show a run with its steps and events
    Status {
        /// Run ID
        run_id: i64,
    },

    /// List recent runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Print the first JSON object found in text
    Extract {
        /// Input file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = ExecutorConfig::load()?.override_ledger(self.db);

        match self.command {
            Commands::Run {
                commands,
                rollback,
                run_name,
            } => run_steps(config, commands, rollback, run_name).await,
            Commands::DbInit => db_init(&config),
            Commands::DbStats => db_stats(&config),
            Commands::Status { run_id } => show_status(&config, run_id),
            Commands::Runs { limit } => list_runs(&config, limit),
            Commands::Extract { input } => extract(input),
            Commands::Config => show_config(&config),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

/// Run a step list and print the report
async fn run_steps(
    config: ExecutorConfig,
    commands: PathBuf,
    rollback: Option<PathBuf>,
    run_name: Option<String>,
) -> Result<()> {
    let report = match Orchestrator::new(config) {
        Ok(orchestrator) => {
            orchestrator
                .run(&commands, rollback.as_deref(), run_name.as_deref())
                .await
        }
        Err(e) => {
            let mut report = ExecutionReport::failed(None);
            report.abort(format!("ledger error: {e}"));
            report
        }
    };

    print_json(&report)?;
    if !report.ok {
        std::process::exit(1);
    }

    Ok(())
}

fn db_init(config: &ExecutorConfig) -> Result<()> {
    let ledger = Ledger::open(&config.ledger_path).context("Failed to open ledger")?;
    print_json(&json!({ "ok": true, "db": ledger.path().display().to_string() }))
}

fn db_stats(config: &ExecutorConfig) -> Result<()> {
    let ledger = Ledger::open(&config.ledger_path).context("Failed to open ledger")?;
    let stats = ledger.stats().context("Failed to count ledger rows")?;
    print_json(&json!({
        "ok": true,
        "db": ledger.path().display().to_string(),
        "stats": stats,
    }))
}

/// Show the status of a run
fn show_status(config: &ExecutorConfig, run_id: i64) -> Result<()> {
    let ledger = Ledger::open(&config.ledger_path).context("Failed to open ledger")?;
    let run = ledger
        .run(run_id)?
        .with_context(|| format!("Run {} not found", run_id))?;
    let steps = ledger.steps_for_run(run_id)?;
    let events = ledger.events_for_run(run_id)?;

    print_json(&json!({
        "run": run,
        "steps": steps,
        "events": events,
    }))
}

/// List recent runs
fn list_runs(config: &ExecutorConfig, limit: usize) -> Result<()> {
    let ledger = Ledger::open(&config.ledger_path).context("Failed to open ledger")?;
    let runs = ledger.recent_runs(limit)?;

    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    println!("{:<8} {:<32} {:<10} {:<28}", "RUN ID", "NAME", "STATUS", "STARTED");
    println!("{}", "-".repeat(80));

    for run in runs {
        let status = run.status.map(|s: RunStatus| s.as_str()).unwrap_or("-");
        println!(
            "{:<8} {:<32} {:<10} {:<28}",
            run.id,
            run.name.as_deref().unwrap_or("-"),
            status,
            run.started_at.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

/// Extract the first JSON object from a file or stdin
fn extract(input: Option<PathBuf>) -> Result<()> {
    let text = if let Some(path) = input {
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        buffer
    };

    match extract_first_object(&text) {
        Ok(object) => print_json(&object),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

/// Show resolved configuration
fn show_config(config: &ExecutorConfig) -> Result<()> {
    println!("execloop configuration");
    println!("======================");
    println!(
        "Config file: {}",
        config
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!("Ledger: {}", config.ledger_path.display());
    println!("Preview chars: {}", config.preview_chars);
    println!("Rollback preview chars: {}", config.rollback_preview_chars);
    println!("Run name prefix: {}", config.run_name_prefix);
    Ok(())
}
