// src/lib.rs

pub mod cli;
pub mod config;
pub mod duration;
pub mod errors;
pub mod logging;
pub mod master;
pub mod phase;
pub mod sink;
pub mod task;
pub mod types;
pub mod watchdog;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::load_and_validate;
use crate::config::model::{ConfigFile, TaskConfig};
use crate::master::{MasterTask, RunReport};
use crate::sink::Sink;

pub use crate::errors::TaskrError;
pub use crate::master::MasterTaskBuilder;
pub use crate::phase::{PhaseReport, TaskOutcome, TaskReport};
pub use crate::task::Task;
pub use crate::types::{FailurePolicy, Phase};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the master task built from the config
/// - stdout/stderr sinks
/// - Ctrl-C handling (→ `MasterTask::stop`)
pub async fn run(args: CliArgs) -> Result<()> {
    let mut cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading config from {:?}", args.config))?;

    if let Some(policy) = args.failure_policy {
        cfg.failure_policy = policy;
    }

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let master = Arc::new(MasterTask::from_config(&cfg)?);
    let out = Sink::stdout();
    let err = Sink::stderr();

    // Ctrl-C → stop every task; `run` then unwinds through the phases.
    {
        let master = Arc::clone(&master);
        let notice = out.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("Ctrl+C received; stopping all tasks");
            master.stop(&notice);
        });
    }

    let report = master.run(&out, &err).await?;
    log_summary(&report);

    let failures = report.failures();
    if !failures.is_empty() {
        anyhow::bail!(
            "{} task(s) failed: {}",
            failures.len(),
            failures.join("; ")
        );
    }
    Ok(())
}

fn log_summary(report: &RunReport) {
    for task in report.tasks() {
        if task.outcome.is_failure() {
            warn!(task = %task.task, outcome = %task.outcome, "task summary");
        } else {
            info!(
                task = %task.task,
                outcome = %task.outcome,
                elapsed_ms = task.elapsed.as_millis() as u64,
                "task summary"
            );
        }
    }
}

/// Simple dry-run output: print the phase plan.
fn print_dry_run(cfg: &ConfigFile) {
    println!("taskr dry-run");
    println!("  max_runtime = {}", cfg.max_runtime);
    println!("  max_checktime = {}", cfg.max_checktime);
    println!("  failure_policy = {}", cfg.failure_policy);
    println!();

    println!("before ({}):", cfg.before.len());
    for (name, task) in cfg.before_named() {
        print_task(&name, task);
    }
    println!("main:");
    print_task(&cfg.main_name(), &cfg.main);
    println!("after ({}):", cfg.after.len());
    for (name, task) in cfg.after_named() {
        print_task(&name, task);
    }

    debug!("dry-run complete (no execution)");
}

fn print_task(name: &str, task: &TaskConfig) {
    println!("  - {name}");
    println!("      cmd: {}", task.cmd);
    if let Some(ref cwd) = task.cwd {
        println!("      cwd: {}", cwd.display());
    }
    if !task.env.is_empty() {
        println!("      env: {:?}", task.env);
    }
}
