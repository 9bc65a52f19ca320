// src/phase.rs

//! Sequential, watchdog-protected execution of one phase's tasks.
//!
//! For each task, in declared order:
//! 1. skip it if a stop was requested or fail-fast already tripped
//! 2. push the check interval down via `set_end_check`
//! 3. arm a [`Watchdog`] with the phase budget
//! 4. await `run`
//! 5. disarm (and join) the watchdog before touching the next task
//!
//! Task failures are collected into the [`PhaseReport`], never propagated,
//! so one failing task cannot abort its siblings under the default policy.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::errors::{Result, TaskrError};
use crate::sink::Sink;
use crate::task::Task;
use crate::types::{FailurePolicy, Phase};
use crate::watchdog::Watchdog;

/// How a single task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Finished on its own without error.
    Completed,
    /// `run` reported an error.
    Failed(String),
    /// Forcibly stopped by its watchdog.
    TimedOut,
    /// Stopped through `MasterTask::stop`.
    Stopped,
    /// Never launched.
    Skipped,
}

impl TaskOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failed(_))
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Completed => f.write_str("completed"),
            TaskOutcome::Failed(reason) => write!(f, "failed ({reason})"),
            TaskOutcome::TimedOut => f.write_str("timed out"),
            TaskOutcome::Stopped => f.write_str("stopped"),
            TaskOutcome::Skipped => f.write_str("skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub task: String,
    pub outcome: TaskOutcome,
    pub elapsed: Duration,
}

impl TaskReport {
    pub fn skipped(task: &dyn Task) -> Self {
        Self {
            task: task.name().to_string(),
            outcome: TaskOutcome::Skipped,
            elapsed: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub tasks: Vec<TaskReport>,
}

impl PhaseReport {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            tasks: Vec::new(),
        }
    }

    /// `"<task>: <reason>"` for every failed task.
    pub fn failures(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter_map(|t| match &t.outcome {
                TaskOutcome::Failed(reason) => Some(format!("{}: {}", t.task, reason)),
                _ => None,
            })
            .collect()
    }

    pub fn is_success(&self) -> bool {
        !self.tasks.iter().any(|t| t.outcome.is_failure())
    }

    pub fn outcome_of(&self, task: &str) -> Option<&TaskOutcome> {
        self.tasks.iter().find(|t| t.task == task).map(|t| &t.outcome)
    }

    /// Turn collected task failures into a single error.
    pub fn ensure_success(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(TaskrError::PhaseFailed {
            phase: self.phase.to_string(),
            failures: self.failures(),
        })
    }
}

/// Runs one phase. Borrowed from the orchestrator for the duration of the
/// phase.
#[derive(Debug)]
pub struct PhaseRunner<'a> {
    phase: Phase,
    budget: Duration,
    check_interval: Duration,
    policy: FailurePolicy,
    stopping: &'a AtomicBool,
}

impl<'a> PhaseRunner<'a> {
    pub fn new(
        phase: Phase,
        budget: Duration,
        check_interval: Duration,
        stopping: &'a AtomicBool,
    ) -> Self {
        Self {
            phase,
            budget,
            check_interval,
            policy: FailurePolicy::default(),
            stopping,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Execute `tasks` in order.
    ///
    /// Forced-stop notices from watchdogs go to `out`.
    pub async fn run(&self, tasks: &[Arc<dyn Task>], out: &Sink, err: &Sink) -> PhaseReport {
        let mut report = PhaseReport::new(self.phase);
        let mut tripped = false;

        info!(phase = %self.phase, tasks = tasks.len(), budget = ?self.budget, "phase starting");

        for task in tasks {
            if tripped || self.stopping.load(Ordering::Acquire) {
                debug!(phase = %self.phase, task = %task.name(), "skipping task");
                report.tasks.push(TaskReport::skipped(task.as_ref()));
                continue;
            }

            let task_report = self.run_one(task, out, err).await;
            if task_report.outcome.is_failure() && self.policy == FailurePolicy::FailFast {
                warn!(
                    phase = %self.phase,
                    task = %task_report.task,
                    "task failed with fail_fast policy; skipping the rest of the phase"
                );
                tripped = true;
            }
            report.tasks.push(task_report);
        }

        info!(
            phase = %self.phase,
            failures = report.failures().len(),
            "phase finished"
        );
        report
    }

    async fn run_one(&self, task: &Arc<dyn Task>, out: &Sink, err: &Sink) -> TaskReport {
        let name = task.name().to_string();
        task.set_end_check(self.check_interval);

        let started = Instant::now();
        let watchdog = Watchdog::arm(Arc::clone(task), self.budget, out.clone());
        let result = task.run(out, err).await;
        let fired = watchdog.disarm().await;
        let elapsed = started.elapsed();

        // `fired` and `was_stopped` only hold if a stop call actually ended
        // the task, so a task that finished first keeps its own result.
        let outcome = match result {
            _ if fired => TaskOutcome::TimedOut,
            Err(e) => {
                warn!(phase = %self.phase, task = %name, error = %e, "task failed");
                TaskOutcome::Failed(e.to_string())
            }
            Ok(()) if task.was_stopped() => TaskOutcome::Stopped,
            Ok(()) => TaskOutcome::Completed,
        };

        debug!(
            phase = %self.phase,
            task = %name,
            %outcome,
            elapsed_ms = elapsed.as_millis() as u64,
            "task finished"
        );

        TaskReport {
            task: name,
            outcome,
            elapsed,
        }
    }
}
