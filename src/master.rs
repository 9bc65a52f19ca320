// src/master.rs

//! The master orchestrator: before → main → after.
//!
//! Before and After tasks each run under a watchdog with the `max_runtime`
//! budget. The Main task is awaited directly and is never watchdog-wrapped:
//! it keeps the output/error sinks for as long as it naturally runs, or until
//! somebody calls [`MasterTask::stop`].
//!
//! `stop` is the only operation meant to be called concurrently with `run`
//! (e.g. from a Ctrl-C handler). It sets the stopping flag, cascades `stop`
//! to the owned tasks and returns without waiting for anything. Tasks that
//! have not started by the time a phase observes the flag are skipped.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::duration::parse_duration;
use crate::errors::{Result, TaskrError};
use crate::phase::{PhaseReport, PhaseRunner, TaskOutcome, TaskReport};
use crate::sink::Sink;
use crate::task::{CommandTask, Task};
use crate::types::{FailurePolicy, Phase};

pub const DEFAULT_MAX_RUNTIME: &str = "5m";
pub const DEFAULT_MAX_CHECKTIME: &str = "1s";

/// Where a master task is in its single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterState {
    Idle,
    RunningBefore,
    RunningMain,
    RunningAfter,
    Done,
}

impl fmt::Display for MasterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MasterState::Idle => "idle",
            MasterState::RunningBefore => "running-before",
            MasterState::RunningMain => "running-main",
            MasterState::RunningAfter => "running-after",
            MasterState::Done => "done",
        };
        f.write_str(s)
    }
}

/// Result of a completed (possibly partially failed) run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub before: PhaseReport,
    pub main: TaskReport,
    pub after: PhaseReport,
}

impl RunReport {
    pub fn failures(&self) -> Vec<String> {
        let mut failures = self.before.failures();
        if let TaskOutcome::Failed(reason) = &self.main.outcome {
            failures.push(format!("{}: {}", self.main.task, reason));
        }
        failures.extend(self.after.failures());
        failures
    }

    pub fn is_success(&self) -> bool {
        self.failures().is_empty()
    }

    /// Every task report in execution order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskReport> {
        self.before
            .tasks
            .iter()
            .chain(std::iter::once(&self.main))
            .chain(self.after.tasks.iter())
    }
}

pub struct MasterTask {
    main: Arc<dyn Task>,
    before: Vec<Arc<dyn Task>>,
    after: Vec<Arc<dyn Task>>,
    max_runtime: String,
    max_checktime: String,
    failure_policy: FailurePolicy,
    state: Mutex<MasterState>,
    stopping: AtomicBool,
}

impl fmt::Debug for MasterTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterTask")
            .field("main", &self.main.name())
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .field("max_runtime", &self.max_runtime)
            .field("max_checktime", &self.max_checktime)
            .field("failure_policy", &self.failure_policy)
            .field("state", &self.state())
            .finish()
    }
}

impl MasterTask {
    pub fn builder() -> MasterTaskBuilder {
        MasterTaskBuilder::default()
    }

    /// Build a master task of [`CommandTask`]s from a validated config.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let named = |name: String, task: &crate::config::TaskConfig| -> Arc<dyn Task> {
            Arc::new(CommandTask::from_config(&name, task))
        };

        let mut builder = MasterTask::builder()
            .main(named(cfg.main_name(), &cfg.main))
            .max_runtime(&cfg.max_runtime)
            .max_checktime(&cfg.max_checktime)
            .failure_policy(cfg.failure_policy);

        for (name, task) in cfg.before_named() {
            builder = builder.before(named(name, task));
        }
        for (name, task) in cfg.after_named() {
            builder = builder.after(named(name, task));
        }

        builder.build()
    }

    pub fn state(&self) -> MasterState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    pub fn main_task(&self) -> &Arc<dyn Task> {
        &self.main
    }

    pub fn before_tasks(&self) -> &[Arc<dyn Task>] {
        &self.before
    }

    pub fn after_tasks(&self) -> &[Arc<dyn Task>] {
        &self.after
    }

    fn set_state(&self, next: MasterState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(from = %*state, to = %next, "master state transition");
        *state = next;
    }

    /// Parse and sanity-check both durations.
    fn durations(&self) -> Result<(Duration, Duration)> {
        let budget = parse_field("max_runtime", &self.max_runtime)?;
        let check = parse_field("max_checktime", &self.max_checktime)?;
        Ok((budget, check))
    }

    /// Run every phase in order.
    ///
    /// Returns `Err` only for configuration problems, all of which are
    /// detected before any task starts. Task failures, timeouts and stops are
    /// reported through the returned [`RunReport`].
    pub async fn run(&self, out: &Sink, err: &Sink) -> Result<RunReport> {
        let (budget, check) = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != MasterState::Idle {
                return Err(TaskrError::AlreadyStarted);
            }
            let durations = self.durations()?;
            *state = MasterState::RunningBefore;
            durations
        };

        let started = Instant::now();
        info!(
            main = %self.main.name(),
            before = self.before.len(),
            after = self.after.len(),
            ?budget,
            ?check,
            "master task starting"
        );

        let before = self
            .phase_runner(Phase::Before, budget, check)
            .run(&self.before, out, err)
            .await;
        let mut tripped = self.tripped(&before);

        self.set_state(MasterState::RunningMain);
        let main = if tripped || self.is_stopping() {
            debug!(task = %self.main.name(), "skipping main task");
            TaskReport::skipped(self.main.as_ref())
        } else {
            self.run_main(out, err, check).await
        };
        tripped = tripped || (self.failure_policy == FailurePolicy::FailFast && main.outcome.is_failure());

        self.set_state(MasterState::RunningAfter);
        let after = if tripped {
            PhaseReport {
                phase: Phase::After,
                tasks: self.after.iter().map(|t| TaskReport::skipped(t.as_ref())).collect(),
            }
        } else {
            self.phase_runner(Phase::After, budget, check)
                .run(&self.after, out, err)
                .await
        };

        self.set_state(MasterState::Done);

        let report = RunReport { before, main, after };
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            failures = report.failures().len(),
            stopped = self.is_stopping(),
            "master task finished"
        );
        Ok(report)
    }

    fn phase_runner(&self, phase: Phase, budget: Duration, check: Duration) -> PhaseRunner<'_> {
        PhaseRunner::new(phase, budget, check, &self.stopping).with_policy(self.failure_policy)
    }

    fn tripped(&self, report: &PhaseReport) -> bool {
        self.failure_policy == FailurePolicy::FailFast && !report.is_success()
    }

    async fn run_main(&self, out: &Sink, err: &Sink, check: Duration) -> TaskReport {
        let name = self.main.name().to_string();
        self.main.set_end_check(check);

        info!(task = %name, "main task starting");
        let started = Instant::now();
        let result = self.main.run(out, err).await;
        let elapsed = started.elapsed();

        let outcome = match result {
            Err(e) => {
                warn!(task = %name, error = %e, "main task failed");
                TaskOutcome::Failed(e.to_string())
            }
            Ok(()) if self.main.was_stopped() => TaskOutcome::Stopped,
            Ok(()) => TaskOutcome::Completed,
        };
        info!(task = %name, %outcome, elapsed_ms = elapsed.as_millis() as u64, "main task finished");

        TaskReport {
            task: name,
            outcome,
            elapsed,
        }
    }

    /// Request termination of everything this master task owns.
    ///
    /// Stops every Before task that is not already stopped, then the Main
    /// task unconditionally, then every After task that is not already
    /// stopped. Never blocks on task completion; safe to call from another
    /// thread while `run` is in flight, and safe to call repeatedly.
    pub fn stop(&self, notice: &Sink) {
        if !self.stopping.swap(true, Ordering::AcqRel) {
            info!(state = %self.state(), "stop requested for master task");
        }

        for task in self.before.iter().filter(|t| !t.is_stopped()) {
            task.stop(notice);
        }

        self.main.stop(notice);

        for task in self.after.iter().filter(|t| !t.is_stopped()) {
            task.stop(notice);
        }
    }
}

fn parse_field(field: &'static str, value: &str) -> Result<Duration> {
    let parsed = parse_duration(value).map_err(|reason| TaskrError::InvalidDuration {
        field,
        value: value.to_string(),
        reason,
    })?;
    if parsed.is_zero() {
        return Err(TaskrError::InvalidDuration {
            field,
            value: value.to_string(),
            reason: "duration must be greater than zero".to_string(),
        });
    }
    Ok(parsed)
}

/// Check a duration field without building a master task.
pub fn validate_duration(field: &'static str, value: &str) -> Result<Duration> {
    parse_field(field, value)
}

/// Builder for [`MasterTask`]; `build` rejects a missing main task.
pub struct MasterTaskBuilder {
    main: Option<Arc<dyn Task>>,
    before: Vec<Arc<dyn Task>>,
    after: Vec<Arc<dyn Task>>,
    max_runtime: String,
    max_checktime: String,
    failure_policy: FailurePolicy,
}

impl Default for MasterTaskBuilder {
    fn default() -> Self {
        Self {
            main: None,
            before: Vec::new(),
            after: Vec::new(),
            max_runtime: DEFAULT_MAX_RUNTIME.to_string(),
            max_checktime: DEFAULT_MAX_CHECKTIME.to_string(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl MasterTaskBuilder {
    pub fn main(mut self, task: Arc<dyn Task>) -> Self {
        self.main = Some(task);
        self
    }

    pub fn before(mut self, task: Arc<dyn Task>) -> Self {
        self.before.push(task);
        self
    }

    pub fn after(mut self, task: Arc<dyn Task>) -> Self {
        self.after.push(task);
        self
    }

    /// Textual budget for each Before/After task, e.g. `"5m"`.
    ///
    /// Parsed when the master task runs.
    pub fn max_runtime(mut self, value: &str) -> Self {
        self.max_runtime = value.to_string();
        self
    }

    /// Textual liveness-check interval pushed into each task, e.g. `"1s"`.
    pub fn max_checktime(mut self, value: &str) -> Self {
        self.max_checktime = value.to_string();
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn build(self) -> Result<MasterTask> {
        let main = self.main.ok_or(TaskrError::MissingMain)?;
        Ok(MasterTask {
            main,
            before: self.before,
            after: self.after,
            max_runtime: self.max_runtime,
            max_checktime: self.max_checktime,
            failure_policy: self.failure_policy,
            state: Mutex::new(MasterState::Idle),
            stopping: AtomicBool::new(false),
        })
    }
}
