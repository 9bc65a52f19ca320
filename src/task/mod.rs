// src/task/mod.rs

//! The task contract consumed by the engine.
//!
//! The engine never cares *what* a task does; it only needs:
//! - `run`: do the work, resolving when finished or stopped
//! - `stop`: request termination from any thread, idempotently
//! - `state`: where the task is in its lifecycle
//!
//! - [`lifecycle`] holds the atomic state machine every implementation
//!   should delegate to.
//! - [`command`] is the production implementation that runs a shell command.
//!
//! Tests provide their own `Task` implementations (see the
//! `taskr-test-utils` crate).

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::errors::Result;
use crate::sink::Sink;

pub mod command;
pub mod lifecycle;

pub use command::CommandTask;
pub use lifecycle::{TaskLifecycle, TaskState};

pub type TaskFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

pub trait Task: Send + Sync + Debug {
    /// Display name used in logs and reports.
    fn name(&self) -> &str;

    /// Liveness-poll interval the task should use while running.
    ///
    /// Called by the engine before `run`.
    fn set_end_check(&self, interval: Duration);

    /// Run the task to completion.
    ///
    /// Resolves when the task finishes on its own or after `stop` was
    /// called. A task that was stopped before `run` must resolve immediately
    /// without doing any work. Being stopped is not an error.
    fn run<'a>(&'a self, out: &'a Sink, err: &'a Sink) -> TaskFuture<'a>;

    /// Request termination.
    ///
    /// Must be idempotent and callable from a different thread than the one
    /// awaiting `run`. Only the call that actually stops the task writes a
    /// notice to `notice`. Must not block on the task winding down.
    ///
    /// Returns true only for that call. A task that already finished on its
    /// own returns false.
    fn stop(&self, notice: &Sink) -> bool;

    fn state(&self) -> TaskState;

    /// True once the task is terminal, whether it completed or was stopped.
    fn is_stopped(&self) -> bool {
        self.state().is_terminal()
    }

    /// True only if `stop` ended the task.
    fn was_stopped(&self) -> bool {
        self.state() == TaskState::Stopped
    }
}

/// Notice written by the call that forcibly stops a task.
pub fn stop_notice(task: &str) -> String {
    format!("[taskr] task '{task}' was stopped")
}
