// src/task/lifecycle.rs

//! Thread-safe lifecycle state shared by every [`Task`](super::Task)
//! implementation.
//!
//! State moves `Idle → Running → Completed | Stopped`, or straight from
//! `Idle` to `Stopped` when a task is stopped before it ever ran. Terminal
//! states are never left. All transitions go through compare-and-swap on an
//! atomic, so the natural-completion path and a concurrent `stop` (from a
//! watchdog or from the orchestrator) agree on exactly one winner.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

/// Default liveness-poll interval before an orchestrator pushes one down.
pub const DEFAULT_END_CHECK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    /// Finished on its own.
    Completed,
    /// Terminated through `stop`.
    Stopped,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Stopped)
    }

    fn from_u8(v: u8) -> Self {
        match v {
            IDLE => TaskState::Idle,
            RUNNING => TaskState::Running,
            COMPLETED => TaskState::Completed,
            _ => TaskState::Stopped,
        }
    }
}

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const COMPLETED: u8 = 2;
const STOPPED: u8 = 3;

#[derive(Debug)]
pub struct TaskLifecycle {
    state: AtomicU8,
    end_check: Mutex<Duration>,
    stop_tx: watch::Sender<bool>,
}

impl Default for TaskLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskLifecycle {
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            state: AtomicU8::new(IDLE),
            end_check: Mutex::new(DEFAULT_END_CHECK),
            stop_tx,
        }
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_stopped(&self) -> bool {
        self.state().is_terminal()
    }

    /// `Idle → Running`. Returns false if the task was already stopped (or
    /// had already run), in which case the caller must not start any work.
    pub fn start(&self) -> bool {
        self.state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `Running → Completed`. Returns false if a concurrent `stop` won.
    pub fn finish(&self) -> bool {
        self.state
            .compare_exchange(RUNNING, COMPLETED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `Idle | Running → Stopped`.
    ///
    /// Returns true only for the single call that performed the transition;
    /// every later call (and any call after natural completion) is a no-op.
    pub fn stop(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == COMPLETED || current == STOPPED {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                STOPPED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.stop_tx.send_replace(true);
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Resolves once `stop` has been called. Resolves immediately if it
    /// already was.
    pub async fn stop_requested(&self) {
        let mut rx = self.stop_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail while we
        // are borrowed.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    pub fn end_check(&self) -> Duration {
        *self.end_check.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_end_check(&self, interval: Duration) {
        *self.end_check.lock().unwrap_or_else(PoisonError::into_inner) = interval;
    }
}
