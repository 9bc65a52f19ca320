// src/watchdog.rs

//! Per-task run-time budget enforcement.
//!
//! A [`Watchdog`] is armed right before a task's `run` is awaited and
//! disarmed right after it returns. If the budget elapses first and the task
//! has not reached a terminal state, the watchdog calls `task.stop(kill_sink)`
//! once. The watchdog only counts as fired if that call is the one that
//! stopped the task; a task that finishes in the same instant keeps its own
//! outcome.
//!
//! The timer's lifetime is tied to the `Watchdog` value:
//! - [`Watchdog::disarm`] cancels the timer and waits for the background
//!   Tokio task to finish, so a timer that is in the middle of firing
//!   completes before the caller moves on to the next task.
//! - Dropping an armed `Watchdog` (early return, panic unwinding, a cancelled
//!   future) cancels and aborts the timer as well.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::sink::Sink;
use crate::task::Task;

#[derive(Debug)]
pub struct Watchdog {
    task_name: String,
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    fired: Arc<AtomicBool>,
}

impl Watchdog {
    /// Start a background timer for `budget` guarding `task`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn arm(task: Arc<dyn Task>, budget: Duration, kill_sink: Sink) -> Self {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let task_name = task.name().to_string();

        debug!(task = %task_name, ?budget, "watchdog armed");

        let handle = {
            let fired = Arc::clone(&fired);
            tokio::spawn(async move {
                tokio::select! {
                    _ = sleep(budget) => {
                        if task.is_stopped() {
                            debug!(task = %task.name(), "watchdog budget elapsed but task already terminal");
                            return;
                        }
                        if task.stop(&kill_sink) {
                            warn!(
                                task = %task.name(),
                                ?budget,
                                "task exceeded its run-time budget; forced stop"
                            );
                            fired.store(true, Ordering::Release);
                        } else {
                            debug!(task = %task.name(), "task finished as its budget elapsed");
                        }
                    }
                    _ = cancel_rx => {
                        // Explicit disarm or the Watchdog was dropped.
                    }
                }
            })
        };

        Self {
            task_name,
            cancel: Some(cancel_tx),
            handle: Some(handle),
            fired,
        }
    }

    /// Whether the budget elapsed and the watchdog's stop ended the task.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Cancel the timer and wait for its background task to end.
    ///
    /// Returns true if the watchdog forced the task to stop.
    pub async fn disarm(mut self) -> bool {
        if let Some(cancel) = self.cancel.take() {
            // Err means the timer already ran to completion.
            let _ = cancel.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(task = %self.task_name, error = %e, "watchdog timer task ended abnormally");
            }
        }
        debug!(task = %self.task_name, fired = self.has_fired(), "watchdog disarmed");
        self.has_fired()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
