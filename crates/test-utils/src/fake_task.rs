use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use taskr::errors::TaskrError;
use taskr::sink::Sink;
use taskr::task::{stop_notice, Task, TaskFuture, TaskLifecycle, TaskState};

/// What a [`FakeTask`] does once it runs.
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Finish immediately.
    Complete,
    /// Finish immediately with a `TaskFailed` error.
    Fail(String),
    /// Never finish on its own; only `stop` ends it.
    Hang,
    /// Finish after the given time unless stopped first.
    Sleep(Duration),
    /// Fail on its own the moment anyone checks `is_stopped`, which is what
    /// a watchdog does when the budget runs out.
    FailWhenChecked(String),
}

/// Shared, ordered record of lifecycle events across many fake tasks.
///
/// Entries look like `start:A`, `end:A`, `stop:A`.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Task names in the order they started.
    pub fn starts(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|e| e.strip_prefix("start:").map(str::to_string))
            .collect()
    }

    /// Index of the first occurrence of `event`.
    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

/// A spy/fake `Task` that records everything the engine does to it.
#[derive(Debug)]
pub struct FakeTask {
    name: String,
    behaviour: Behaviour,
    lifecycle: TaskLifecycle,
    log: EventLog,
    checked: Notify,
    run_calls: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl FakeTask {
    pub fn new(name: &str, behaviour: Behaviour, log: &EventLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behaviour,
            lifecycle: TaskLifecycle::new(),
            log: log.clone(),
            checked: Notify::new(),
            run_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        })
    }

    pub fn complete(name: &str, log: &EventLog) -> Arc<Self> {
        Self::new(name, Behaviour::Complete, log)
    }

    pub fn hang(name: &str, log: &EventLog) -> Arc<Self> {
        Self::new(name, Behaviour::Hang, log)
    }

    pub fn fail(name: &str, reason: &str, log: &EventLog) -> Arc<Self> {
        Self::new(name, Behaviour::Fail(reason.to_string()), log)
    }

    pub fn sleep(name: &str, dur: Duration, log: &EventLog) -> Arc<Self> {
        Self::new(name, Behaviour::Sleep(dur), log)
    }

    /// How many times `run` was invoked.
    pub fn run_calls(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }

    /// How many times `stop` was invoked (including no-op calls).
    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn end_check(&self) -> Duration {
        self.lifecycle.end_check()
    }
}

impl Task for FakeTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_end_check(&self, interval: Duration) {
        self.lifecycle.set_end_check(interval);
    }

    fn run<'a>(&'a self, out: &'a Sink, _err: &'a Sink) -> TaskFuture<'a> {
        Box::pin(async move {
            self.run_calls.fetch_add(1, Ordering::SeqCst);
            if !self.lifecycle.start() {
                return Ok(());
            }
            self.log.push(format!("start:{}", self.name));
            out.write_line(&format!("{} running", self.name));

            let result = match &self.behaviour {
                Behaviour::Complete => Ok(()),
                Behaviour::Fail(reason) => Err(TaskrError::TaskFailed {
                    task: self.name.clone(),
                    reason: reason.clone(),
                }),
                Behaviour::Hang => {
                    self.lifecycle.stop_requested().await;
                    Ok(())
                }
                Behaviour::Sleep(dur) => {
                    tokio::select! {
                        _ = tokio::time::sleep(*dur) => {}
                        _ = self.lifecycle.stop_requested() => {}
                    }
                    Ok(())
                }
                Behaviour::FailWhenChecked(reason) => {
                    tokio::select! {
                        _ = self.checked.notified() => Err(TaskrError::TaskFailed {
                            task: self.name.clone(),
                            reason: reason.clone(),
                        }),
                        _ = self.lifecycle.stop_requested() => Ok(()),
                    }
                }
            };

            self.lifecycle.finish();
            self.log.push(format!("end:{}", self.name));
            result
        })
    }

    fn stop(&self, notice: &Sink) -> bool {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if !self.lifecycle.stop() {
            return false;
        }
        self.log.push(format!("stop:{}", self.name));
        notice.write_line(&stop_notice(&self.name));
        true
    }

    fn state(&self) -> TaskState {
        self.lifecycle.state()
    }

    fn is_stopped(&self) -> bool {
        if matches!(self.behaviour, Behaviour::FailWhenChecked(_)) && self.lifecycle.finish() {
            self.checked.notify_one();
            return false;
        }
        self.lifecycle.is_stopped()
    }
}
