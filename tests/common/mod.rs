#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use taskr::task::Task;

pub use taskr_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
pub use taskr_test_utils::fake_task::{Behaviour, EventLog, FakeTask};
pub use taskr_test_utils::{init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Upcast a fake into the trait object the engine stores.
pub fn as_task<T: Task + 'static>(task: &Arc<T>) -> Arc<dyn Task> {
    task.clone()
}

/// Poll `log` until `event` shows up (or panic after ~2s).
pub async fn wait_for_event(log: &EventLog, event: &str) {
    for _ in 0..200 {
        if log.position(event).is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("event {event} never happened; log = {:?}", log.events());
}
