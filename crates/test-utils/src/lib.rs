//! Shared helpers for `taskr` integration tests: a subscriber that plays
//! well with the test harness, a timeout guard, config builders and a
//! scriptable fake [`Task`](taskr::task::Task).

pub mod builders;
pub mod fake_task;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

/// Filter directives for test logs; falls back to `warn` for our crate.
pub const TEST_LOG_ENV_VAR: &str = "TASKR_TEST_LOG";

/// Upper bound for any single awaited test scenario.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

static INIT: Once = Once::new();

/// Install a captured subscriber once per test binary.
///
/// Output only shows for failing tests (or with `--nocapture`). Example:
/// `TASKR_TEST_LOG=taskr::watchdog=debug cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = std::env::var(TEST_LOG_ENV_VAR)
            .ok()
            .and_then(|d| EnvFilter::try_new(d).ok())
            .unwrap_or_else(|| EnvFilter::new("taskr=warn"));

        // Another harness may have installed one already.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Await `f`, panicking if it takes longer than [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(v) => v,
        Err(_) => panic!("scenario did not finish within {TEST_TIMEOUT:?}"),
    }
}
