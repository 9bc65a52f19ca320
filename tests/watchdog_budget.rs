// tests/watchdog_budget.rs
mod common;
use crate::common::*;

use std::sync::Arc;
use std::time::Duration;

use taskr::master::MasterTask;
use taskr::phase::{PhaseRunner, TaskOutcome};
use taskr::sink::Sink;
use taskr::task::{Task, TaskState};
use taskr::types::Phase;

#[tokio::test]
async fn hung_before_task_is_stopped_once_and_run_still_succeeds() -> TestResult {
    init_tracing();

    let log = EventLog::new();
    let a = FakeTask::hang("A", &log);
    let m = FakeTask::complete("M", &log);

    let master = MasterTask::builder()
        .before(as_task(&a))
        .main(as_task(&m))
        .max_runtime("50ms")
        .max_checktime("10ms")
        .build()?;

    let (out, out_buf) = Sink::memory();
    let report = with_timeout(master.run(&out, &Sink::null())).await?;

    assert!(a.is_stopped());
    assert_eq!(a.state(), TaskState::Stopped);
    assert_eq!(out_buf.count_matching("task 'A' was stopped"), 1);
    assert_eq!(report.before.outcome_of("A"), Some(&TaskOutcome::TimedOut));
    assert!(report.is_success(), "a timeout is not a failure");
    assert_eq!(log.starts(), vec!["A", "M"]);
    Ok(())
}

#[tokio::test]
async fn never_ending_task_is_stopped_within_margin() -> TestResult {
    init_tracing();

    let log = EventLog::new();
    let a = FakeTask::hang("A", &log);
    let m = FakeTask::complete("M", &log);

    let master = Arc::new(
        MasterTask::builder()
            .before(as_task(&a))
            .main(as_task(&m))
            .max_runtime("100ms")
            .build()?,
    );

    let runner = {
        let master = Arc::clone(&master);
        tokio::spawn(async move { master.run(&Sink::null(), &Sink::null()).await })
    };

    wait_for_event(&log, "start:A").await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(a.is_stopped(), "A should have been force-stopped by now");

    let report = with_timeout(runner).await??;
    let elapsed = report.before.tasks[0].elapsed;
    assert!(
        elapsed >= Duration::from_millis(100) && elapsed < Duration::from_millis(150),
        "A ran for {elapsed:?}"
    );
    Ok(())
}

#[tokio::test]
async fn watchdog_is_disarmed_when_task_finishes_on_time() -> TestResult {
    init_tracing();

    let log = EventLog::new();
    let a = FakeTask::complete("A", &log);
    let b = FakeTask::sleep("B", Duration::from_millis(40), &log);
    let m = FakeTask::sleep("M", Duration::from_millis(40), &log);

    let master = MasterTask::builder()
        .before(as_task(&a))
        .before(as_task(&b))
        .main(as_task(&m))
        .max_runtime("60ms")
        .build()?;

    let report = master.run(&Sink::null(), &Sink::null()).await?;
    // Well past A's budget: a leaked timer would have fired by now.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(a.stop_calls(), 0);
    assert_eq!(b.stop_calls(), 0);
    assert_eq!(a.state(), TaskState::Completed);
    assert_eq!(b.state(), TaskState::Completed);
    assert_eq!(report.before.outcome_of("B"), Some(&TaskOutcome::Completed));
    Ok(())
}

#[tokio::test]
async fn main_task_is_never_watchdog_wrapped() -> TestResult {
    init_tracing();

    let log = EventLog::new();
    let m = FakeTask::sleep("M", Duration::from_millis(150), &log);

    let master = MasterTask::builder()
        .main(as_task(&m))
        .max_runtime("30ms")
        .build()?;

    let report = master.run(&Sink::null(), &Sink::null()).await?;

    assert_eq!(report.main.outcome, TaskOutcome::Completed);
    assert!(report.main.elapsed >= Duration::from_millis(150));
    assert_eq!(m.stop_calls(), 0);
    assert_eq!(m.state(), TaskState::Completed);
    Ok(())
}

#[tokio::test]
async fn after_phase_tasks_are_budgeted_too() -> TestResult {
    init_tracing();

    let log = EventLog::new();
    let m = FakeTask::complete("M", &log);
    let x = FakeTask::hang("X", &log);
    let y = FakeTask::complete("Y", &log);

    let master = MasterTask::builder()
        .main(as_task(&m))
        .after(as_task(&x))
        .after(as_task(&y))
        .max_runtime("40ms")
        .build()?;

    let (out, out_buf) = Sink::memory();
    let report = with_timeout(master.run(&out, &Sink::null())).await?;

    assert_eq!(report.after.outcome_of("X"), Some(&TaskOutcome::TimedOut));
    assert_eq!(report.after.outcome_of("Y"), Some(&TaskOutcome::Completed));
    assert_eq!(out_buf.count_matching("was stopped"), 1);
    assert_eq!(log.starts(), vec!["M", "X", "Y"]);
    Ok(())
}

#[tokio::test]
async fn phase_runner_can_be_driven_directly() -> TestResult {
    init_tracing();

    let log = EventLog::new();
    let slow = FakeTask::hang("slow", &log);
    let quick = FakeTask::complete("quick", &log);
    let tasks: Vec<Arc<dyn Task>> = vec![as_task(&slow), as_task(&quick)];

    let stopping = std::sync::atomic::AtomicBool::new(false);
    let runner = PhaseRunner::new(
        Phase::Before,
        Duration::from_millis(30),
        Duration::from_millis(5),
        &stopping,
    );

    let (out, out_buf) = Sink::memory();
    let report = with_timeout(runner.run(&tasks, &out, &Sink::null())).await;

    assert_eq!(report.phase, Phase::Before);
    assert_eq!(report.outcome_of("slow"), Some(&TaskOutcome::TimedOut));
    assert_eq!(report.outcome_of("quick"), Some(&TaskOutcome::Completed));
    assert_eq!(slow.stop_calls(), 1);
    assert_eq!(out_buf.count_matching("'slow' was stopped"), 1);
    assert_eq!(slow.end_check(), Duration::from_millis(5));
    Ok(())
}

#[tokio::test]
async fn failure_at_the_deadline_is_reported_as_a_failure() -> TestResult {
    init_tracing();

    let log = EventLog::new();
    let a = FakeTask::new("A", Behaviour::FailWhenChecked("boom".into()), &log);
    let m = FakeTask::complete("M", &log);
    let master = MasterTask::builder()
        .main(as_task(&m))
        .before(as_task(&a))
        .max_runtime("30ms")
        .max_checktime("5ms")
        .build()?;

    let (out, out_buf) = Sink::memory();
    let report = with_timeout(master.run(&out, &Sink::null())).await?;

    assert!(matches!(
        report.before.outcome_of("A"),
        Some(TaskOutcome::Failed(reason)) if reason.contains("boom")
    ));
    assert!(!report.is_success());
    assert_eq!(a.stop_calls(), 1);
    assert_eq!(a.state(), TaskState::Completed);
    assert_eq!(out_buf.count_matching("was stopped"), 0);
    assert_eq!(report.main.outcome, TaskOutcome::Completed);
    Ok(())
}
