// tests/master_ordering.rs
mod common;
use crate::common::*;

use std::time::Duration;

use taskr::errors::TaskrError;
use taskr::master::{MasterState, MasterTask};
use taskr::phase::TaskOutcome;
use taskr::sink::Sink;
use taskr::types::FailurePolicy;

#[tokio::test]
async fn before_main_after_run_in_declared_order() -> TestResult {
    init_tracing();

    let log = EventLog::new();
    let a = FakeTask::complete("A", &log);
    let m = FakeTask::complete("M", &log);
    let b = FakeTask::complete("B", &log);

    let master = MasterTask::builder()
        .before(as_task(&a))
        .main(as_task(&m))
        .after(as_task(&b))
        .max_runtime("1s")
        .max_checktime("10ms")
        .build()?;

    let (out, out_buf) = Sink::memory();
    let report = master.run(&out, &Sink::null()).await?;

    assert!(report.is_success());
    assert_eq!(log.starts(), vec!["A", "M", "B"]);
    assert_eq!(out_buf.lines(), vec!["A running", "M running", "B running"]);
    assert_eq!(master.state(), MasterState::Done);

    let outcomes: Vec<_> = report.tasks().map(|t| t.outcome.clone()).collect();
    assert_eq!(outcomes, vec![TaskOutcome::Completed; 3]);
    Ok(())
}

#[tokio::test]
async fn each_task_is_terminal_before_the_next_starts() -> TestResult {
    init_tracing();

    let log = EventLog::new();
    let before: Vec<_> = (0..4)
        .map(|i| FakeTask::sleep(&format!("b{i}"), Duration::from_millis(15), &log))
        .collect();
    let m = FakeTask::sleep("M", Duration::from_millis(15), &log);
    let after: Vec<_> = (0..2)
        .map(|i| FakeTask::sleep(&format!("a{i}"), Duration::from_millis(15), &log))
        .collect();

    let mut builder = MasterTask::builder().main(as_task(&m)).max_runtime("1s");
    for t in &before {
        builder = builder.before(as_task(t));
    }
    for t in &after {
        builder = builder.after(as_task(t));
    }
    let master = builder.build()?;

    master.run(&Sink::null(), &Sink::null()).await?;

    let order = ["b0", "b1", "b2", "b3", "M", "a0", "a1"];
    for pair in order.windows(2) {
        let end_prev = log.position(&format!("end:{}", pair[0])).unwrap();
        let start_next = log.position(&format!("start:{}", pair[1])).unwrap();
        assert!(
            end_prev < start_next,
            "{} must finish before {} starts: {:?}",
            pair[0],
            pair[1],
            log.events()
        );
    }
    Ok(())
}

#[tokio::test]
async fn check_interval_is_pushed_into_every_task() -> TestResult {
    init_tracing();

    let log = EventLog::new();
    let a = FakeTask::complete("A", &log);
    let m = FakeTask::complete("M", &log);
    let b = FakeTask::complete("B", &log);

    let master = MasterTask::builder()
        .before(as_task(&a))
        .main(as_task(&m))
        .after(as_task(&b))
        .max_checktime("25ms")
        .build()?;
    master.run(&Sink::null(), &Sink::null()).await?;

    for task in [&a, &m, &b] {
        assert_eq!(task.end_check(), Duration::from_millis(25));
    }
    Ok(())
}

#[tokio::test]
async fn failing_tasks_do_not_abort_their_phase_or_later_phases() -> TestResult {
    init_tracing();

    let log = EventLog::new();
    let f = FakeTask::fail("F", "boom", &log);
    let a = FakeTask::complete("A", &log);
    let m = FakeTask::fail("M", "main broke", &log);
    let g = FakeTask::fail("G", "bang", &log);
    let b = FakeTask::complete("B", &log);

    let master = MasterTask::builder()
        .before(as_task(&f))
        .before(as_task(&a))
        .main(as_task(&m))
        .after(as_task(&g))
        .after(as_task(&b))
        .build()?;

    let report = master.run(&Sink::null(), &Sink::null()).await?;

    assert_eq!(log.starts(), vec!["F", "A", "M", "G", "B"]);
    assert!(!report.is_success());
    assert_eq!(report.before.outcome_of("A"), Some(&TaskOutcome::Completed));
    assert!(matches!(report.before.outcome_of("F"), Some(TaskOutcome::Failed(r)) if r.contains("boom")));
    assert!(report.main.outcome.is_failure());
    assert_eq!(report.after.outcome_of("B"), Some(&TaskOutcome::Completed));

    let failures = report.failures();
    assert_eq!(failures.len(), 3);
    assert!(failures[0].starts_with("F: "));
    assert!(failures[1].starts_with("M: "));
    assert!(failures[2].starts_with("G: "));

    match report.after.clone().ensure_success() {
        Err(TaskrError::PhaseFailed { phase, failures }) => {
            assert_eq!(phase, "after");
            assert_eq!(failures.len(), 1);
        }
        other => panic!("expected PhaseFailed, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn fail_fast_skips_the_rest_of_the_run() -> TestResult {
    init_tracing();

    let log = EventLog::new();
    let f = FakeTask::fail("F", "boom", &log);
    let a = FakeTask::complete("A", &log);
    let m = FakeTask::complete("M", &log);
    let b = FakeTask::complete("B", &log);

    let master = MasterTask::builder()
        .before(as_task(&f))
        .before(as_task(&a))
        .main(as_task(&m))
        .after(as_task(&b))
        .failure_policy(FailurePolicy::FailFast)
        .build()?;

    let report = master.run(&Sink::null(), &Sink::null()).await?;

    assert_eq!(log.starts(), vec!["F"]);
    assert_eq!(report.before.outcome_of("A"), Some(&TaskOutcome::Skipped));
    assert_eq!(report.main.outcome, TaskOutcome::Skipped);
    assert_eq!(report.after.outcome_of("B"), Some(&TaskOutcome::Skipped));
    for t in [&a, &m, &b] {
        assert_eq!(t.run_calls(), 0);
    }
    Ok(())
}

#[tokio::test]
async fn fail_fast_main_failure_skips_after_phase() -> TestResult {
    init_tracing();

    let log = EventLog::new();
    let m = FakeTask::fail("M", "nope", &log);
    let b = FakeTask::complete("B", &log);

    let master = MasterTask::builder()
        .main(as_task(&m))
        .after(as_task(&b))
        .failure_policy(FailurePolicy::FailFast)
        .build()?;

    let report = master.run(&Sink::null(), &Sink::null()).await?;

    assert!(report.main.outcome.is_failure());
    assert_eq!(report.after.outcome_of("B"), Some(&TaskOutcome::Skipped));
    assert_eq!(b.run_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn empty_phases_only_run_main() -> TestResult {
    init_tracing();

    let log = EventLog::new();
    let m = FakeTask::complete("M", &log);
    let master = MasterTask::builder().main(as_task(&m)).build()?;

    let report = master.run(&Sink::null(), &Sink::null()).await?;

    assert!(report.before.tasks.is_empty());
    assert!(report.after.tasks.is_empty());
    assert_eq!(report.main.outcome, TaskOutcome::Completed);
    assert_eq!(log.starts(), vec!["M"]);
    Ok(())
}

#[tokio::test]
async fn a_master_task_runs_only_once() -> TestResult {
    init_tracing();

    let log = EventLog::new();
    let m = FakeTask::complete("M", &log);
    let master = MasterTask::builder().main(as_task(&m)).build()?;

    master.run(&Sink::null(), &Sink::null()).await?;
    let err = master.run(&Sink::null(), &Sink::null()).await.unwrap_err();

    assert!(matches!(err, TaskrError::AlreadyStarted));
    assert_eq!(m.run_calls(), 1);
    Ok(())
}
