// src/task/command.rs

//! Shell-command task.
//!
//! Runs `sh -c <cmd>` (`cmd /C` on Windows), forwarding stdout lines to the
//! output sink and stderr lines to the error sink. While the process runs the
//! task wakes up every `end_check` interval to report liveness, and reacts to
//! `stop` immediately by killing the child.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, info, trace, warn};

use crate::config::TaskConfig;
use crate::errors::{Result, TaskrError};
use crate::sink::Sink;
use crate::task::{Task, TaskFuture, TaskLifecycle, TaskState, stop_notice};

/// Lower bound on how long output forwarders may take to flush after exit.
const MIN_DRAIN_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug)]
pub struct CommandTask {
    name: String,
    cmd: String,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
    lifecycle: TaskLifecycle,
}

/// How the process wait loop ended.
enum Exit {
    Exited(std::io::Result<ExitStatus>),
    StopRequested,
}

impl CommandTask {
    pub fn new(name: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cmd: cmd.into(),
            cwd: None,
            env: BTreeMap::new(),
            lifecycle: TaskLifecycle::new(),
        }
    }

    /// Build from a validated `[main]` / `[[before]]` / `[[after]]` entry.
    pub fn from_config(name: &str, cfg: &TaskConfig) -> Self {
        let mut task = Self::new(name, cfg.cmd.clone());
        task.cwd = cfg.cwd.clone();
        task.env = cfg.env.clone();
        task
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    fn failed(&self, reason: impl Into<String>) -> TaskrError {
        TaskrError::TaskFailed {
            task: self.name.clone(),
            reason: reason.into(),
        }
    }

    async fn run_inner(&self, out: &Sink, err: &Sink) -> Result<()> {
        if !self.lifecycle.start() {
            debug!(task = %self.name, "task stopped before it started; not spawning");
            return Ok(());
        }

        // `interval` rejects a zero period.
        let end_check = self.lifecycle.end_check().max(Duration::from_millis(1));
        info!(
            task = %self.name,
            cmd = %self.cmd,
            ?end_check,
            "starting task process"
        );

        let mut cmd = shell_command(&self.cmd);
        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }
        cmd.envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.lifecycle.finish();
                return Err(self.failed(format!("spawning process: {e}")));
            }
        };

        let forwarders: Vec<JoinHandle<()>> = [
            forward_lines(child.stdout.take(), out.clone()),
            forward_lines(child.stderr.take(), err.clone()),
        ]
        .into_iter()
        .flatten()
        .collect();

        let started = Instant::now();
        let mut ticker = interval(end_check);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        let exit = loop {
            tokio::select! {
                status = child.wait() => break Exit::Exited(status),
                _ = self.lifecycle.stop_requested() => break Exit::StopRequested,
                _ = ticker.tick() => {
                    trace!(
                        task = %self.name,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "task process still running"
                    );
                }
            }
        };

        match exit {
            Exit::StopRequested => {
                info!(
                    task = %self.name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "stop requested for running task; killing process"
                );
                if let Err(e) = child.kill().await {
                    warn!(
                        task = %self.name,
                        error = %e,
                        "failed to kill child process on stop"
                    );
                }
                for f in forwarders {
                    f.abort();
                }
                Ok(())
            }
            Exit::Exited(status) => {
                drain_forwarders(forwarders, end_check.max(MIN_DRAIN_GRACE)).await;

                if !self.lifecycle.finish() {
                    debug!(task = %self.name, "process exited while a stop was in flight");
                    return Ok(());
                }

                let status = status.map_err(|e| self.failed(format!("waiting for process: {e}")))?;
                let code = status.code().unwrap_or(-1);

                info!(
                    task = %self.name,
                    exit_code = code,
                    success = status.success(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "task process exited"
                );

                if status.success() {
                    Ok(())
                } else {
                    Err(self.failed(format!("exited with code {code}")))
                }
            }
        }
    }
}

impl Task for CommandTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_end_check(&self, interval: Duration) {
        self.lifecycle.set_end_check(interval);
    }

    fn run<'a>(&'a self, out: &'a Sink, err: &'a Sink) -> TaskFuture<'a> {
        Box::pin(self.run_inner(out, err))
    }

    fn stop(&self, notice: &Sink) -> bool {
        if !self.lifecycle.stop() {
            debug!(task = %self.name, "stop ignored; task already terminal");
            return false;
        }
        info!(task = %self.name, "task stopped");
        notice.write_line(&stop_notice(&self.name));
        true
    }

    fn state(&self) -> TaskState {
        self.lifecycle.state()
    }
}

/// Build a shell command appropriate for the platform.
fn shell_command(line: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(line);
        c
    }
}

/// Copy every line of `reader` into `sink` on a background task.
fn forward_lines<R>(reader: Option<R>, sink: Sink) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let reader = reader?;
    Some(tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            sink.write_line(&line);
        }
    }))
}

/// Give forwarders a bounded window to flush after the process exited.
///
/// A grandchild that inherited the pipes can keep them open indefinitely, so
/// anything still running after `grace` is aborted.
async fn drain_forwarders(forwarders: Vec<JoinHandle<()>>, grace: Duration) {
    for mut f in forwarders {
        if timeout(grace, &mut f).await.is_err() {
            debug!("output forwarder still open after process exit; aborting");
            f.abort();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwards_stdout_and_stderr() {
        let task = CommandTask::new("echo", "echo out-line; echo err-line 1>&2");
        let (out, out_buf) = Sink::memory();
        let (err, err_buf) = Sink::memory();

        task.run(&out, &err).await.unwrap();

        assert_eq!(out_buf.lines(), vec!["out-line"]);
        assert_eq!(err_buf.lines(), vec!["err-line"]);
        assert_eq!(task.state(), TaskState::Completed);
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_task_failure() {
        let task = CommandTask::new("fails", "exit 3");
        let res = task.run(&Sink::null(), &Sink::null()).await;

        match res {
            Err(TaskrError::TaskFailed { task, reason }) => {
                assert_eq!(task, "fails");
                assert!(reason.contains("code 3"), "unexpected reason: {reason}");
            }
            other => panic!("expected TaskFailed, got {other:?}"),
        }
        assert!(task.is_stopped());
    }

    #[tokio::test]
    async fn env_and_cwd_are_applied() {
        let dir = std::env::temp_dir();
        let task = CommandTask::new("env", "echo $TASKR_PROBE; pwd")
            .with_env("TASKR_PROBE", "probe-value")
            .with_cwd(&dir);
        let (out, buf) = Sink::memory();

        task.run(&out, &Sink::null()).await.unwrap();

        let lines = buf.lines();
        assert_eq!(lines[0], "probe-value");
        let reported = std::fs::canonicalize(&lines[1]).unwrap();
        assert_eq!(reported, std::fs::canonicalize(&dir).unwrap());
    }

    #[tokio::test]
    async fn stop_kills_running_process() {
        let task = std::sync::Arc::new(CommandTask::new("sleeper", "sleep 30"));
        task.set_end_check(Duration::from_millis(10));
        let (notice, notice_buf) = Sink::memory();

        let runner = {
            let task = std::sync::Arc::clone(&task);
            tokio::spawn(async move { task.run(&Sink::null(), &Sink::null()).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(task.stop(&notice));
        assert!(!task.stop(&notice));

        let res = timeout(Duration::from_secs(5), runner)
            .await
            .expect("run should return promptly after stop")
            .unwrap();
        assert!(res.is_ok());
        assert_eq!(task.state(), TaskState::Stopped);
        assert_eq!(notice_buf.count_matching("'sleeper' was stopped"), 1);
    }

    #[tokio::test]
    async fn stopped_before_run_never_spawns() {
        let task = CommandTask::new("never", "echo should-not-appear");
        task.stop(&Sink::null());
        let (out, buf) = Sink::memory();

        task.run(&out, &Sink::null()).await.unwrap();

        assert!(buf.lines().is_empty());
        assert_eq!(task.state(), TaskState::Stopped);
    }
}
