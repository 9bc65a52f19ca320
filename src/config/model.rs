// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::master::{DEFAULT_MAX_CHECKTIME, DEFAULT_MAX_RUNTIME};
use crate::types::FailurePolicy;

/// Top-level configuration exactly as deserialized from TOML.
///
/// ```toml
/// max_runtime = "5m"
/// max_checktime = "1s"
///
/// [main]
/// cmd = "python -m http.server"
///
/// [[before]]
/// name = "build"
/// cmd = "make"
///
/// [[after]]
/// cmd = "echo done"
/// ```
///
/// Nothing here is validated yet; convert into [`ConfigFile`] with
/// `ConfigFile::try_from`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    /// The main task. Required, but optional here so a missing `[main]`
    /// surfaces as a proper configuration error rather than a TOML one.
    #[serde(default)]
    pub main: Option<TaskConfig>,

    #[serde(default)]
    pub before: Vec<TaskConfig>,

    #[serde(default)]
    pub after: Vec<TaskConfig>,

    /// Budget for each before/after task.
    #[serde(default = "default_max_runtime")]
    pub max_runtime: String,

    /// Liveness-poll interval pushed into every task.
    #[serde(default = "default_max_checktime")]
    pub max_checktime: String,

    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_max_runtime() -> String {
    DEFAULT_MAX_RUNTIME.to_string()
}

fn default_max_checktime() -> String {
    DEFAULT_MAX_CHECKTIME.to_string()
}

impl Default for RawConfigFile {
    fn default() -> Self {
        Self {
            main: None,
            before: Vec::new(),
            after: Vec::new(),
            max_runtime: default_max_runtime(),
            max_checktime: default_max_checktime(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// `[main]`, `[[before]]` and `[[after]]` entries.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    /// Display name; defaults to `main`, `before-<n>` or `after-<n>`.
    #[serde(default)]
    pub name: Option<String>,

    /// Shell command line.
    pub cmd: String,

    /// Working directory for the command.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Extra environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl TaskConfig {
    pub fn effective_name(&self, fallback: impl FnOnce() -> String) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => fallback(),
        }
    }
}

/// Validated configuration. Only constructible through
/// `TryFrom<RawConfigFile>` (or `new_unchecked` for internal use).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub main: TaskConfig,
    pub before: Vec<TaskConfig>,
    pub after: Vec<TaskConfig>,
    pub max_runtime: String,
    pub max_checktime: String,
    pub failure_policy: FailurePolicy,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile, main: TaskConfig) -> Self {
        Self {
            main,
            before: raw.before,
            after: raw.after,
            max_runtime: raw.max_runtime,
            max_checktime: raw.max_checktime,
            failure_policy: raw.failure_policy,
        }
    }

    pub fn main_name(&self) -> String {
        self.main.effective_name(|| "main".to_string())
    }

    /// Before tasks paired with their effective names.
    pub fn before_named(&self) -> impl Iterator<Item = (String, &TaskConfig)> {
        named(&self.before, "before")
    }

    /// After tasks paired with their effective names.
    pub fn after_named(&self) -> impl Iterator<Item = (String, &TaskConfig)> {
        named(&self.after, "after")
    }
}

fn named<'a>(
    tasks: &'a [TaskConfig],
    prefix: &'static str,
) -> impl Iterator<Item = (String, &'a TaskConfig)> {
    tasks
        .iter()
        .enumerate()
        .map(move |(i, t)| (t.effective_name(|| format!("{prefix}-{}", i + 1)), t))
}
