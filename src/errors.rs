// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskrError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid duration for `{field}` ({value:?}): {reason}")]
    InvalidDuration {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Configuration error: a main task is required")]
    MissingMain,

    #[error("Master task has already been run; construct a new one for another cycle")]
    AlreadyStarted,

    #[error("Task '{task}' failed: {reason}")]
    TaskFailed { task: String, reason: String },

    #[error("{phase} phase had {} failing task(s): {}", failures.len(), failures.join("; "))]
    PhaseFailed {
        phase: String,
        failures: Vec<String>,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl TaskrError {
    /// True for errors that are raised before any task starts.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            TaskrError::ConfigError(_)
                | TaskrError::InvalidDuration { .. }
                | TaskrError::MissingMain
                | TaskrError::AlreadyStarted
                | TaskrError::TomlError(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskrError>;
