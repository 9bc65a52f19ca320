// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// One ordered execution stage of a master task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Before,
    Main,
    After,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Before => "before",
            Phase::Main => "main",
            Phase::After => "after",
        };
        f.write_str(s)
    }
}

/// What a phase does once one of its tasks fails.
///
/// - `Continue`: keep running the remaining tasks and every later phase
///   (default behaviour).
/// - `FailFast`: skip the rest of the failing phase and all later phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    Continue,
    FailFast,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailurePolicy::Continue => "continue",
            FailurePolicy::FailFast => "fail_fast",
        };
        f.write_str(s)
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "continue" => Ok(FailurePolicy::Continue),
            "fail_fast" => Ok(FailurePolicy::FailFast),
            other => Err(format!(
                "invalid failure_policy: {other} (expected \"continue\" or \"fail_fast\")"
            )),
        }
    }
}
