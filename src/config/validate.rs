// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConfigFile, RawConfigFile, TaskConfig};
use crate::errors::{Result, TaskrError};
use crate::master::validate_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = TaskrError;

    fn try_from(mut raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let main = raw.main.take().ok_or(TaskrError::MissingMain)?;
        validate_durations(&raw)?;
        let cfg = ConfigFile::new_unchecked(raw, main);
        validate_commands(&cfg)?;
        validate_unique_names(&cfg)?;
        Ok(cfg)
    }
}

fn validate_durations(raw: &RawConfigFile) -> Result<()> {
    validate_duration("max_runtime", &raw.max_runtime)?;
    validate_duration("max_checktime", &raw.max_checktime)?;
    Ok(())
}

fn all_named(cfg: &ConfigFile) -> impl Iterator<Item = (String, &TaskConfig)> {
    std::iter::once((cfg.main_name(), &cfg.main))
        .chain(cfg.before_named())
        .chain(cfg.after_named())
}

fn validate_commands(cfg: &ConfigFile) -> Result<()> {
    for (name, task) in all_named(cfg) {
        if task.cmd.trim().is_empty() {
            return Err(TaskrError::ConfigError(format!(
                "task '{}' has an empty `cmd`",
                name
            )));
        }
    }
    Ok(())
}

fn validate_unique_names(cfg: &ConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for (name, _) in all_named(cfg) {
        if !seen.insert(name.clone()) {
            return Err(TaskrError::ConfigError(format!(
                "duplicate task name '{}'",
                name
            )));
        }
    }
    Ok(())
}
