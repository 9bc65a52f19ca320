#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use taskr::config::{ConfigFile, RawConfigFile, TaskConfig};
use taskr::errors::Result;
use taskr::types::FailurePolicy;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_main(mut self, task: TaskConfig) -> Self {
        self.config.main = Some(task);
        self
    }

    pub fn with_before(mut self, task: TaskConfig) -> Self {
        self.config.before.push(task);
        self
    }

    pub fn with_after(mut self, task: TaskConfig) -> Self {
        self.config.after.push(task);
        self
    }

    pub fn max_runtime(mut self, value: &str) -> Self {
        self.config.max_runtime = value.to_string();
        self
    }

    pub fn max_checktime(mut self, value: &str) -> Self {
        self.config.max_checktime = value.to_string();
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                name: None,
                cmd: cmd.to_string(),
                cwd: None,
                env: BTreeMap::new(),
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.task.name = Some(name.to_string());
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.task.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.task.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
