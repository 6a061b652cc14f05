// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::dag::TaskDefinition;
use crate::engine::SchedulerConfig;
use crate::exec::ShellHandler;
use crate::retry::RetryPolicy;
use crate::trigger::TriggerSpec;
use crate::types::{DependencyFailurePolicy, TaskId};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [scheduler]
/// max_concurrency = 2
/// poll_interval = "1s"
/// dependency_failure_policy = "block"
///
/// [task.backup]
/// cmd = "echo backup"
/// priority = 5
/// after = ["db"]
/// every = "5m"
/// timeout = "30s"
///
/// [task.backup.retry]
/// max_attempts = 3
/// base_delay = "1s"
/// ```
///
/// Nothing here has been validated yet; see [`ConfigFile`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// All tasks from `[task.<name>]`, keyed by task id.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerSection {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Duration string, e.g. `"500ms"`.
    #[serde(default)]
    pub poll_interval: Option<String>,

    #[serde(default)]
    pub dependency_failure_policy: DependencyFailurePolicy,

    /// Fixed seed for retry jitter (reproducible runs).
    #[serde(default)]
    pub jitter_seed: Option<u64>,
}

fn default_max_concurrency() -> usize {
    SchedulerConfig::default().max_concurrency
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            poll_interval: None,
            dependency_failure_policy: DependencyFailurePolicy::default(),
            jitter_seed: None,
        }
    }
}

/// `[task.<name>]` section.
///
/// Exactly one of `at`, `every` and `cron` must be set.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    /// Shell command to execute.
    pub cmd: String,

    #[serde(default)]
    pub priority: i64,

    /// This is the TOML `after = ["A", "B"]` field.
    #[serde(default)]
    pub after: Vec<String>,

    /// RFC 3339 timestamp for a one-shot task.
    #[serde(default)]
    pub at: Option<String>,

    /// Duration string for an interval task.
    #[serde(default)]
    pub every: Option<String>,

    /// Reduced cron expression: `"minute hour weekday"`.
    #[serde(default)]
    pub cron: Option<String>,

    #[serde(default)]
    pub timeout: Option<String>,

    #[serde(default)]
    pub retry: Option<RetrySection>,
}

/// `[task.<name>.retry]` section. Missing fields take the library defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub base_delay: Option<String>,
    #[serde(default)]
    pub multiplier: Option<f64>,
    #[serde(default)]
    pub jitter: bool,
    #[serde(default)]
    pub max_delay: Option<String>,
}

/// A task from the config file with every string already parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfiguredTask {
    pub id: TaskId,
    pub cmd: String,
    pub trigger: TriggerSpec,
    pub priority: i64,
    pub after: Vec<TaskId>,
    pub timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl ConfiguredTask {
    /// Build a definition whose handler runs `cmd` through the shell.
    pub fn to_definition(&self) -> TaskDefinition {
        let mut def = TaskDefinition::new(
            self.id.clone(),
            self.trigger.clone(),
            std::sync::Arc::new(ShellHandler::new(self.id.clone(), self.cmd.clone())),
        )
        .priority(self.priority)
        .retry(self.retry.clone());

        for dep in &self.after {
            def = def.after(dep.clone());
        }
        if let Some(timeout) = self.timeout {
            def = def.timeout(timeout);
        }
        def
    }
}

/// Validated configuration.
///
/// Construct through `ConfigFile::try_from(RawConfigFile)` (see
/// `validate.rs`) or [`load_and_validate`](super::load_and_validate).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    scheduler: SchedulerConfig,
    tasks: Vec<ConfiguredTask>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(scheduler: SchedulerConfig, tasks: Vec<ConfiguredTask>) -> Self {
        Self { scheduler, tasks }
    }

    pub fn scheduler_config(&self) -> &SchedulerConfig {
        &self.scheduler
    }

    /// Tasks in dependency order: every task comes after its prerequisites,
    /// so registering them in this order never hits `UnknownDependency`.
    pub fn tasks(&self) -> &[ConfiguredTask] {
        &self.tasks
    }

    pub fn task_definitions(&self) -> Vec<TaskDefinition> {
        self.tasks.iter().map(ConfiguredTask::to_definition).collect()
    }
}
