#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use taskloom::config::{
    ConfigFile, RawConfigFile, RetrySection, SchedulerSection, TaskConfig,
};
use taskloom::dag::TaskDefinition;
use taskloom::errors::Result;
use taskloom::exec::HandlerRef;
use taskloom::retry::RetryPolicy;
use taskloom::trigger::{CronSpec, TriggerSpec};

use crate::handlers;

/// Builder for `TaskDefinition` to simplify test setup.
///
/// Defaults: a 1s interval trigger, priority 0, no dependencies, no retries
/// and a handler that succeeds immediately.
pub struct TaskBuilder {
    def: TaskDefinition,
}

impl TaskBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            def: TaskDefinition::new(id, TriggerSpec::every(Duration::from_secs(1)), handlers::succeed())
                .retry(RetryPolicy::no_retry()),
        }
    }

    pub fn once_at(mut self, at: DateTime<Utc>) -> Self {
        self.def.trigger = TriggerSpec::once(at);
        self
    }

    pub fn every(mut self, every: Duration) -> Self {
        self.def.trigger = TriggerSpec::every(every);
        self
    }

    pub fn cron(mut self, expr: &str) -> Self {
        let cron: CronSpec = expr.parse().expect("valid cron expression");
        self.def.trigger = TriggerSpec::Cron(cron);
        self
    }

    pub fn trigger(mut self, trigger: TriggerSpec) -> Self {
        self.def.trigger = trigger;
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.def.priority = priority;
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.def.dependencies.push(dep.to_string());
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.def.retry = policy;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.def.timeout = Some(timeout);
        self
    }

    pub fn handler(mut self, handler: HandlerRef) -> Self {
        self.def.handler = handler;
        self
    }

    pub fn build(self) -> TaskDefinition {
        self.def
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                scheduler: SchedulerSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.scheduler.max_concurrency = n;
        self
    }

    pub fn poll_interval(mut self, raw: &str) -> Self {
        self.config.scheduler.poll_interval = Some(raw.to_string());
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

/// Builder for `TaskConfig`. Starts with no trigger set.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: cmd.to_string(),
                priority: 0,
                after: vec![],
                at: None,
                every: None,
                cron: None,
                timeout: None,
                retry: None,
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn at(mut self, rfc3339: &str) -> Self {
        self.task.at = Some(rfc3339.to_string());
        self
    }

    pub fn every(mut self, raw: &str) -> Self {
        self.task.every = Some(raw.to_string());
        self
    }

    pub fn cron(mut self, expr: &str) -> Self {
        self.task.cron = Some(expr.to_string());
        self
    }

    pub fn timeout(mut self, raw: &str) -> Self {
        self.task.timeout = Some(raw.to_string());
        self
    }

    pub fn retry(mut self, retry: RetrySection) -> Self {
        self.task.retry = Some(retry);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
