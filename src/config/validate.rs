// src/config/validate.rs

use std::time::Duration;

use chrono::{DateTime, Utc};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::duration::parse_duration;
use crate::config::model::{
    ConfigFile, ConfiguredTask, RawConfigFile, RetrySection, SchedulerSection, TaskConfig,
};
use crate::engine::SchedulerConfig;
use crate::errors::{Result, SchedulerError};
use crate::retry::RetryPolicy;
use crate::trigger::{CronSpec, TriggerSpec};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SchedulerError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_tasks(&raw)?;
        let scheduler = scheduler_config(&raw.scheduler)?;
        validate_task_dependencies(&raw)?;
        let order = dependency_order(&raw)?;

        let mut tasks = Vec::with_capacity(order.len());
        for name in order {
            if let Some(cfg) = raw.task.get(name) {
                tasks.push(configured_task(name, cfg)?);
            }
        }

        Ok(ConfigFile::new_unchecked(scheduler, tasks))
    }
}

fn config_error(msg: impl Into<String>) -> SchedulerError {
    SchedulerError::ConfigError(msg.into())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(config_error(
            "config must contain at least one [task.<name>] section",
        ));
    }
    Ok(())
}

fn scheduler_config(section: &SchedulerSection) -> Result<SchedulerConfig> {
    if section.max_concurrency == 0 {
        return Err(config_error(
            "[scheduler].max_concurrency must be >= 1 (got 0)",
        ));
    }

    let mut config = SchedulerConfig::default().with_max_concurrency(section.max_concurrency);
    if let Some(raw) = &section.poll_interval {
        let poll = duration_field("[scheduler].poll_interval", raw)?;
        if poll.is_zero() {
            return Err(config_error("[scheduler].poll_interval must be > 0"));
        }
        config.poll_interval = poll;
    }
    config.dependency_failure_policy = section.dependency_failure_policy;
    config.jitter_seed = section.jitter_seed;
    Ok(config)
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(config_error(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !cfg.task.contains_key(dep) {
                return Err(config_error(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

/// Topological order of the task names; fails on a cycle.
///
/// Edge direction: dep -> task. For `[task.B] after = ["A"]` we add A -> B.
fn dependency_order(cfg: &RawConfigFile) -> Result<Vec<&str>> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    toposort(&graph, None).map_err(|cycle| {
        SchedulerError::CyclicDependency(format!(
            "cycle detected in task DAG involving task '{}'",
            cycle.node_id()
        ))
    })
}

fn configured_task(name: &str, cfg: &TaskConfig) -> Result<ConfiguredTask> {
    if cfg.cmd.trim().is_empty() {
        return Err(config_error(format!("task '{name}' has an empty `cmd`")));
    }

    let timeout = match &cfg.timeout {
        Some(raw) => {
            let timeout = duration_field(&format!("task '{name}' timeout"), raw)?;
            if timeout.is_zero() {
                return Err(config_error(format!("task '{name}' timeout must be > 0")));
            }
            Some(timeout)
        }
        None => None,
    };

    let trigger = trigger_spec(name, cfg)?;
    let retry = retry_policy(name, cfg.retry.as_ref())?;

    Ok(ConfiguredTask {
        id: name.to_string(),
        cmd: cfg.cmd.clone(),
        trigger,
        priority: cfg.priority,
        after: cfg.after.clone(),
        timeout,
        retry,
    })
}

fn trigger_spec(name: &str, cfg: &TaskConfig) -> Result<TriggerSpec> {
    let spec = match (&cfg.at, &cfg.every, &cfg.cron) {
        (Some(at), None, None) => {
            let at = DateTime::parse_from_rfc3339(at.trim()).map_err(|e| {
                config_error(format!("task '{name}' has invalid `at` timestamp '{at}': {e}"))
            })?;
            TriggerSpec::once(at.with_timezone(&Utc))
        }
        (None, Some(every), None) => {
            TriggerSpec::every(duration_field(&format!("task '{name}' every"), every)?)
        }
        (None, None, Some(cron)) => {
            let cron: CronSpec = cron
                .parse()
                .map_err(|e| config_error(format!("task '{name}': {e}")))?;
            TriggerSpec::Cron(cron)
        }
        _ => {
            return Err(config_error(format!(
                "task '{name}' must set exactly one of `at`, `every` or `cron`"
            )));
        }
    };

    spec.validate()
        .map_err(|e| config_error(format!("task '{name}': {e}")))?;
    Ok(spec)
}

fn retry_policy(name: &str, section: Option<&RetrySection>) -> Result<RetryPolicy> {
    let mut policy = RetryPolicy::default();
    let Some(section) = section else {
        return Ok(policy);
    };

    if let Some(max_attempts) = section.max_attempts {
        policy.max_attempts = max_attempts;
    }
    if let Some(raw) = &section.base_delay {
        policy.base_delay = duration_field(&format!("task '{name}' retry.base_delay"), raw)?;
    }
    if let Some(multiplier) = section.multiplier {
        policy.multiplier = multiplier;
    }
    if let Some(raw) = &section.max_delay {
        policy.max_delay = Some(duration_field(
            &format!("task '{name}' retry.max_delay"),
            raw,
        )?);
    }
    policy.jitter = section.jitter;

    policy
        .validate()
        .map_err(|e| config_error(format!("task '{name}': {e}")))?;
    Ok(policy)
}

fn duration_field(what: &str, raw: &str) -> Result<Duration> {
    parse_duration(raw).map_err(|e| config_error(format!("{what}: {e}")))
}
