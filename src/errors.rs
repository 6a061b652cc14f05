// src/errors.rs

//! Crate-wide error types.
//!
//! [`SchedulerError`] covers everything an API caller can see: structural
//! registration errors, lifecycle errors and config loading errors.
//! [`TaskError`] is the runtime outcome of a single handler execution as the
//! scheduler sees it.

use std::time::Duration;

use thiserror::Error;

use crate::clock::ClockError;
use crate::types::TaskId;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Task id already registered: {0}")]
    DuplicateId(TaskId),

    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    #[error("Invalid retry policy: {0}")]
    InvalidRetryPolicy(String),

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("Cyclic dependency: {0}")]
    CyclicDependency(String),

    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Task is running: {0}")]
    TaskRunning(TaskId),

    #[error("Invalid state for task '{task}': {reason}")]
    InvalidState { task: TaskId, reason: String },

    #[error("Scheduler is stopped")]
    SchedulerStopped,

    #[error("Clock unavailable: {0}")]
    ClockUnavailable(#[from] ClockError),

    #[error("Scheduler invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure of a single task execution.
///
/// Both `Handler` and `Timeout` feed the retry controller identically.
/// `Cancelled` is reported when an operator stop interrupted the handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("handler error: {0}")]
    Handler(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    /// A periodic trigger ran out of representable fire times.
    #[error("no further fire time: {0}")]
    TriggerExhausted(String),
}

impl TaskError {
    pub fn handler(msg: impl Into<String>) -> Self {
        TaskError::Handler(msg.into())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SchedulerError>;
