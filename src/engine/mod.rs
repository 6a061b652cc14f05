// src/engine/mod.rs

//! Orchestration engine for taskloom.
//!
//! This module ties together:
//! - the scheduler state machine
//! - the executor backend (bounded worker pool)
//! - the main loop that reacts to:
//!   - completion events from the executor
//!   - control requests from [`SchedulerHandle`]s
//!   - due times of scheduled tasks
//!
//! The pure core lives in [`core`]; the async/IO shell is implemented in
//! [`runtime`]; [`handle`] is the public, message-passing API.

use std::time::Duration;

use crate::errors::{Result, SchedulerError, TaskError};
use crate::types::{DependencyFailurePolicy, TaskId};

/// Outcome of one task execution for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed(TaskError),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success)
    }
}

impl From<std::result::Result<(), TaskError>> for TaskOutcome {
    fn from(res: std::result::Result<(), TaskError>) -> Self {
        match res {
            Ok(()) => TaskOutcome::Success,
            Err(e) => TaskOutcome::Failed(e),
        }
    }
}

/// Reported by the executor when a dispatched execution ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEvent {
    pub task: TaskId,
    pub dispatch_id: u64,
    pub outcome: TaskOutcome,
    pub elapsed: Duration,
}

/// Scheduler-wide settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Hard cap on simultaneously running tasks.
    pub max_concurrency: usize,
    /// Longest the loop sleeps without an event or due task.
    pub poll_interval: Duration,
    pub dependency_failure_policy: DependencyFailurePolicy,
    /// Seed for retry jitter; `None` seeds from OS entropy.
    pub jitter_seed: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            poll_interval: Duration::from_secs(1),
            dependency_failure_policy: DependencyFailurePolicy::Block,
            jitter_seed: None,
        }
    }
}

impl SchedulerConfig {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Reject settings the loop cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(SchedulerError::ConfigError(
                "max_concurrency must be >= 1 (got 0)".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(SchedulerError::ConfigError(
                "poll_interval must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Events flowing into the scheduler loop.
#[derive(Debug)]
pub enum RuntimeEvent {
    /// An execution finished (success, failure, timeout or cancellation).
    TaskCompleted(CompletionEvent),
    /// An API call from a [`SchedulerHandle`].
    Control(ControlRequest),
    /// Graceful shutdown requested; `ack` fires once the loop has stopped
    /// dispatching.
    ShutdownRequested {
        ack: Option<tokio::sync::oneshot::Sender<()>>,
    },
}

pub mod core;
pub mod event_handlers;
pub mod handle;
pub mod observer;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use handle::{ControlRequest, SchedulerBuilder, SchedulerHandle};
pub use observer::{StateObserver, TracingObserver};
pub use runtime::Runtime;
