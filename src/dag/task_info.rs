// src/dag/task_info.rs

//! Task definitions, stored per-task state and dispatch descriptors.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::errors::TaskError;
use crate::exec::HandlerRef;
use crate::retry::RetryPolicy;
use crate::trigger::TriggerSpec;
use crate::types::{TaskId, TaskState};

/// Everything a caller supplies to register a task.
#[derive(Clone)]
pub struct TaskDefinition {
    pub id: TaskId,
    pub trigger: TriggerSpec,
    /// Higher runs first.
    pub priority: i64,
    /// Tasks that must have most recently succeeded before this one may run.
    pub dependencies: Vec<TaskId>,
    pub retry: RetryPolicy,
    /// Per-execution deadline enforced by the executor.
    pub timeout: Option<Duration>,
    pub handler: HandlerRef,
}

impl TaskDefinition {
    pub fn new(id: impl Into<TaskId>, trigger: TriggerSpec, handler: HandlerRef) -> Self {
        Self {
            id: id.into(),
            trigger,
            priority: 0,
            dependencies: Vec::new(),
            retry: RetryPolicy::default(),
            timeout: None,
            handler,
        }
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn after(mut self, dependency: impl Into<TaskId>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("id", &self.id)
            .field("trigger", &self.trigger)
            .field("priority", &self.priority)
            .field("dependencies", &self.dependencies)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Stored lifecycle state of a task (internal).
///
/// `Ready` is deliberately absent; see [`TaskState::Ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    AwaitingRetry,
    Succeeded,
    Failed,
    Stopped,
}

impl RunState {
    /// States the ready-set selector may pick from.
    pub fn is_schedulable(self) -> bool {
        matches!(self, RunState::Idle | RunState::AwaitingRetry)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::Failed | RunState::Stopped
        )
    }
}

impl From<RunState> for TaskState {
    fn from(state: RunState) -> Self {
        match state {
            RunState::Idle => TaskState::Idle,
            RunState::Running => TaskState::Running,
            RunState::AwaitingRetry => TaskState::AwaitingRetry,
            RunState::Succeeded => TaskState::Succeeded,
            RunState::Failed => TaskState::Failed,
            RunState::Stopped => TaskState::Stopped,
        }
    }
}

/// Bookkeeping for the one execution currently in flight.
#[derive(Debug, Clone, Copy)]
pub struct ActiveDispatch {
    pub dispatch_id: u64,
    pub started_at: DateTime<Utc>,
    /// Set by an operator stop; the completion then ends in `Stopped`.
    pub stop_requested: bool,
}

/// Registered task plus its mutable scheduling state.
#[derive(Clone)]
pub struct TaskInfo {
    pub def: TaskDefinition,
    pub state: RunState,
    /// Consecutive failures; reset on success.
    pub attempt_count: u32,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<TaskError>,
    /// Whether the most recently completed execution succeeded.
    pub last_succeeded: bool,
    pub active: Option<ActiveDispatch>,
}

impl TaskInfo {
    pub fn new(def: TaskDefinition, first_run_at: DateTime<Utc>) -> Self {
        Self {
            def,
            state: RunState::Idle,
            attempt_count: 0,
            next_run_at: first_run_at,
            last_run_at: None,
            last_error: None,
            last_succeeded: false,
            active: None,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.def.id
    }

    pub fn priority(&self) -> i64 {
        self.def.priority
    }

    pub fn dependencies(&self) -> &[TaskId] {
        &self.def.dependencies
    }
}

impl fmt::Debug for TaskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskInfo")
            .field("id", &self.def.id)
            .field("state", &self.state)
            .field("attempt_count", &self.attempt_count)
            .field("next_run_at", &self.next_run_at)
            .field("last_run_at", &self.last_run_at)
            .field("last_error", &self.last_error)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

/// Read-only snapshot returned by the status query.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatus {
    pub id: TaskId,
    pub state: TaskState,
    pub attempt_count: u32,
    /// `None` once the task is terminal.
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub priority: i64,
    /// Dependencies not currently satisfied (including removed ones).
    pub blocked_on: Vec<TaskId>,
}

/// A task the scheduler has claimed a slot for and wants executed now.
#[derive(Clone)]
pub struct ScheduledTask {
    pub id: TaskId,
    /// Unique per dispatch; echoed back on completion.
    pub dispatch_id: u64,
    /// 1-based attempt number within the current failure streak.
    pub attempt: u32,
    pub scheduled_for: DateTime<Utc>,
    pub timeout: Option<Duration>,
    pub handler: HandlerRef,
}

impl ScheduledTask {
    pub fn from_task_info(info: &TaskInfo, dispatch_id: u64) -> Self {
        Self {
            id: info.def.id.clone(),
            dispatch_id,
            attempt: info.attempt_count + 1,
            scheduled_for: info.next_run_at,
            timeout: info.def.timeout,
            handler: info.def.handler.clone(),
        }
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("dispatch_id", &self.dispatch_id)
            .field("attempt", &self.attempt)
            .field("scheduled_for", &self.scheduled_for)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// One stored-state transition, delivered to state observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub task: TaskId,
    pub from: Option<TaskState>,
    pub to: TaskState,
    pub at: DateTime<Utc>,
}
