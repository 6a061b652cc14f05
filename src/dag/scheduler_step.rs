// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::task_info::ScheduledTask;
use crate::types::TaskId;

/// Structured result of a single scheduler "step".
///
/// This is useful for tests that want to manually step the scheduler and
/// make assertions about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks claimed and marked `Running` in this step, in dispatch order.
    pub dispatched: Vec<ScheduledTask>,
    /// Periodic tasks that succeeded and went back to `Idle`.
    pub rescheduled: Vec<TaskId>,
    /// Tasks that reached terminal `Succeeded`.
    pub succeeded: Vec<TaskId>,
    /// Tasks that failed and are waiting for a retry.
    pub awaiting_retry: Vec<TaskId>,
    /// Tasks that exhausted their retries and are now terminal `Failed`.
    pub newly_failed: Vec<TaskId>,
    /// Running tasks whose completion ended in `Stopped`.
    pub stopped: Vec<TaskId>,
}

impl SchedulerStep {
    pub fn dispatched_ids(&self) -> Vec<TaskId> {
        self.dispatched.iter().map(|t| t.id.clone()).collect()
    }
}

/// Result of an operator stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopTask {
    /// The task was not running and is now `Stopped`.
    Stopped,
    /// The task is running; its execution must be cancelled. It moves to
    /// `Stopped` once the completion for `dispatch_id` arrives.
    CancelRequested { dispatch_id: u64 },
}
