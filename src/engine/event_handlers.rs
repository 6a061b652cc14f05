// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::dag::{ScheduledTask, Scheduler, StopTask};
use crate::engine::CompletionEvent;
use crate::errors::Result;
use crate::types::TaskId;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// Cooperatively cancel one running execution.
    CancelTask { task: TaskId, dispatch_id: u64 },
    /// Cancel every running execution (shutdown).
    CancelAll,
    /// Request that the loop exits.
    RequestExit,
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    pub fn idle() -> Self {
        Self {
            commands: Vec::new(),
            keep_running: true,
        }
    }
}

/// Select ready tasks and claim them for dispatch.
pub fn handle_tick(scheduler: &mut Scheduler, now: DateTime<Utc>) -> CoreStep {
    let mut commands = Vec::new();

    let dispatched = scheduler.handle_tick(now);
    if !dispatched.is_empty() {
        commands.push(CoreCommand::DispatchTasks(dispatched));
    }

    CoreStep {
        commands,
        keep_running: true,
    }
}

/// Apply one completion. Dispatching happens on the following tick, against
/// the post-drain state.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    event: CompletionEvent,
    now: DateTime<Utc>,
) -> CoreStep {
    debug!(
        task = %event.task,
        dispatch_id = event.dispatch_id,
        success = event.outcome.is_success(),
        "completion received"
    );
    scheduler.handle_completion(event, now);
    CoreStep::idle()
}

/// Operator stop of one task; a running task additionally needs its
/// execution cancelled.
pub fn handle_stop_task(
    scheduler: &mut Scheduler,
    task: &str,
    now: DateTime<Utc>,
) -> (Result<StopTask>, CoreStep) {
    let result = scheduler.stop_task(task, now);
    let mut step = CoreStep::idle();

    if let Ok(StopTask::CancelRequested { dispatch_id }) = result {
        step.commands.push(CoreCommand::CancelTask {
            task: task.to_string(),
            dispatch_id,
        });
    }

    (result, step)
}

/// Stop the loop and cancel whatever is still running.
pub fn handle_shutdown(scheduler: &Scheduler) -> CoreStep {
    let active = scheduler.active_dispatches();
    info!(running = active.len(), "shutdown requested; cancelling running tasks");

    CoreStep {
        commands: vec![CoreCommand::CancelAll, CoreCommand::RequestExit],
        keep_running: false,
    }
}
