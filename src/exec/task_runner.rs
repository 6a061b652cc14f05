// src/exec/task_runner.rs

//! Runs a single dispatched execution and reports its completion.

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::{CompletionEvent, RuntimeEvent, TaskOutcome};
use crate::errors::TaskError;

/// Run the task's handler under `cancel`, enforce its timeout, and send
/// exactly one `TaskCompleted` event.
///
/// The handler runs in its own Tokio task so that a panic is reported as a
/// handler failure and a timeout can abort it even if it never checks the
/// cancellation token.
pub async fn run_task(
    task: ScheduledTask,
    cancel: CancellationToken,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    let started = Instant::now();
    info!(
        task = %task.id,
        dispatch_id = task.dispatch_id,
        attempt = task.attempt,
        "starting task handler"
    );

    let handler_ctx = cancel.child_token();
    let mut join = tokio::spawn(task.handler.run(handler_ctx.clone()));

    let result = match task.timeout {
        Some(limit) => {
            tokio::select! {
                joined = &mut join => flatten(joined),
                _ = tokio::time::sleep(limit) => {
                    warn!(
                        task = %task.id,
                        dispatch_id = task.dispatch_id,
                        timeout_ms = limit.as_millis() as u64,
                        "task handler timed out; cancelling"
                    );
                    handler_ctx.cancel();
                    join.abort();
                    Err(TaskError::Timeout(limit))
                }
            }
        }
        None => flatten(join.await),
    };

    let elapsed = started.elapsed();
    match &result {
        Ok(()) => info!(
            task = %task.id,
            dispatch_id = task.dispatch_id,
            elapsed_ms = elapsed.as_millis() as u64,
            "task handler succeeded"
        ),
        Err(err) => warn!(
            task = %task.id,
            dispatch_id = task.dispatch_id,
            elapsed_ms = elapsed.as_millis() as u64,
            error = %err,
            "task handler failed"
        ),
    }

    let event = CompletionEvent {
        task: task.id.clone(),
        dispatch_id: task.dispatch_id,
        outcome: TaskOutcome::from(result),
        elapsed,
    };

    if runtime_tx.send(RuntimeEvent::TaskCompleted(event)).await.is_err() {
        debug!(
            task = %task.id,
            dispatch_id = task.dispatch_id,
            "scheduler loop gone; dropping completion"
        );
    }
}

fn flatten(joined: Result<Result<(), TaskError>, JoinError>) -> Result<(), TaskError> {
    match joined {
        Ok(res) => res,
        Err(e) if e.is_panic() => Err(TaskError::Handler("handler panicked".to_string())),
        Err(_) => Err(TaskError::Cancelled),
    }
}
