// src/exec/executor_loop.rs

//! Bounded worker pool that runs dispatched tasks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::exec::task_runner::run_task;
use crate::types::TaskId;

/// Instruction sent from the scheduler loop to the pool.
#[derive(Debug)]
pub enum PoolCommand {
    Run(ScheduledTask),
    Cancel { task: TaskId, dispatch_id: u64 },
    CancelAll,
}

/// Internal handle for a currently-running execution.
///
/// - `cancel` is the execution's cancellation token.
/// - `handle` is the Tokio task that is actually running it.
struct ActiveTask {
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background worker pool.
///
/// The returned sender is what [`WorkerPoolBackend`](super::WorkerPoolBackend)
/// uses to submit work. At most `max_concurrency` handlers execute at once;
/// each execution holds a semaphore permit for its whole lifetime.
///
/// The scheduler already bounds how many tasks it marks `Running`, so the
/// permits only matter for the short window between a completion being
/// reported and its worker actually finishing.
pub fn spawn_worker_pool(
    max_concurrency: usize,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> mpsc::Sender<PoolCommand> {
    let (tx, mut rx) = mpsc::channel::<PoolCommand>(64);
    let slots = Arc::new(Semaphore::new(max_concurrency.max(1)));

    tokio::spawn(async move {
        info!(max_concurrency, "worker pool started");

        // Keyed by dispatch: a new execution of a task may start while the
        // previous one is still winding down.
        let mut active: HashMap<(TaskId, u64), ActiveTask> = HashMap::new();

        while let Some(command) = rx.recv().await {
            active.retain(|_, t| !t.handle.is_finished());

            match command {
                PoolCommand::Run(task) => {
                    start_task(task, &mut active, &slots, &runtime_tx);
                }
                PoolCommand::Cancel { task, dispatch_id } => {
                    cancel_task(&task, dispatch_id, &active);
                }
                PoolCommand::CancelAll => {
                    for ((task, dispatch_id), t) in active.iter() {
                        debug!(task = %task, dispatch_id, "cancelling execution");
                        t.cancel.cancel();
                    }
                }
            }
        }

        for t in active.values() {
            t.cancel.cancel();
        }
        info!("worker pool finished (channel closed)");
    });

    tx
}

fn start_task(
    task: ScheduledTask,
    active: &mut HashMap<(TaskId, u64), ActiveTask>,
    slots: &Arc<Semaphore>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) {
    if let Some((_, running)) = active.keys().find(|(id, _)| *id == task.id) {
        warn!(
            task = %task.id,
            running_dispatch = running,
            new_dispatch = task.dispatch_id,
            "task dispatched while a previous execution is still winding down"
        );
    }

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let slots = Arc::clone(slots);
    let rt_tx = runtime_tx.clone();
    let id = task.id.clone();
    let dispatch_id = task.dispatch_id;

    let handle = tokio::spawn(async move {
        // The semaphore is never closed; a failed acquire just means no permit.
        let _permit = slots.acquire_owned().await.ok();
        run_task(task, token, rt_tx).await;
    });

    active.insert((id, dispatch_id), ActiveTask { cancel, handle });
}

fn cancel_task(task: &str, dispatch_id: u64, active: &HashMap<(TaskId, u64), ActiveTask>) {
    match active.get(&(task.to_string(), dispatch_id)) {
        Some(t) => {
            info!(task = %task, dispatch_id, "cancellation requested for running execution");
            t.cancel.cancel();
        }
        _ => {
            debug!(
                task = %task,
                dispatch_id,
                "no matching execution to cancel; it may already have finished"
            );
        }
    }
}
