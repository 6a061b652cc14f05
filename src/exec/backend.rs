// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender.
//! This makes it easy to swap in a fake executor in tests while keeping the
//! production worker pool in [`executor_loop`](super::executor_loop).
//!
//! - `WorkerPoolBackend` is the default implementation. It wraps the
//!   `spawn_worker_pool` loop and forwards commands over an mpsc channel.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which tasks were dispatched and directly emits `TaskCompleted` events.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::errors::{Result, SchedulerError};
use crate::types::TaskId;

use super::executor_loop::{PoolCommand, spawn_worker_pool};

/// Boxed future returned by [`ExecutorBackend`] methods.
pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Trait abstracting how dispatched tasks are executed.
///
/// Every dispatched task must eventually produce exactly one
/// `RuntimeEvent::TaskCompleted` carrying its `dispatch_id`.
pub trait ExecutorBackend: Send {
    /// Start executing the given tasks.
    fn spawn_ready_tasks(&mut self, tasks: Vec<ScheduledTask>) -> BackendFuture<'_>;

    /// Cooperatively cancel one execution.
    fn cancel_task(&mut self, task: TaskId, dispatch_id: u64) -> BackendFuture<'_>;

    /// Cancel every execution (shutdown).
    fn cancel_all(&mut self) -> BackendFuture<'_>;
}

/// Real executor backend used in production.
pub struct WorkerPoolBackend {
    tx: mpsc::Sender<PoolCommand>,
}

impl WorkerPoolBackend {
    /// Create the backend, wiring completions to the given runtime event
    /// sender. This spawns the background worker pool immediately.
    pub fn new(max_concurrency: usize, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        let tx = spawn_worker_pool(max_concurrency, runtime_tx);
        Self { tx }
    }

    fn send(&self, commands: Vec<PoolCommand>) -> BackendFuture<'static> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for command in commands {
                tx.send(command).await.map_err(|_| {
                    SchedulerError::Other(anyhow::anyhow!("worker pool channel closed"))
                })?;
            }
            Ok(())
        })
    }
}

impl ExecutorBackend for WorkerPoolBackend {
    fn spawn_ready_tasks(&mut self, tasks: Vec<ScheduledTask>) -> BackendFuture<'_> {
        self.send(tasks.into_iter().map(PoolCommand::Run).collect())
    }

    fn cancel_task(&mut self, task: TaskId, dispatch_id: u64) -> BackendFuture<'_> {
        self.send(vec![PoolCommand::Cancel { task, dispatch_id }])
    }

    fn cancel_all(&mut self) -> BackendFuture<'_> {
        self.send(vec![PoolCommand::CancelAll])
    }
}
