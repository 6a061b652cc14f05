// src/engine/handle.rs

//! Public, message-passing API of a running scheduler.
//!
//! [`SchedulerBuilder::start`] spawns the scheduler loop on the current Tokio
//! runtime and returns a [`SchedulerHandle`]. Every handle method is a
//! request/reply round-trip through the loop's event channel, so all state
//! mutation stays on the loop task.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::dag::{StopTask, TaskDefinition, TaskStatus};
use crate::errors::{Result, SchedulerError};
use crate::exec::{ExecutorBackend, WorkerPoolBackend};
use crate::types::TaskId;

use super::core::CoreRuntime;
use super::observer::StateObserver;
use super::runtime::Runtime;
use super::{RuntimeEvent, SchedulerConfig};

const EVENT_CHANNEL_CAPACITY: usize = 256;

type Reply<T> = oneshot::Sender<Result<T>>;

/// API call forwarded to the scheduler loop.
#[derive(Debug)]
pub enum ControlRequest {
    Register {
        def: TaskDefinition,
        reply: Reply<TaskId>,
    },
    Unregister {
        task: TaskId,
        reply: Reply<()>,
    },
    Status {
        task: TaskId,
        reply: Reply<TaskStatus>,
    },
    StopTask {
        task: TaskId,
        reply: Reply<StopTask>,
    },
    ResetTask {
        task: TaskId,
        reply: Reply<()>,
    },
}

impl ControlRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            ControlRequest::Register { .. } => "register",
            ControlRequest::Unregister { .. } => "unregister",
            ControlRequest::Status { .. } => "status",
            ControlRequest::StopTask { .. } => "stop_task",
            ControlRequest::ResetTask { .. } => "reset_task",
        }
    }

    /// Answer the request with `err` without touching any state.
    pub fn reject(self, err: SchedulerError) {
        let _ = match self {
            ControlRequest::Register { reply, .. } => reply.send(Err(err)).map_err(drop),
            ControlRequest::Unregister { reply, .. } => reply.send(Err(err)).map_err(drop),
            ControlRequest::Status { reply, .. } => reply.send(Err(err)).map_err(drop),
            ControlRequest::StopTask { reply, .. } => reply.send(Err(err)).map_err(drop),
            ControlRequest::ResetTask { reply, .. } => reply.send(Err(err)).map_err(drop),
        };
    }
}

/// Configures and starts a scheduler loop.
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    observers: Vec<Arc<dyn StateObserver>>,
}

impl fmt::Debug for SchedulerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerBuilder")
            .field("config", &self.config)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl SchedulerBuilder {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            observers: Vec::new(),
        }
    }

    /// Replace the wall clock (tests use a manual or Tokio-driven clock).
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Subscribe an observer to every state transition.
    pub fn observer(mut self, observer: impl StateObserver + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Start the loop with the real worker pool.
    ///
    /// Must be called from within a Tokio runtime. An invalid
    /// [`SchedulerConfig`] is rejected with `ConfigError` before anything is
    /// spawned.
    pub fn start(self) -> Result<SchedulerHandle> {
        let max_concurrency = self.config.max_concurrency;
        self.start_with_executor(move |runtime_tx| {
            WorkerPoolBackend::new(max_concurrency, runtime_tx)
        })
    }

    /// Start the loop with a custom executor backend. `make_executor`
    /// receives the sender completions must be reported on.
    pub fn start_with_executor<E, F>(self, make_executor: F) -> Result<SchedulerHandle>
    where
        E: ExecutorBackend + 'static,
        F: FnOnce(mpsc::Sender<RuntimeEvent>) -> E,
    {
        let core = CoreRuntime::from_config(&self.config)?;
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let executor = make_executor(tx.clone());

        info!(
            max_concurrency = self.config.max_concurrency,
            dependency_failure_policy = %self.config.dependency_failure_policy,
            "starting scheduler"
        );

        let runtime = Runtime::new(core, rx, executor, self.clock)
            .with_observers(self.observers)
            .with_poll_interval(self.config.poll_interval);

        let join = tokio::spawn(runtime.run());

        Ok(SchedulerHandle {
            tx,
            join: Arc::new(Mutex::new(Some(join))),
        })
    }
}

/// Cloneable handle to a running scheduler.
///
/// Once the loop has stopped (after [`stop`](Self::stop) or a fatal error)
/// every call returns [`SchedulerError::SchedulerStopped`].
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<RuntimeEvent>,
    join: Arc<Mutex<Option<JoinHandle<Result<()>>>>>,
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("closed", &self.tx.is_closed())
            .finish_non_exhaustive()
    }
}

impl SchedulerHandle {
    /// Register a task. Structural errors (`DuplicateId`, `InvalidTrigger`,
    /// `UnknownDependency`, `CyclicDependency`) leave existing state intact.
    pub async fn register_task(&self, def: TaskDefinition) -> Result<TaskId> {
        self.request(|reply| ControlRequest::Register { def, reply })
            .await
    }

    /// Remove a task that is not currently running.
    pub async fn unregister_task(&self, task: &str) -> Result<()> {
        let task = task.to_string();
        self.request(|reply| ControlRequest::Unregister { task, reply })
            .await
    }

    pub async fn task_status(&self, task: &str) -> Result<TaskStatus> {
        let task = task.to_string();
        self.request(|reply| ControlRequest::Status { task, reply })
            .await
    }

    /// Operator stop. A running task is cancelled cooperatively and ends
    /// `Stopped` once its handler returns.
    pub async fn stop_task(&self, task: &str) -> Result<StopTask> {
        let task = task.to_string();
        self.request(|reply| ControlRequest::StopTask { task, reply })
            .await
    }

    /// Bring a `Failed` or `Stopped` task back to `Idle`.
    pub async fn reset_task(&self, task: &str) -> Result<()> {
        let task = task.to_string();
        self.request(|reply| ControlRequest::ResetTask { task, reply })
            .await
    }

    /// Graceful shutdown: cancel running handlers, stop the loop and wait
    /// for it to exit. Calling it again is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        let event = RuntimeEvent::ShutdownRequested { ack: Some(ack) };
        if self.tx.send(event).await.is_ok() {
            let _ = done.await;
        }
        self.wait().await
    }

    /// Wait for the loop to exit and return its result.
    pub async fn wait(&self) -> Result<()> {
        let mut guard = self.join.lock().await;
        let Some(join) = guard.as_mut() else {
            return Ok(());
        };

        let joined = join.await;
        *guard = None;

        match joined {
            Ok(result) => result,
            Err(e) => Err(SchedulerError::Other(anyhow::anyhow!(
                "scheduler loop task failed: {e}"
            ))),
        }
    }

    /// True once the loop has stopped accepting requests.
    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> ControlRequest) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(RuntimeEvent::Control(make(reply)))
            .await
            .map_err(|_| SchedulerError::SchedulerStopped)?;
        response
            .await
            .map_err(|_| SchedulerError::SchedulerStopped)?
    }
}
