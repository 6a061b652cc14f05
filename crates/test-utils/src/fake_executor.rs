use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use taskloom::dag::ScheduledTask;
use taskloom::engine::{CompletionEvent, RuntimeEvent, TaskOutcome};
use taskloom::errors::{SchedulerError, TaskError};
use taskloom::exec::{BackendFuture, ExecutorBackend};
use taskloom::types::TaskId;

/// One dispatch seen by the fake executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub task: TaskId,
    pub dispatch_id: u64,
    pub attempt: u32,
    pub scheduled_for: DateTime<Utc>,
}

#[derive(Default)]
struct ProbeState {
    dispatched: Vec<Dispatched>,
    cancelled: Vec<(TaskId, u64)>,
    cancel_all_calls: usize,
    scripts: HashMap<TaskId, VecDeque<TaskOutcome>>,
    held: HashSet<TaskId>,
    /// Held dispatches waiting for the test to complete them.
    pending: Vec<(TaskId, u64)>,
    tx: Option<mpsc::Sender<RuntimeEvent>>,
}

/// Shared view into a [`RecordingExecutor`] for assertions and control.
///
/// Clones share state. By default every dispatch completes immediately with
/// the next scripted outcome for its task (or `Success`). Tasks marked with
/// [`hold`](Self::hold) stay running until [`complete`](Self::complete) or a
/// cancel.
#[derive(Clone, Default)]
pub struct ExecutorProbe {
    inner: Arc<Mutex<ProbeState>>,
}

impl ExecutorProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.inner.lock().expect("probe lock poisoned")
    }

    /// Queue outcomes for `task`; once drained it succeeds.
    pub fn script(&self, task: &str, outcomes: impl IntoIterator<Item = TaskOutcome>) {
        self.lock()
            .scripts
            .entry(task.to_string())
            .or_default()
            .extend(outcomes);
    }

    /// Make `task` fail every time.
    pub fn always_fail(&self, task: &str, times: usize) {
        self.script(
            task,
            (0..times).map(|_| TaskOutcome::Failed(TaskError::handler("scripted failure"))),
        );
    }

    /// Keep dispatches of `task` running until completed by the test.
    pub fn hold(&self, task: &str) {
        self.lock().held.insert(task.to_string());
    }

    pub fn dispatched(&self) -> Vec<Dispatched> {
        self.lock().dispatched.clone()
    }

    pub fn dispatched_ids(&self) -> Vec<TaskId> {
        self.lock()
            .dispatched
            .iter()
            .map(|d| d.task.clone())
            .collect()
    }

    pub fn dispatch_count(&self, task: &str) -> usize {
        self.lock()
            .dispatched
            .iter()
            .filter(|d| d.task == task)
            .count()
    }

    pub fn cancelled(&self) -> Vec<(TaskId, u64)> {
        self.lock().cancelled.clone()
    }

    pub fn cancel_all_calls(&self) -> usize {
        self.lock().cancel_all_calls
    }

    /// Tasks currently held (dispatched but not completed).
    pub fn pending(&self) -> Vec<TaskId> {
        self.lock().pending.iter().map(|(t, _)| t.clone()).collect()
    }

    /// Complete the held dispatch of `task`. Returns `false` if none.
    pub async fn complete(&self, task: &str, outcome: TaskOutcome) -> bool {
        let (tx, dispatch_id) = {
            let mut state = self.lock();
            let Some(pos) = state.pending.iter().position(|(t, _)| t == task) else {
                return false;
            };
            let (_, dispatch_id) = state.pending.remove(pos);
            (state.tx.clone(), dispatch_id)
        };

        match tx {
            Some(tx) => send_completion(&tx, task.to_string(), dispatch_id, outcome)
                .await
                .is_ok(),
            None => false,
        }
    }

    /// Report a completion for an arbitrary dispatch id (stale-event tests).
    pub async fn send_raw(&self, task: &str, dispatch_id: u64, outcome: TaskOutcome) -> bool {
        let tx = self.lock().tx.clone();
        match tx {
            Some(tx) => send_completion(&tx, task.to_string(), dispatch_id, outcome)
                .await
                .is_ok(),
            None => false,
        }
    }
}

async fn send_completion(
    tx: &mpsc::Sender<RuntimeEvent>,
    task: TaskId,
    dispatch_id: u64,
    outcome: TaskOutcome,
) -> Result<(), SchedulerError> {
    tx.send(RuntimeEvent::TaskCompleted(CompletionEvent {
        task,
        dispatch_id,
        outcome,
        elapsed: Duration::ZERO,
    }))
    .await
    .map_err(|_| SchedulerError::SchedulerStopped)
}

/// A fake executor that:
/// - records which tasks were dispatched (and cancelled)
/// - reports `TaskCompleted` right away unless the task is held.
///
/// Held tasks answer a cancel with `Failed(Cancelled)`, like a cooperative
/// handler would.
pub struct RecordingExecutor {
    probe: ExecutorProbe,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
}

impl RecordingExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, probe: ExecutorProbe) -> Self {
        probe.lock().tx = Some(runtime_tx.clone());
        Self { probe, runtime_tx }
    }

    /// Adapter for `SchedulerBuilder::start_with_executor`.
    pub fn factory(probe: ExecutorProbe) -> impl FnOnce(mpsc::Sender<RuntimeEvent>) -> Self {
        move |runtime_tx| Self::new(runtime_tx, probe)
    }
}

impl ExecutorBackend for RecordingExecutor {
    fn spawn_ready_tasks(&mut self, tasks: Vec<ScheduledTask>) -> BackendFuture<'_> {
        let tx = self.runtime_tx.clone();
        let mut immediate = Vec::new();
        {
            let mut state = self.probe.lock();
            for t in tasks {
                state.dispatched.push(Dispatched {
                    task: t.id.clone(),
                    dispatch_id: t.dispatch_id,
                    attempt: t.attempt,
                    scheduled_for: t.scheduled_for,
                });

                if state.held.contains(&t.id) {
                    state.pending.push((t.id.clone(), t.dispatch_id));
                    continue;
                }

                let outcome = state
                    .scripts
                    .get_mut(&t.id)
                    .and_then(VecDeque::pop_front)
                    .unwrap_or(TaskOutcome::Success);
                immediate.push((t.id.clone(), t.dispatch_id, outcome));
            }
        }

        Box::pin(async move {
            for (task, dispatch_id, outcome) in immediate {
                send_completion(&tx, task, dispatch_id, outcome).await?;
            }
            Ok(())
        })
    }

    fn cancel_task(&mut self, task: TaskId, dispatch_id: u64) -> BackendFuture<'_> {
        let tx = self.runtime_tx.clone();
        let was_pending = {
            let mut state = self.probe.lock();
            state.cancelled.push((task.clone(), dispatch_id));
            let before = state.pending.len();
            state
                .pending
                .retain(|(t, d)| !(t == &task && *d == dispatch_id));
            state.pending.len() != before
        };

        Box::pin(async move {
            if was_pending {
                let outcome = TaskOutcome::Failed(TaskError::Cancelled);
                send_completion(&tx, task, dispatch_id, outcome).await?;
            }
            Ok(())
        })
    }

    fn cancel_all(&mut self) -> BackendFuture<'_> {
        let pending = {
            let mut state = self.probe.lock();
            state.cancel_all_calls += 1;
            std::mem::take(&mut state.pending)
        };
        let tx = self.runtime_tx.clone();

        Box::pin(async move {
            for (task, dispatch_id) in pending {
                // The loop may already be gone during shutdown.
                let _ = send_completion(&tx, task, dispatch_id, TaskOutcome::Failed(TaskError::Cancelled))
                    .await;
            }
            Ok(())
        })
    }
}
