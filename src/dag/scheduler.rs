// src/dag/scheduler.rs

use chrono::{DateTime, TimeDelta, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::dag::registry::TaskRegistry;
use crate::dag::scheduler_step::{SchedulerStep, StopTask};
use crate::dag::selector::select_ready;
use crate::dag::task_info::{
    ActiveDispatch, RunState, ScheduledTask, StateChange, TaskDefinition, TaskInfo, TaskStatus,
};
use crate::engine::{CompletionEvent, SchedulerConfig, TaskOutcome};
use crate::errors::{Result, SchedulerError, TaskError};
use crate::retry::{RetryDecision, decide_after_failure};
use crate::trigger::{first_run, next_run};
use crate::types::{DependencyFailurePolicy, TaskId, TaskState};

/// Single-writer scheduling state machine.
///
/// It owns the task registry and is responsible for:
/// - validating registrations and removals
/// - selecting and claiming tasks for dispatch (bounded by `max_concurrency`)
/// - applying completion outcomes (success, retry with backoff, terminal failure)
/// - operator stop/reset of individual tasks
///
/// It is synchronous and never reads a clock: every operation takes `now`.
#[derive(Debug)]
pub struct Scheduler {
    registry: TaskRegistry,
    max_concurrency: usize,
    dependency_policy: DependencyFailurePolicy,
    rng: StdRng,
    /// Monotonically increasing dispatch ID.
    dispatch_counter: u64,
    running: usize,
    /// Transitions not yet handed to observers.
    changes: Vec<StateChange>,
}

impl Scheduler {
    /// Fails with `ConfigError` if `config` is invalid (e.g. a zero
    /// concurrency limit).
    pub fn new(config: &SchedulerConfig) -> Result<Self> {
        config.validate()?;

        let rng = match config.jitter_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            registry: TaskRegistry::new(),
            max_concurrency: config.max_concurrency,
            dependency_policy: config.dependency_failure_policy,
            rng,
            dispatch_counter: 0,
            running: 0,
            changes: Vec::new(),
        })
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Number of tasks currently in `Running`.
    pub fn running_count(&self) -> usize {
        self.running
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Stored state of a task, if registered.
    pub fn state_of(&self, id: &str) -> Option<TaskState> {
        self.registry.get(id).map(|info| info.state.into())
    }

    /// Whether every dependency of `id` is currently satisfied.
    ///
    /// Returns `None` if the task is unknown.
    pub fn deps_satisfied(&self, id: &str) -> Option<bool> {
        self.registry.get(id)?;
        Some(self.registry.deps_satisfied(id, self.dependency_policy))
    }

    /// Validate and register a task. Nothing changes on error.
    pub fn register(&mut self, def: TaskDefinition, now: DateTime<Utc>) -> Result<TaskId> {
        def.trigger.validate()?;
        def.retry.validate()?;

        let first = first_run(&def.trigger, now).ok_or_else(|| {
            SchedulerError::InvalidTrigger(format!(
                "trigger {} for task '{}' never fires",
                def.trigger, def.id
            ))
        })?;

        // A periodic task must be able to fire again after its first run.
        if !def.trigger.is_once() && next_run(&def.trigger, first).is_none() {
            return Err(SchedulerError::InvalidTrigger(format!(
                "trigger {} for task '{}' has no fire time after {first}",
                def.trigger, def.id
            )));
        }

        let id = def.id.clone();
        let priority = def.priority;
        self.registry.insert(TaskInfo::new(def, first))?;

        info!(task = %id, priority, next_run_at = %first, "registered task");
        self.changes.push(StateChange {
            task: id.clone(),
            from: None,
            to: TaskState::Idle,
            at: now,
        });
        Ok(id)
    }

    /// Remove a task. Rejected with `TaskRunning` while it executes.
    pub fn unregister(&mut self, id: &str) -> Result<()> {
        self.registry.remove(id)?;
        info!(task = %id, "unregistered task");
        Ok(())
    }

    /// Read-only status snapshot, deriving `Ready` from the stored state.
    pub fn status(&self, id: &str, now: DateTime<Utc>) -> Result<TaskStatus> {
        let info = self
            .registry
            .get(id)
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;

        let blocked_on = self
            .registry
            .unsatisfied_dependencies(id, self.dependency_policy);

        let state = if info.state.is_schedulable() && info.next_run_at <= now && blocked_on.is_empty()
        {
            TaskState::Ready
        } else {
            info.state.into()
        };

        Ok(TaskStatus {
            id: info.id().clone(),
            state,
            attempt_count: info.attempt_count,
            next_run_at: (!info.state.is_terminal()).then_some(info.next_run_at),
            last_run_at: info.last_run_at,
            last_error: info.last_error.as_ref().map(|e| e.to_string()),
            priority: info.priority(),
            blocked_on,
        })
    }

    /// Earliest instant after `now` at which a task becomes due.
    ///
    /// Tasks that are already due but blocked only change through events, so
    /// they do not contribute a wake time.
    pub fn next_wake_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.registry.next_due_after(now)
    }

    /// Hand pending transitions to the caller (for observers).
    pub fn take_changes(&mut self) -> Vec<StateChange> {
        std::mem::take(&mut self.changes)
    }

    /// Select ready tasks and claim a slot for each, marking them `Running`.
    pub fn step_tick(&mut self, now: DateTime<Utc>) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        let selected = select_ready(
            &self.registry,
            self.dependency_policy,
            now,
            self.max_concurrency,
            self.running,
        );

        for id in selected {
            if let Some(task) = self.try_dispatch(&id, now) {
                step.dispatched.push(task);
            }
        }

        step
    }

    /// Production variant of [`Scheduler::step_tick`].
    pub fn handle_tick(&mut self, now: DateTime<Utc>) -> Vec<ScheduledTask> {
        self.step_tick(now).dispatched
    }

    /// Re-check a selected task against the *current* state and claim it.
    ///
    /// Earlier claims in the same tick may have changed a dependency's state,
    /// so the selector's snapshot is not trusted here.
    fn try_dispatch(&mut self, id: &str, now: DateTime<Utc>) -> Option<ScheduledTask> {
        if self.running >= self.max_concurrency {
            return None;
        }

        let info = self.registry.get(id)?;
        if !info.state.is_schedulable() || info.next_run_at > now {
            return None;
        }
        if !self.registry.deps_satisfied(id, self.dependency_policy) {
            debug!(task = %id, "dependency changed since selection; skipping dispatch");
            return None;
        }

        self.dispatch_counter += 1;
        let dispatch_id = self.dispatch_counter;
        let scheduled = ScheduledTask::from_task_info(info, dispatch_id);

        let change = self.registry.transition(id, RunState::Running, None, now)?;
        if let Some(info) = self.registry.info_mut(id) {
            info.active = Some(ActiveDispatch {
                dispatch_id,
                started_at: now,
                stop_requested: false,
            });
            info.last_run_at = Some(now);
        }
        self.running += 1;
        self.changes.push(change);

        info!(
            task = %id,
            dispatch_id,
            attempt = scheduled.attempt,
            running = self.running,
            "dispatching task"
        );

        Some(scheduled)
    }

    /// Apply a completion event reported by the executor.
    pub fn step_completion(&mut self, event: CompletionEvent, now: DateTime<Utc>) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        let Some(info) = self.registry.get(&event.task) else {
            warn!(task = %event.task, "completion for unknown task; ignoring");
            return step;
        };

        let active = match info.active {
            Some(active) if info.state == RunState::Running && active.dispatch_id == event.dispatch_id => {
                active
            }
            _ => {
                warn!(
                    task = %event.task,
                    dispatch_id = event.dispatch_id,
                    "completion for a dispatch that is not running; ignoring"
                );
                return step;
            }
        };

        self.running = self.running.saturating_sub(1);
        let id = event.task.clone();
        debug!(
            task = %id,
            dispatch_id = event.dispatch_id,
            elapsed_ms = event.elapsed.as_millis() as u64,
            "applying completion"
        );

        if active.stop_requested {
            let error = match event.outcome {
                TaskOutcome::Failed(err) => err,
                TaskOutcome::Success => TaskError::Cancelled,
            };
            self.finish(&id, RunState::Stopped, None, now, |info| {
                info.last_error = Some(error);
                info.last_succeeded = false;
            });
            info!(task = %id, "running task stopped by operator");
            step.stopped.push(id);
            return step;
        }

        match event.outcome {
            TaskOutcome::Success => self.apply_success(&id, now, &mut step),
            TaskOutcome::Failed(err) => self.apply_failure(&id, err, now, &mut step),
        }

        step
    }

    /// Production variant of [`Scheduler::step_completion`].
    pub fn handle_completion(&mut self, event: CompletionEvent, now: DateTime<Utc>) {
        self.step_completion(event, now);
    }

    fn apply_success(&mut self, id: &str, now: DateTime<Utc>, step: &mut SchedulerStep) {
        let Some(info) = self.registry.get(id) else {
            return;
        };

        if info.def.trigger.is_once() {
            self.finish(id, RunState::Succeeded, None, now, |info| {
                info.attempt_count = 0;
                info.last_error = None;
                info.last_succeeded = true;
            });
            info!(task = %id, "task succeeded; no further runs");
            step.succeeded.push(id.to_string());
            return;
        }

        match next_run(&info.def.trigger, now) {
            Some(at) => {
                self.finish(id, RunState::Idle, Some(at), now, |info| {
                    info.attempt_count = 0;
                    info.last_error = None;
                    info.last_succeeded = true;
                });
                debug!(task = %id, next_run_at = %at, "task succeeded; rescheduled");
                step.rescheduled.push(id.to_string());
            }
            None => {
                // Only `Once` tasks end `Succeeded`; a periodic task that
                // cannot be rescheduled is failed instead.
                let error = TaskError::TriggerExhausted(format!(
                    "{} cannot fire after {now}",
                    info.def.trigger
                ));
                self.finish(id, RunState::Failed, None, now, |info| {
                    info.last_error = Some(error);
                    info.last_succeeded = false;
                });
                warn!(task = %id, "periodic task has no further fire time; marking failed");
                step.newly_failed.push(id.to_string());
            }
        }
    }

    fn apply_failure(&mut self, id: &str, err: TaskError, now: DateTime<Utc>, step: &mut SchedulerStep) {
        let Some(info) = self.registry.get(id) else {
            return;
        };

        let attempts = info.attempt_count.saturating_add(1);
        let decision = decide_after_failure(&info.def.retry, attempts, &mut self.rng);

        let record = |info: &mut TaskInfo| {
            info.attempt_count = attempts;
            info.last_error = Some(err);
            info.last_succeeded = false;
        };

        match decision {
            RetryDecision::Retry { attempt, delay } => {
                let at = TimeDelta::from_std(delay)
                    .ok()
                    .and_then(|d| now.checked_add_signed(d))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                self.finish(id, RunState::AwaitingRetry, Some(at), now, record);
                warn!(
                    task = %id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    retry_at = %at,
                    "task failed; retry scheduled"
                );
                step.awaiting_retry.push(id.to_string());
            }
            RetryDecision::Exhausted { attempts } => {
                self.finish(id, RunState::Failed, None, now, record);
                warn!(task = %id, attempts, "task failed; retries exhausted");
                step.newly_failed.push(id.to_string());
            }
        }
    }

    /// Leave `Running`: update bookkeeping then transition.
    fn finish(
        &mut self,
        id: &str,
        to: RunState,
        next_run_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        update: impl FnOnce(&mut TaskInfo),
    ) {
        if let Some(info) = self.registry.info_mut(id) {
            info.active = None;
            update(info);
        }
        if let Some(change) = self.registry.transition(id, to, next_run_at, now) {
            self.changes.push(change);
        }
    }

    /// Operator stop of a single task.
    ///
    /// Pending tasks stop immediately; a running task is flagged and the
    /// caller must cancel its execution. Terminal tasks are rejected.
    pub fn stop_task(&mut self, id: &str, now: DateTime<Utc>) -> Result<StopTask> {
        let info = self
            .registry
            .get(id)
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;
        let state = info.state;

        match state {
            RunState::Idle | RunState::AwaitingRetry => {
                if let Some(change) = self.registry.transition(id, RunState::Stopped, None, now) {
                    self.changes.push(change);
                }
                info!(task = %id, "task stopped");
                Ok(StopTask::Stopped)
            }
            RunState::Running => {
                let Some(info) = self.registry.info_mut(id) else {
                    return Err(SchedulerError::NotFound(id.to_string()));
                };
                let Some(active) = info.active.as_mut() else {
                    return Err(SchedulerError::InvariantViolation(format!(
                        "task '{id}' is running without an active dispatch"
                    )));
                };
                active.stop_requested = true;
                let dispatch_id = active.dispatch_id;
                info!(task = %id, dispatch_id, "stop requested for running task");
                Ok(StopTask::CancelRequested { dispatch_id })
            }
            state => Err(SchedulerError::InvalidState {
                task: id.to_string(),
                reason: format!("cannot stop a task in terminal state {}", TaskState::from(state)),
            }),
        }
    }

    /// Return a `Failed` or `Stopped` task to `Idle` with a fresh schedule.
    pub fn reset_task(&mut self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let info = self
            .registry
            .get(id)
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;

        if !matches!(info.state, RunState::Failed | RunState::Stopped) {
            return Err(SchedulerError::InvalidState {
                task: id.to_string(),
                reason: format!(
                    "only failed or stopped tasks can be reset (state is {})",
                    TaskState::from(info.state)
                ),
            });
        }

        let next = first_run(&info.def.trigger, now)
            .map(|at| at.max(info.next_run_at))
            .ok_or_else(|| {
                SchedulerError::InvalidTrigger(format!("trigger for task '{id}' never fires"))
            })?;

        if let Some(info) = self.registry.info_mut(id) {
            info.attempt_count = 0;
            info.last_error = None;
        }
        if let Some(change) = self.registry.transition(id, RunState::Idle, Some(next), now) {
            self.changes.push(change);
        }
        info!(task = %id, next_run_at = %next, "task reset");
        Ok(())
    }

    /// Tasks currently running, with their dispatch ids.
    pub fn active_dispatches(&self) -> Vec<(TaskId, u64)> {
        self.registry
            .tasks()
            .filter_map(|info| info.active.map(|a| (info.id().clone(), a.dispatch_id)))
            .collect()
    }

    /// Cross-check counters against stored state.
    pub fn check_invariants(&self) -> Result<()> {
        let running = self.registry.running_count();
        if running != self.running {
            return Err(SchedulerError::InvariantViolation(format!(
                "running counter {} disagrees with {} tasks in Running",
                self.running, running
            )));
        }
        if running > self.max_concurrency {
            return Err(SchedulerError::InvariantViolation(format!(
                "{running} tasks running exceeds max_concurrency {}",
                self.max_concurrency
            )));
        }
        Ok(())
    }
}
