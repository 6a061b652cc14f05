// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes events and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading the clock and events from channels
//! - sending `ScheduledTask`s to the executor
//! - replying to control requests and notifying observers
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, clocks, or handlers.

use chrono::{DateTime, Utc};

use crate::dag::{Scheduler, StateChange, StopTask, TaskDefinition, TaskStatus};
use crate::engine::event_handlers::{
    CoreStep, handle_shutdown, handle_stop_task, handle_task_completion, handle_tick,
};
use crate::engine::{CompletionEvent, SchedulerConfig};
use crate::errors::{Result, SchedulerError};
use crate::types::TaskId;

/// Pure core runtime state.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
/// Once stopped, every call is rejected with `SchedulerStopped`.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    stopped: bool,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            stopped: false,
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Result<Self> {
        Ok(Self::new(Scheduler::new(config)?))
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Read access to the scheduler (for tests and diagnostics).
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> CoreStep {
        if self.stopped {
            return CoreStep::idle();
        }
        handle_tick(&mut self.scheduler, now)
    }

    pub fn completion(&mut self, event: CompletionEvent, now: DateTime<Utc>) -> CoreStep {
        // Completions still land after shutdown so state stays consistent.
        handle_task_completion(&mut self.scheduler, event, now)
    }

    pub fn register(&mut self, def: TaskDefinition, now: DateTime<Utc>) -> Result<TaskId> {
        self.ensure_running()?;
        self.scheduler.register(def, now)
    }

    pub fn unregister(&mut self, task: &str) -> Result<()> {
        self.ensure_running()?;
        self.scheduler.unregister(task)
    }

    pub fn status(&self, task: &str, now: DateTime<Utc>) -> Result<TaskStatus> {
        self.ensure_running()?;
        self.scheduler.status(task, now)
    }

    pub fn stop_task(&mut self, task: &str, now: DateTime<Utc>) -> (Result<StopTask>, CoreStep) {
        if let Err(e) = self.ensure_running() {
            return (Err(e), CoreStep::idle());
        }
        handle_stop_task(&mut self.scheduler, task, now)
    }

    pub fn reset_task(&mut self, task: &str, now: DateTime<Utc>) -> Result<()> {
        self.ensure_running()?;
        self.scheduler.reset_task(task, now)
    }

    pub fn shutdown(&mut self) -> CoreStep {
        self.stopped = true;
        handle_shutdown(&self.scheduler)
    }

    pub fn next_wake_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.scheduler.next_wake_at(now)
    }

    pub fn take_changes(&mut self) -> Vec<StateChange> {
        self.scheduler.take_changes()
    }

    pub fn check_invariants(&self) -> Result<()> {
        self.scheduler.check_invariants()
    }

    /// Mark the core stopped without producing commands (fatal loop error).
    pub fn mark_stopped(&mut self) {
        self.stopped = true;
    }

    fn ensure_running(&self) -> Result<()> {
        if self.stopped {
            return Err(SchedulerError::SchedulerStopped);
        }
        Ok(())
    }
}
