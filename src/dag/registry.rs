// src/dag/registry.rs

//! Owned set of registered tasks, their dependency graph and the due
//! timeline.
//!
//! Every write to a task's `state` or `next_run_at` goes through
//! [`TaskRegistry::transition`], which keeps the timeline index in sync and
//! never lets `next_run_at` move backwards.

use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use crate::dag::graph::DependencyGraph;
use crate::dag::task_info::{RunState, StateChange, TaskInfo};
use crate::errors::{Result, SchedulerError};
use crate::types::{DependencyFailurePolicy, TaskId};

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<TaskId, TaskInfo>,
    graph: DependencyGraph,
    /// `(next_run_at, id)` for every task in a schedulable state, ordered so
    /// the earliest due task comes first.
    timeline: BTreeSet<(DateTime<Utc>, TaskId)>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&TaskInfo> {
        self.tasks.get(id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskInfo> {
        self.tasks.values()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Validate and insert a new task. Nothing is mutated on error.
    pub fn insert(&mut self, info: TaskInfo) -> Result<()> {
        let id = info.id().clone();

        if self.tasks.contains_key(&id) {
            return Err(SchedulerError::DuplicateId(id));
        }
        for dep in info.dependencies() {
            if !self.tasks.contains_key(dep) {
                return Err(SchedulerError::UnknownDependency {
                    task: id,
                    dependency: dep.clone(),
                });
            }
        }

        // Cycle check happens before anything is committed.
        self.graph.add_edges(&id, info.dependencies())?;

        if info.state.is_schedulable() {
            self.timeline.insert((info.next_run_at, id.clone()));
        }
        debug!(task = %id, next_run_at = %info.next_run_at, "task registered");
        self.tasks.insert(id, info);
        Ok(())
    }

    /// Remove a task and its outgoing edges. Running tasks are rejected.
    pub fn remove(&mut self, id: &str) -> Result<TaskInfo> {
        let info = self
            .tasks
            .get(id)
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;

        if info.state == RunState::Running {
            return Err(SchedulerError::TaskRunning(id.to_string()));
        }

        let dangling: Vec<&TaskId> = self.graph.dependents_of(id).iter().collect();
        if !dangling.is_empty() {
            warn!(
                task = %id,
                dependents = ?dangling,
                "removing task that others depend on; their dependency now dangles"
            );
        }

        self.timeline.remove(&(info.next_run_at, id.to_string()));
        self.graph.remove_task(id);
        self.tasks
            .remove(id)
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))
    }

    /// Apply a state transition, optionally rescheduling.
    ///
    /// `next_run_at` is clamped so it never moves backwards. Returns the
    /// resulting change, or `None` if the task is unknown.
    pub fn transition(
        &mut self,
        id: &str,
        to: RunState,
        next_run_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Option<StateChange> {
        let info = self.tasks.get_mut(id)?;
        let from = info.state;

        if info.state.is_schedulable() {
            self.timeline.remove(&(info.next_run_at, id.to_string()));
        }

        if let Some(next) = next_run_at {
            if next < info.next_run_at {
                warn!(
                    task = %id,
                    current = %info.next_run_at,
                    requested = %next,
                    "refusing to move next_run_at backwards; keeping current value"
                );
            } else {
                info.next_run_at = next;
            }
        }

        info.state = to;
        if to.is_schedulable() {
            self.timeline.insert((info.next_run_at, id.to_string()));
        }

        debug!(
            task = %id,
            from = ?from,
            to = ?to,
            next_run_at = %info.next_run_at,
            "task state transition"
        );

        Some(StateChange {
            task: id.to_string(),
            from: Some(from.into()),
            to: to.into(),
            at,
        })
    }

    /// Mutable access for fields that do not affect ordering
    /// (attempt counters, diagnostics, active dispatch).
    pub(crate) fn info_mut(&mut self, id: &str) -> Option<&mut TaskInfo> {
        self.tasks.get_mut(id)
    }

    /// Schedulable tasks with `next_run_at <= now`, earliest first.
    pub fn due(&self, now: DateTime<Utc>) -> impl Iterator<Item = &TaskInfo> {
        self.timeline
            .iter()
            .take_while(move |(at, _)| *at <= now)
            .filter_map(move |(_, id)| self.tasks.get(id))
    }

    /// Earliest `next_run_at` strictly after `now` among schedulable tasks.
    pub fn next_due_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let lower = now.checked_add_signed(TimeDelta::nanoseconds(1))?;
        self.timeline
            .range((Bound::Included((lower, TaskId::new())), Bound::Unbounded))
            .next()
            .map(|(at, _)| *at)
    }

    /// Whether the prerequisite `dep` currently counts as succeeded.
    pub fn dependency_satisfied(&self, dep: &str, policy: DependencyFailurePolicy) -> bool {
        let Some(info) = self.tasks.get(dep) else {
            return false;
        };
        match info.state {
            RunState::Succeeded => true,
            RunState::Idle => info.last_succeeded,
            RunState::Failed => policy == DependencyFailurePolicy::Satisfy,
            RunState::Running | RunState::AwaitingRetry | RunState::Stopped => false,
        }
    }

    /// Dependencies of `id` that are not currently satisfied.
    pub fn unsatisfied_dependencies(&self, id: &str, policy: DependencyFailurePolicy) -> Vec<TaskId> {
        self.graph
            .dependencies_of(id)
            .iter()
            .filter(|dep| !self.dependency_satisfied(dep, policy))
            .cloned()
            .collect()
    }

    /// True iff every dependency of `id` is satisfied.
    pub fn deps_satisfied(&self, id: &str, policy: DependencyFailurePolicy) -> bool {
        self.graph
            .dependencies_of(id)
            .iter()
            .all(|dep| self.dependency_satisfied(dep, policy))
    }

    pub fn running_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|info| info.state == RunState::Running)
            .count()
    }
}
