// src/dag/selector.rs

//! Ready-set selection.
//!
//! Pure function over a registry snapshot: it decides *which* tasks should
//! be dispatched next but mutates nothing. The scheduler commits the
//! decision afterwards, re-checking each pick.

use std::cmp::{Ordering, Reverse};

use chrono::{DateTime, Utc};

use crate::dag::registry::TaskRegistry;
use crate::dag::task_info::TaskInfo;
use crate::types::{DependencyFailurePolicy, TaskId};

/// Total dispatch order: priority descending, then `next_run_at` ascending,
/// then id ascending.
pub fn dispatch_order(a: &TaskInfo, b: &TaskInfo) -> Ordering {
    (Reverse(a.priority()), a.next_run_at, a.id()).cmp(&(
        Reverse(b.priority()),
        b.next_run_at,
        b.id(),
    ))
}

/// Tasks to dispatch at `now`, best first, at most
/// `max_concurrency - running` of them.
pub fn select_ready(
    registry: &TaskRegistry,
    policy: DependencyFailurePolicy,
    now: DateTime<Utc>,
    max_concurrency: usize,
    running: usize,
) -> Vec<TaskId> {
    let capacity = max_concurrency.saturating_sub(running);
    if capacity == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<&TaskInfo> = registry
        .due(now)
        .filter(|info| info.state.is_schedulable())
        .filter(|info| registry.deps_satisfied(info.id(), policy))
        .collect();

    candidates.sort_by(|a, b| dispatch_order(a, b));

    candidates
        .into_iter()
        .take(capacity)
        .map(|info| info.id().clone())
        .collect()
}
