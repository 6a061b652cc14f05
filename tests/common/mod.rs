#![allow(dead_code, unused_imports)]

use std::time::Duration;

use chrono::{DateTime, Utc};
use taskloom::dag::{ScheduledTask, Scheduler, TaskStatus};
use taskloom::engine::{CompletionEvent, SchedulerConfig, SchedulerHandle, TaskOutcome};
use taskloom::errors::TaskError;
use taskloom::types::TaskState;

pub use taskloom_test_utils::builders;
pub use taskloom_test_utils::handlers;
pub use taskloom_test_utils::{at_ms, init_tracing, t0, with_timeout};

/// Scheduler with a fixed jitter seed and the given concurrency cap.
pub fn scheduler(max_concurrency: usize) -> Scheduler {
    init_tracing();
    let config = SchedulerConfig {
        jitter_seed: Some(7),
        ..SchedulerConfig::default().with_max_concurrency(max_concurrency)
    };
    Scheduler::new(&config).unwrap()
}

pub fn success(task: &ScheduledTask) -> CompletionEvent {
    completion(task, TaskOutcome::Success)
}

pub fn failure(task: &ScheduledTask) -> CompletionEvent {
    completion(task, TaskOutcome::Failed(TaskError::handler("boom")))
}

pub fn completion(task: &ScheduledTask, outcome: TaskOutcome) -> CompletionEvent {
    CompletionEvent {
        task: task.id.clone(),
        dispatch_id: task.dispatch_id,
        outcome,
        elapsed: Duration::ZERO,
    }
}

pub fn ids(tasks: &[ScheduledTask]) -> Vec<&str> {
    tasks.iter().map(|t| t.id.as_str()).collect()
}

pub fn ms_since_t0(at: DateTime<Utc>) -> i64 {
    (at - t0()).num_milliseconds()
}

/// Poll `status` until `task` reaches `state` (bounded by `with_timeout`).
pub async fn wait_for_state(
    handle: &SchedulerHandle,
    task: &str,
    state: TaskState,
) -> TaskStatus {
    with_timeout(async {
        loop {
            match handle.task_status(task).await {
                Ok(status) if status.state == state => return status,
                Ok(_) => {}
                Err(e) => panic!("status of '{task}' failed: {e}"),
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}

/// Poll a synchronous condition until it holds.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    with_timeout(async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}
