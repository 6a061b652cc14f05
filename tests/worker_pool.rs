// tests/worker_pool.rs
//
// End-to-end runs through the real worker pool and handlers.

mod common;
use crate::common::builders::TaskBuilder;
use crate::common::handlers::{self, Scripted};
use crate::common::{init_tracing, t0, wait_for_state};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use taskloom::dag::{ScheduledTask, StopTask};
use taskloom::engine::{
    RuntimeEvent, SchedulerBuilder, SchedulerConfig, SchedulerHandle, TaskOutcome,
};
use taskloom::errors::TaskError;
use taskloom::exec::{HandlerRef, PoolCommand, ShellHandler, handler_fn, spawn_worker_pool};
use tokio::sync::mpsc;
use taskloom::retry::RetryPolicy;
use taskloom::types::TaskState;
use taskloom_test_utils::TokioClock;

fn start(max_concurrency: usize) -> SchedulerHandle {
    init_tracing();
    let config = SchedulerConfig {
        jitter_seed: Some(3),
        ..SchedulerConfig::default().with_max_concurrency(max_concurrency)
    };
    SchedulerBuilder::new(config)
        .clock(TokioClock::new(t0()))
        .start()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn timeout_counts_as_failure() {
    let handle = start(1);

    handle
        .register_task(
            TaskBuilder::new("slow")
                .once_at(t0())
                .timeout(Duration::from_millis(100))
                .handler(handlers::sleep_ignoring_cancel(Duration::from_secs(10)))
                .build(),
        )
        .await
        .unwrap();

    let status = wait_for_state(&handle, "slow", TaskState::Failed).await;
    assert_eq!(status.last_error.as_deref(), Some("timed out after 100ms"));
    assert_eq!(status.attempt_count, 1);

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn timed_out_attempt_is_retried() {
    let handle = start(1);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    // First call hangs past the timeout, later calls return at once.
    let handler: HandlerRef = handler_fn(move |_ctx| {
        let call = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if call == 0 {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            Ok::<(), TaskError>(())
        }
    });

    handle
        .register_task(
            TaskBuilder::new("hang-once")
                .once_at(t0())
                .timeout(Duration::from_millis(50))
                .retry(RetryPolicy::exponential(2, Duration::from_millis(200), 2.0))
                .handler(handler)
                .build(),
        )
        .await
        .unwrap();

    wait_for_state(&handle, "hang-once", TaskState::Succeeded).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn panicking_handler_is_a_failure() {
    let handle = start(1);

    handle
        .register_task(
            TaskBuilder::new("boom")
                .once_at(t0())
                .handler(handlers::panics())
                .build(),
        )
        .await
        .unwrap();

    let status = wait_for_state(&handle, "boom", TaskState::Failed).await;
    assert_eq!(status.last_error.as_deref(), Some("handler error: handler panicked"));

    // The loop survives the panic.
    handle
        .register_task(TaskBuilder::new("after").once_at(t0()).build())
        .await
        .unwrap();
    wait_for_state(&handle, "after", TaskState::Succeeded).await;

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn scripted_failures_then_success() {
    let handle = start(1);
    let scripted = Scripted::failing_times(2);

    handle
        .register_task(
            TaskBuilder::new("flaky")
                .once_at(t0())
                .retry(RetryPolicy::exponential(3, Duration::from_millis(10), 2.0))
                .handler(scripted.handler())
                .build(),
        )
        .await
        .unwrap();

    let status = wait_for_state(&handle, "flaky", TaskState::Succeeded).await;
    assert_eq!(scripted.calls(), 3);
    assert_eq!(status.attempt_count, 0);

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn operator_stop_interrupts_cooperative_handler() {
    let handle = start(1);

    handle
        .register_task(
            TaskBuilder::new("sleepy")
                .every(Duration::from_secs(5))
                .handler(handlers::sleep_cooperatively(Duration::from_secs(3_600)))
                .build(),
        )
        .await
        .unwrap();
    wait_for_state(&handle, "sleepy", TaskState::Running).await;

    let result = handle.stop_task("sleepy").await.unwrap();
    assert!(matches!(result, StopTask::CancelRequested { .. }));

    let status = wait_for_state(&handle, "sleepy", TaskState::Stopped).await;
    assert_eq!(status.last_error.as_deref(), Some("cancelled"));
    assert_eq!(status.next_run_at, None);

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn never_more_than_max_concurrency_handlers_at_once() {
    let handle = start(2);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handler: HandlerRef = {
        let current = Arc::clone(&current);
        let peak = Arc::clone(&peak);
        handler_fn(move |_ctx| {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok::<(), TaskError>(())
            }
        })
    };

    let ids: Vec<String> = (0..6).map(|i| format!("job-{i}")).collect();
    for id in &ids {
        handle
            .register_task(
                TaskBuilder::new(id)
                    .once_at(t0())
                    .handler(Arc::clone(&handler))
                    .build(),
            )
            .await
            .unwrap();
    }

    for id in &ids {
        wait_for_state(&handle, id, TaskState::Succeeded).await;
    }
    assert_eq!(peak.load(Ordering::SeqCst), 2);

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_running_handlers() {
    let handle = start(1);
    let finished = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&finished);

    let handler: HandlerRef = handler_fn(move |ctx| {
        let seen = Arc::clone(&seen);
        async move {
            ctx.cancelled().await;
            seen.fetch_add(1, Ordering::SeqCst);
            Err::<(), TaskError>(TaskError::Cancelled)
        }
    });

    handle
        .register_task(TaskBuilder::new("waiter").once_at(t0()).handler(handler).build())
        .await
        .unwrap();
    wait_for_state(&handle, "waiter", TaskState::Running).await;

    handle.stop().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn shell_commands_report_exit_status() {
    init_tracing();
    let handle = SchedulerBuilder::new(SchedulerConfig::default()).start().unwrap();

    let ok: HandlerRef = Arc::new(ShellHandler::new("ok", "true"));
    let bad: HandlerRef = Arc::new(ShellHandler::new("bad", "exit 3"));

    handle
        .register_task(TaskBuilder::new("ok").once_at(t0()).handler(ok).build())
        .await
        .unwrap();
    handle
        .register_task(TaskBuilder::new("bad").once_at(t0()).handler(bad).build())
        .await
        .unwrap();

    wait_for_state(&handle, "ok", TaskState::Succeeded).await;
    let status = wait_for_state(&handle, "bad", TaskState::Failed).await;
    assert_eq!(
        status.last_error.as_deref(),
        Some("handler error: command exited with code 3")
    );

    handle.stop().await.unwrap();
}

fn pool_task(id: &str, dispatch_id: u64, handler: HandlerRef) -> ScheduledTask {
    ScheduledTask {
        id: id.to_string(),
        dispatch_id,
        attempt: 1,
        scheduled_for: t0(),
        timeout: None,
        handler,
    }
}

#[tokio::test(start_paused = true)]
async fn cancel_all_reaches_every_dispatch_of_a_task() {
    init_tracing();
    let (runtime_tx, mut runtime_rx) = mpsc::channel(16);
    let pool = spawn_worker_pool(2, runtime_tx);

    // A redispatch can arrive while the previous execution is still running.
    for dispatch_id in [1, 2] {
        let handler = handlers::sleep_cooperatively(Duration::from_secs(3600));
        pool.send(PoolCommand::Run(pool_task("twice", dispatch_id, handler)))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    pool.send(PoolCommand::CancelAll).await.unwrap();

    let mut cancelled = Vec::new();
    while cancelled.len() < 2 {
        let event = tokio::time::timeout(Duration::from_secs(5), runtime_rx.recv())
            .await
            .expect("both executions should report back")
            .unwrap();
        if let RuntimeEvent::TaskCompleted(done) = event {
            assert!(matches!(done.outcome, TaskOutcome::Failed(TaskError::Cancelled)));
            cancelled.push(done.dispatch_id);
        }
    }
    cancelled.sort_unstable();
    assert_eq!(cancelled, [1, 2]);
}

#[tokio::test(start_paused = true)]
async fn cancel_targets_only_the_named_dispatch() {
    init_tracing();
    let (runtime_tx, mut runtime_rx) = mpsc::channel(16);
    let pool = spawn_worker_pool(2, runtime_tx);

    for dispatch_id in [1, 2] {
        let handler = handlers::sleep_cooperatively(Duration::from_secs(60));
        pool.send(PoolCommand::Run(pool_task("twice", dispatch_id, handler)))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    pool.send(PoolCommand::Cancel {
        task: "twice".to_string(),
        dispatch_id: 1,
    })
    .await
    .unwrap();

    let mut outcomes = Vec::new();
    while outcomes.len() < 2 {
        if let Some(RuntimeEvent::TaskCompleted(done)) = runtime_rx.recv().await {
            outcomes.push((done.dispatch_id, done.outcome));
        }
    }
    assert!(matches!(outcomes[0], (1, TaskOutcome::Failed(TaskError::Cancelled))));
    assert!(matches!(outcomes[1], (2, TaskOutcome::Success)));
}
