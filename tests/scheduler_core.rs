// tests/scheduler_core.rs

mod common;
use crate::common::builders::TaskBuilder;
use crate::common::{at_ms, completion, failure, ids, ms_since_t0, scheduler, success, t0};

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use taskloom::dag::{Scheduler, StopTask};
use taskloom::engine::{CompletionEvent, SchedulerConfig, TaskOutcome};
use taskloom::errors::{SchedulerError, TaskError};
use taskloom::retry::RetryPolicy;
use taskloom::types::{DependencyFailurePolicy, TaskState};

fn every_5s(id: &str) -> TaskBuilder {
    TaskBuilder::new(id).every(Duration::from_secs(5))
}

#[test]
fn blocked_dependent_runs_after_prerequisite_succeeds() {
    let mut s = scheduler(1);
    s.register(every_5s("A").priority(1).build(), t0()).unwrap();
    s.register(every_5s("B").priority(5).after("A").build(), t0()).unwrap();

    let tick1 = s.handle_tick(t0());
    assert_eq!(ids(&tick1), ["A"]);

    let b = s.status("B", t0()).unwrap();
    assert_eq!(b.state, TaskState::Idle);
    assert_eq!(b.blocked_on, vec!["A".to_string()]);

    s.handle_completion(success(&tick1[0]), t0());

    let tick2 = s.handle_tick(t0());
    assert_eq!(ids(&tick2), ["B"]);
}

#[test]
fn always_failing_task_retries_with_backoff_then_fails() {
    let mut s = scheduler(1);
    let policy = RetryPolicy::exponential(3, Duration::from_millis(1000), 2.0);
    s.register(
        TaskBuilder::new("C").every(Duration::from_secs(60)).retry(policy).build(),
        t0(),
    )
    .unwrap();

    let mut attempts_at = Vec::new();
    for now_ms in [0, 999, 1000, 2999, 3000, 10_000, 100_000] {
        let now = at_ms(now_ms);
        for task in s.handle_tick(now) {
            attempts_at.push(ms_since_t0(task.scheduled_for));
            s.handle_completion(failure(&task), now);
        }
    }

    assert_eq!(attempts_at, vec![0, 1000, 3000]);

    let status = s.status("C", at_ms(100_000)).unwrap();
    assert_eq!(status.state, TaskState::Failed);
    assert_eq!(status.attempt_count, 3);
    assert_eq!(status.next_run_at, None);
    assert_eq!(status.last_error.as_deref(), Some("handler error: boom"));
}

#[test]
fn awaiting_retry_is_visible_between_attempts() {
    let mut s = scheduler(1);
    let policy = RetryPolicy::exponential(3, Duration::from_millis(1000), 2.0);
    s.register(TaskBuilder::new("C").retry(policy).build(), t0()).unwrap();

    let tick = s.handle_tick(t0());
    s.handle_completion(failure(&tick[0]), t0());

    let status = s.status("C", at_ms(500)).unwrap();
    assert_eq!(status.state, TaskState::AwaitingRetry);
    assert_eq!(status.attempt_count, 1);
    assert_eq!(status.next_run_at, Some(at_ms(1000)));

    // Once due it reads as Ready.
    assert_eq!(s.status("C", at_ms(1000)).unwrap().state, TaskState::Ready);
}

#[test]
fn success_resets_attempt_count() {
    let mut s = scheduler(1);
    let policy = RetryPolicy::exponential(5, Duration::from_millis(100), 1.0);
    s.register(TaskBuilder::new("C").retry(policy).build(), t0()).unwrap();

    let first = s.handle_tick(t0());
    s.handle_completion(failure(&first[0]), t0());
    let second = s.handle_tick(at_ms(100));
    assert_eq!(second[0].attempt, 2);
    s.handle_completion(success(&second[0]), at_ms(100));

    let status = s.status("C", at_ms(100)).unwrap();
    assert_eq!(status.attempt_count, 0);
    assert_eq!(status.last_error, None);
}

#[test]
fn highest_priorities_fill_available_slots() {
    let mut s = scheduler(2);
    for (id, priority) in [("p1", 1), ("p2", 2), ("p3", 3), ("p4", 4), ("p5", 5)] {
        s.register(every_5s(id).priority(priority).build(), t0()).unwrap();
    }

    let dispatched = s.handle_tick(t0());
    assert_eq!(ids(&dispatched), ["p5", "p4"]);
    assert_eq!(s.running_count(), 2);

    for id in ["p1", "p2", "p3"] {
        assert_eq!(s.status(id, t0()).unwrap().state, TaskState::Ready);
    }
    assert_eq!(s.status("p5", t0()).unwrap().state, TaskState::Running);

    // No free slot: nothing else starts.
    assert!(s.handle_tick(t0()).is_empty());
    s.check_invariants().unwrap();
}

#[test]
fn priority_five_beats_priority_one_with_single_slot() {
    let mut s = scheduler(1);
    s.register(every_5s("low").priority(1).build(), t0()).unwrap();
    s.register(every_5s("high").priority(5).build(), t0()).unwrap();

    assert_eq!(ids(&s.handle_tick(t0())), ["high"]);
}

#[test]
fn ties_break_on_next_run_then_id() {
    let mut s = scheduler(3);
    s.register(TaskBuilder::new("b").once_at(at_ms(-10)).build(), t0()).unwrap();
    s.register(TaskBuilder::new("a").once_at(at_ms(-5)).build(), t0()).unwrap();
    s.register(TaskBuilder::new("c").once_at(at_ms(-10)).build(), t0()).unwrap();

    assert_eq!(ids(&s.handle_tick(t0())), ["b", "c", "a"]);
}

#[test]
fn periodic_success_schedules_strictly_later() {
    let mut s = scheduler(1);
    s.register(
        TaskBuilder::new("tick").every(Duration::from_secs(10)).build(),
        t0(),
    )
    .unwrap();

    let first = s.handle_tick(t0());
    s.handle_completion(success(&first[0]), t0());
    let second = s.handle_tick(at_ms(10_000));
    assert_eq!(second.len(), 1);
    s.handle_completion(success(&second[0]), at_ms(10_000));

    let next = s.status("tick", at_ms(10_000)).unwrap().next_run_at.unwrap();
    assert!(next > at_ms(10_000));
    assert_eq!(next, at_ms(20_000));
}

#[test]
fn cron_success_schedules_next_match() {
    let mut s = scheduler(1);
    s.register(TaskBuilder::new("cron").cron("* * *").build(), t0()).unwrap();

    assert!(s.handle_tick(t0()).is_empty());
    let due = s.handle_tick(at_ms(60_000));
    assert_eq!(ids(&due), ["cron"]);
    s.handle_completion(success(&due[0]), at_ms(60_500));

    let status = s.status("cron", at_ms(60_500)).unwrap();
    assert_eq!(status.state, TaskState::Idle);
    assert_eq!(status.next_run_at, Some(at_ms(120_000)));
}

#[test]
fn once_task_succeeds_terminally() {
    let mut s = scheduler(1);
    s.register(TaskBuilder::new("one").once_at(at_ms(500)).build(), t0()).unwrap();

    assert!(s.handle_tick(t0()).is_empty());
    let due = s.handle_tick(at_ms(500));
    s.handle_completion(success(&due[0]), at_ms(600));

    let status = s.status("one", at_ms(600)).unwrap();
    assert_eq!(status.state, TaskState::Succeeded);
    assert_eq!(status.next_run_at, None);
    assert!(s.handle_tick(at_ms(1_000_000)).is_empty());
}

#[test]
fn once_in_the_past_runs_immediately() {
    let mut s = scheduler(1);
    s.register(TaskBuilder::new("late").once_at(at_ms(-60_000)).build(), t0()).unwrap();
    assert_eq!(ids(&s.handle_tick(t0())), ["late"]);
}

#[test]
fn registration_errors_leave_state_untouched() {
    let mut s = scheduler(1);
    s.register(every_5s("A").build(), t0()).unwrap();

    assert!(matches!(
        s.register(every_5s("A").build(), t0()),
        Err(SchedulerError::DuplicateId(id)) if id == "A"
    ));
    assert!(matches!(
        s.register(every_5s("B").after("missing").build(), t0()),
        Err(SchedulerError::UnknownDependency { dependency, .. }) if dependency == "missing"
    ));
    assert!(matches!(
        s.register(TaskBuilder::new("Z").every(Duration::ZERO).build(), t0()),
        Err(SchedulerError::InvalidTrigger(_))
    ));
    assert!(matches!(
        s.register(
            every_5s("R").retry(RetryPolicy::exponential(0, Duration::from_secs(1), 2.0)).build(),
            t0()
        ),
        Err(SchedulerError::InvalidRetryPolicy(_))
    ));

    assert_eq!(s.registry().len(), 1);
    assert!(s.registry().graph().edges().is_empty());
}

/// Interval long enough that one step from `t0()` still fits in `DateTime`.
fn span_to_end_of_time(slack: TimeDelta) -> Duration {
    (DateTime::<Utc>::MAX_UTC - t0() - slack).to_std().unwrap()
}

#[test]
fn interval_without_a_second_fire_time_is_rejected() {
    let mut s = scheduler(1);
    let every = span_to_end_of_time(TimeDelta::zero()) + Duration::from_secs(3600);

    let err = s
        .register(TaskBuilder::new("forever").every(every).build(), t0())
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidTrigger(_)));
    assert_eq!(s.registry().len(), 0);
}

#[test]
fn periodic_task_fails_when_its_trigger_runs_out() {
    let mut s = scheduler(1);
    let every = span_to_end_of_time(TimeDelta::hours(1));
    s.register(TaskBuilder::new("edge").every(every).build(), t0())
        .unwrap();

    let due = s.handle_tick(t0());
    assert_eq!(ids(&due), ["edge"]);
    let done_at = t0() + TimeDelta::days(1);
    s.handle_completion(success(&due[0]), done_at);

    let status = s.status("edge", done_at).unwrap();
    assert_eq!(status.state, TaskState::Failed);
    assert_eq!(status.next_run_at, None);
    assert!(
        status
            .last_error
            .unwrap()
            .starts_with("no further fire time")
    );
    assert!(s.handle_tick(done_at).is_empty());
}

#[test]
fn zero_max_concurrency_is_a_config_error() {
    let config = SchedulerConfig::default().with_max_concurrency(0);
    assert!(matches!(
        Scheduler::new(&config),
        Err(SchedulerError::ConfigError(_))
    ));

    let config = SchedulerConfig {
        poll_interval: Duration::ZERO,
        ..SchedulerConfig::default()
    };
    assert!(matches!(
        Scheduler::new(&config),
        Err(SchedulerError::ConfigError(_))
    ));
}

#[test]
fn cycle_through_reregistered_task_is_rejected() {
    let mut s = scheduler(1);
    s.register(every_5s("B").build(), t0()).unwrap();
    s.register(every_5s("A").after("B").build(), t0()).unwrap();

    // Remove B; A's edge to it dangles. Re-adding B on top of A closes a loop.
    s.unregister("B").unwrap();
    let err = s.register(every_5s("B").after("A").build(), t0()).unwrap_err();
    assert!(matches!(err, SchedulerError::CyclicDependency(_)));

    let edges: Vec<_> = s.registry().graph().edges().into_iter().collect();
    assert_eq!(edges, vec![("A".to_string(), "B".to_string())]);
    assert!(!s.registry().contains("B"));
}

#[test]
fn dangling_dependency_blocks_and_is_reported() {
    let mut s = scheduler(2);
    s.register(every_5s("A").build(), t0()).unwrap();
    s.register(every_5s("B").after("A").build(), t0()).unwrap();

    s.unregister("A").unwrap();

    assert!(s.handle_tick(t0()).is_empty());
    let status = s.status("B", t0()).unwrap();
    assert_eq!(status.blocked_on, vec!["A".to_string()]);

    // New registrations may not name the removed id.
    assert!(matches!(
        s.register(every_5s("C").after("A").build(), t0()),
        Err(SchedulerError::UnknownDependency { .. })
    ));
}

#[test]
fn unregister_rules() {
    let mut s = scheduler(1);
    s.register(every_5s("A").build(), t0()).unwrap();

    assert!(matches!(s.unregister("nope"), Err(SchedulerError::NotFound(_))));

    let running = s.handle_tick(t0());
    assert!(matches!(s.unregister("A"), Err(SchedulerError::TaskRunning(_))));

    s.handle_completion(success(&running[0]), t0());
    s.unregister("A").unwrap();
    assert!(matches!(s.status("A", t0()), Err(SchedulerError::NotFound(_))));
}

#[test]
fn stale_and_unknown_completions_are_ignored() {
    let mut s = scheduler(1);
    s.register(every_5s("A").build(), t0()).unwrap();
    let running = s.handle_tick(t0());

    let mut stale = success(&running[0]);
    stale.dispatch_id += 100;
    s.handle_completion(stale, t0());
    assert_eq!(s.state_of("A"), Some(TaskState::Running));
    assert_eq!(s.running_count(), 1);

    s.handle_completion(
        CompletionEvent {
            task: "ghost".to_string(),
            dispatch_id: 1,
            outcome: TaskOutcome::Success,
            elapsed: Duration::ZERO,
        },
        t0(),
    );

    // The real completion still lands, and a duplicate of it is ignored.
    s.handle_completion(success(&running[0]), t0());
    s.handle_completion(success(&running[0]), t0());
    assert_eq!(s.state_of("A"), Some(TaskState::Idle));
    assert_eq!(s.running_count(), 0);
    s.check_invariants().unwrap();
}

#[test]
fn dependency_is_rechecked_when_claiming() {
    let mut s = scheduler(2);
    s.register(every_5s("A").priority(10).build(), t0()).unwrap();
    s.register(every_5s("B").priority(1).after("A").build(), t0()).unwrap();

    let a = s.handle_tick(t0());
    s.handle_completion(success(&a[0]), t0());
    let b = s.handle_tick(t0());
    assert_eq!(ids(&b), ["B"]);
    s.handle_completion(success(&b[0]), t0());

    // Both due at 5s; claiming A first makes B's dependency Running again.
    let both_due = s.handle_tick(at_ms(5_000));
    assert_eq!(ids(&both_due), ["A"]);
    assert_eq!(s.status("B", at_ms(5_000)).unwrap().blocked_on, vec!["A".to_string()]);
}

#[test]
fn failed_dependency_blocks_by_default() {
    let mut s = scheduler(2);
    s.register(TaskBuilder::new("A").once_at(t0()).build(), t0()).unwrap();
    s.register(TaskBuilder::new("B").once_at(t0()).after("A").build(), t0()).unwrap();

    let a = s.handle_tick(t0());
    s.handle_completion(failure(&a[0]), t0());
    assert_eq!(s.state_of("A"), Some(TaskState::Failed));

    assert!(s.handle_tick(at_ms(1_000)).is_empty());
    assert_eq!(s.status("B", at_ms(1_000)).unwrap().blocked_on, vec!["A".to_string()]);
}

#[test]
fn failed_dependency_satisfies_under_satisfy_policy() {
    let config = SchedulerConfig {
        dependency_failure_policy: DependencyFailurePolicy::Satisfy,
        ..SchedulerConfig::default()
    };
    let mut s = Scheduler::new(&config).unwrap();
    s.register(TaskBuilder::new("A").once_at(t0()).build(), t0()).unwrap();
    s.register(TaskBuilder::new("B").once_at(t0()).after("A").build(), t0()).unwrap();

    let a = s.handle_tick(t0());
    s.handle_completion(failure(&a[0]), t0());

    assert_eq!(ids(&s.handle_tick(t0())), ["B"]);
}

#[test]
fn stop_pending_task_then_reset() {
    let mut s = scheduler(1);
    s.register(every_5s("A").build(), t0()).unwrap();

    assert_eq!(s.stop_task("A", t0()).unwrap(), StopTask::Stopped);
    assert_eq!(s.state_of("A"), Some(TaskState::Stopped));
    assert!(s.handle_tick(at_ms(60_000)).is_empty());

    assert!(matches!(
        s.stop_task("A", t0()),
        Err(SchedulerError::InvalidState { .. })
    ));

    s.reset_task("A", at_ms(60_000)).unwrap();
    assert_eq!(s.state_of("A"), Some(TaskState::Idle));
    assert_eq!(ids(&s.handle_tick(at_ms(60_000))), ["A"]);
}

#[test]
fn stopping_a_running_task_ends_stopped_without_retry() {
    let mut s = scheduler(1);
    let policy = RetryPolicy::exponential(5, Duration::from_secs(1), 2.0);
    s.register(every_5s("A").retry(policy).build(), t0()).unwrap();
    let running = s.handle_tick(t0());

    let dispatch_id = running[0].dispatch_id;
    assert_eq!(
        s.stop_task("A", t0()).unwrap(),
        StopTask::CancelRequested { dispatch_id }
    );
    // Still running until the handler reports back.
    assert_eq!(s.state_of("A"), Some(TaskState::Running));

    s.handle_completion(
        completion(&running[0], TaskOutcome::Failed(TaskError::Cancelled)),
        at_ms(10),
    );

    let status = s.status("A", at_ms(10)).unwrap();
    assert_eq!(status.state, TaskState::Stopped);
    assert_eq!(status.last_error.as_deref(), Some("cancelled"));
    assert!(s.handle_tick(at_ms(60_000)).is_empty());
    s.check_invariants().unwrap();
}

#[test]
fn reset_revives_failed_task() {
    let mut s = scheduler(1);
    s.register(every_5s("A").build(), t0()).unwrap();
    let running = s.handle_tick(t0());
    s.handle_completion(failure(&running[0]), t0());
    assert_eq!(s.state_of("A"), Some(TaskState::Failed));

    assert!(matches!(
        s.reset_task("nope", t0()),
        Err(SchedulerError::NotFound(_))
    ));

    s.reset_task("A", at_ms(2_000)).unwrap();
    let status = s.status("A", at_ms(2_000)).unwrap();
    assert_eq!(status.state, TaskState::Ready);
    assert_eq!(status.attempt_count, 0);
    assert_eq!(status.last_error, None);
}

#[test]
fn reset_rejects_live_tasks() {
    let mut s = scheduler(1);
    s.register(every_5s("A").build(), t0()).unwrap();
    assert!(matches!(
        s.reset_task("A", t0()),
        Err(SchedulerError::InvalidState { .. })
    ));
}

#[test]
fn state_changes_are_recorded_in_order() {
    let mut s = scheduler(1);
    s.register(every_5s("A").build(), t0()).unwrap();
    let running = s.handle_tick(t0());
    s.handle_completion(success(&running[0]), at_ms(5));

    let changes = s.take_changes();
    let summary: Vec<_> = changes.iter().map(|c| (c.from, c.to)).collect();
    assert_eq!(
        summary,
        vec![
            (None, TaskState::Idle),
            (Some(TaskState::Idle), TaskState::Running),
            (Some(TaskState::Running), TaskState::Idle),
        ]
    );
    assert_eq!(changes[2].at, at_ms(5));
    assert!(s.take_changes().is_empty());
}

#[test]
fn next_wake_ignores_already_due_tasks() {
    let mut s = scheduler(1);
    s.register(every_5s("A").build(), t0()).unwrap();
    s.register(TaskBuilder::new("later").once_at(at_ms(7_000)).build(), t0()).unwrap();

    assert_eq!(s.next_wake_at(t0()), Some(at_ms(7_000)));
}

#[test]
fn seeded_jitter_is_reproducible() {
    let policy = RetryPolicy::exponential(3, Duration::from_secs(10), 2.0).with_jitter(true);

    let retry_at = |seed: u64| {
        let config = SchedulerConfig {
            jitter_seed: Some(seed),
            ..SchedulerConfig::default()
        };
        let mut s = Scheduler::new(&config).unwrap();
        s.register(every_5s("J").retry(policy.clone()).build(), t0()).unwrap();
        let running = s.handle_tick(t0());
        s.handle_completion(failure(&running[0]), t0());
        s.status("J", t0()).unwrap().next_run_at.unwrap()
    };

    let first = retry_at(99);
    assert_eq!(first, retry_at(99));
    assert!(first >= at_ms(10_000) && first <= at_ms(11_000));
}
