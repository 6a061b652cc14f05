// tests/trigger_calculator.rs

mod common;
use crate::common::{at_ms, t0};

use std::time::Duration;

use chrono::{Datelike, TimeDelta, TimeZone, Timelike, Utc};
use proptest::prelude::*;

use taskloom::errors::SchedulerError;
use taskloom::trigger::{CronField, CronSpec, TriggerSpec, first_run, next_run};

#[test]
fn once_in_future_returns_its_instant() {
    let at = at_ms(5_000);
    assert_eq!(next_run(&TriggerSpec::once(at), t0()), Some(at));
}

#[test]
fn once_at_or_before_now_is_exhausted() {
    let at = at_ms(5_000);
    assert_eq!(next_run(&TriggerSpec::once(at), at), None);
    assert_eq!(next_run(&TriggerSpec::once(at), at_ms(6_000)), None);
}

#[test]
fn once_in_past_is_due_immediately_on_registration() {
    let at = at_ms(-60_000);
    assert_eq!(first_run(&TriggerSpec::once(at), t0()), Some(at));
}

#[test]
fn interval_anchors_on_now() {
    let spec = TriggerSpec::every(Duration::from_secs(5));
    assert_eq!(first_run(&spec, t0()), Some(t0()));
    assert_eq!(next_run(&spec, at_ms(10_000)), Some(at_ms(15_000)));
}

#[test]
fn zero_interval_is_rejected() {
    let spec = TriggerSpec::every(Duration::ZERO);
    assert!(matches!(spec.validate(), Err(SchedulerError::InvalidTrigger(_))));
}

#[test]
fn cron_every_minute_moves_to_next_minute_boundary() {
    let spec = TriggerSpec::Cron(CronSpec::every_minute());
    let now = t0() + TimeDelta::seconds(30);
    assert_eq!(next_run(&spec, now), Some(t0() + TimeDelta::minutes(1)));

    // Exactly on a boundary still moves strictly forward.
    assert_eq!(next_run(&spec, t0()), Some(t0() + TimeDelta::minutes(1)));
}

#[test]
fn cron_weekday_skips_to_next_matching_day() {
    // t0 is Monday 2024-01-01 00:00; "30 9 5" is Friday 09:30.
    let cron: CronSpec = "30 9 5".parse().unwrap();
    let next = next_run(&TriggerSpec::Cron(cron), t0()).unwrap();

    assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 5, 9, 30, 0).unwrap());
    assert_eq!(next.weekday().num_days_from_sunday(), 5);
}

#[test]
fn cron_later_same_day_and_wraparound_to_next_week() {
    let cron: CronSpec = "0 12 1".parse().unwrap();
    let spec = TriggerSpec::Cron(cron);

    // Monday 00:00 -> Monday 12:00 the same day.
    assert_eq!(
        next_run(&spec, t0()),
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap())
    );

    // Monday 12:00 exactly -> next Monday.
    let noon = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    assert_eq!(
        next_run(&spec, noon),
        Some(Utc.with_ymd_and_hms(2024, 1, 8, 12, 0, 0).unwrap())
    );
}

#[test]
fn cron_parses_steps_ranges_and_lists() {
    let cron: CronSpec = "*/15 8-10 1-5".parse().unwrap();
    assert_eq!(cron.minute, CronField::values([0, 15, 30, 45]));
    assert_eq!(cron.hour, CronField::values([8, 9, 10]));
    assert_eq!(cron.weekday, CronField::values([1, 2, 3, 4, 5]));

    let cron: CronSpec = "5,35 * 0,7".parse().unwrap();
    assert_eq!(cron.minute, CronField::values([5, 35]));
    assert_eq!(cron.hour, CronField::Any);
    assert_eq!(cron.weekday, CronField::values([0]));
}

#[test]
fn cron_rejects_malformed_fields() {
    for bad in ["60 * *", "* 24 *", "* * 8", "* *", "5-1 * *", "*/0 * *", "a * *"] {
        let parsed = bad.parse::<CronSpec>();
        assert!(
            matches!(parsed, Err(SchedulerError::InvalidTrigger(_))),
            "expected '{bad}' to be rejected, got {parsed:?}"
        );
    }
}

#[test]
fn cron_spec_built_by_hand_is_validated() {
    let spec = TriggerSpec::Cron(CronSpec::new(
        CronField::values([75]),
        CronField::Any,
        CronField::Any,
    ));
    assert!(matches!(spec.validate(), Err(SchedulerError::InvalidTrigger(_))));

    let empty = TriggerSpec::Cron(CronSpec::new(
        CronField::Values(Default::default()),
        CronField::Any,
        CronField::Any,
    ));
    assert!(empty.validate().is_err());
}

fn cron_field(max: u32) -> impl Strategy<Value = CronField> {
    prop_oneof![
        Just(CronField::Any),
        proptest::collection::btree_set(0..=max, 1..4).prop_map(CronField::Values),
    ]
}

proptest! {
    #[test]
    fn cron_next_is_strictly_future_and_matches(
        minute in cron_field(59),
        hour in cron_field(23),
        weekday in cron_field(6),
        offset_secs in 0i64..(14 * 24 * 3600),
    ) {
        let cron = CronSpec::new(minute, hour, weekday);
        let now = t0() + TimeDelta::seconds(offset_secs);
        let next = next_run(&TriggerSpec::Cron(cron.clone()), now);

        let next = next.expect("every valid cron pattern matches within a week");
        prop_assert!(next > now);
        prop_assert!(next - now <= TimeDelta::days(8));
        prop_assert_eq!(next.second(), 0);
        prop_assert!(cron.minute.matches(next.minute()));
        prop_assert!(cron.hour.matches(next.hour()));
        prop_assert!(cron.weekday.matches(next.weekday().num_days_from_sunday()));
    }

    #[test]
    fn interval_next_is_strictly_future(every_ms in 1u64..10_000_000, offset in 0i64..1_000_000) {
        let now = at_ms(offset);
        let next = next_run(&TriggerSpec::every(Duration::from_millis(every_ms)), now).unwrap();
        prop_assert!(next > now);
    }
}
