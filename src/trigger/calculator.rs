// src/trigger/calculator.rs

//! Next-run computation for every [`TriggerSpec`] variant.
//!
//! All functions here are pure: same spec and same `now` always give the same
//! answer, which is what makes the scheduler core testable without a clock.

use chrono::{DateTime, Datelike, TimeDelta, Timelike, Utc};

use crate::trigger::spec::{CronSpec, TriggerSpec};

/// Cron patterns repeat weekly, so a match (if one exists) is always found
/// within a week and a minute of the starting point.
const CRON_SEARCH_HORIZON_DAYS: i64 = 8;

/// Next execution strictly after `now`, or `None` when the trigger is
/// exhausted (a `Once` whose instant has passed).
///
/// `Interval` anchors on `now`; callers pass the completion time so that
/// drift does not accumulate.
pub fn next_run(spec: &TriggerSpec, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match spec {
        TriggerSpec::Once { at } => (*at > now).then_some(*at),
        TriggerSpec::Interval { every } => {
            let delta = TimeDelta::from_std(*every).ok()?;
            now.checked_add_signed(delta)
        }
        TriggerSpec::Cron(cron) => next_cron_match(cron, now),
    }
}

/// First scheduled run for a freshly registered task.
///
/// - `Once`: its instant, even if already past (it is then due immediately).
/// - `Interval`: due immediately.
/// - `Cron`: next match after `now`.
pub fn first_run(spec: &TriggerSpec, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match spec {
        TriggerSpec::Once { at } => Some(*at),
        TriggerSpec::Interval { .. } => Some(now),
        TriggerSpec::Cron(cron) => next_cron_match(cron, now),
    }
}

/// Smallest minute boundary strictly after `now` matching every field.
pub fn next_cron_match(cron: &CronSpec, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut t = truncate_to_minute(now)?.checked_add_signed(TimeDelta::minutes(1))?;
    let limit = t.checked_add_signed(TimeDelta::days(CRON_SEARCH_HORIZON_DAYS))?;

    while t <= limit {
        if !cron.weekday.matches(t.weekday().num_days_from_sunday()) {
            t = start_of_next_day(t)?;
            continue;
        }
        if !cron.hour.matches(t.hour()) {
            t = start_of_next_hour(t)?;
            continue;
        }
        if !cron.minute.matches(t.minute()) {
            t = t.checked_add_signed(TimeDelta::minutes(1))?;
            continue;
        }
        return Some(t);
    }

    None
}

fn truncate_to_minute(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    t.with_second(0)?.with_nanosecond(0)
}

fn start_of_next_hour(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    t.with_minute(0)?.checked_add_signed(TimeDelta::hours(1))
}

fn start_of_next_day(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let next = t.date_naive().succ_opt()?;
    Some(next.and_hms_opt(0, 0, 0)?.and_utc())
}
