// src/trigger/spec.rs

//! Trigger specification types and their structural validation.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::errors::{Result, SchedulerError};

/// When a task should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerSpec {
    /// Run a single time at `at`.
    Once { at: DateTime<Utc> },
    /// Run repeatedly, `every` after the previous completion.
    Interval { every: Duration },
    /// Run whenever minute, hour and weekday all match.
    Cron(CronSpec),
}

impl TriggerSpec {
    pub fn once(at: DateTime<Utc>) -> Self {
        TriggerSpec::Once { at }
    }

    pub fn every(every: Duration) -> Self {
        TriggerSpec::Interval { every }
    }

    pub fn is_once(&self) -> bool {
        matches!(self, TriggerSpec::Once { .. })
    }

    /// Structural validation, run once at registration.
    pub fn validate(&self) -> Result<()> {
        match self {
            TriggerSpec::Once { .. } => Ok(()),
            TriggerSpec::Interval { every } => {
                if every.is_zero() {
                    return Err(SchedulerError::InvalidTrigger(
                        "interval must be greater than zero".to_string(),
                    ));
                }
                if chrono::TimeDelta::from_std(*every).is_err() {
                    return Err(SchedulerError::InvalidTrigger(format!(
                        "interval {every:?} is out of range"
                    )));
                }
                Ok(())
            }
            TriggerSpec::Cron(cron) => cron.validate(),
        }
    }
}

impl fmt::Display for TriggerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSpec::Once { at } => write!(f, "once at {}", at.to_rfc3339()),
            TriggerSpec::Interval { every } => write!(f, "every {every:?}"),
            TriggerSpec::Cron(cron) => write!(f, "cron \"{cron}\""),
        }
    }
}

/// Reduced cron model: minute, hour and weekday only.
///
/// Weekdays count from Sunday = 0 to Saturday = 6. All matching is in UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSpec {
    pub minute: CronField,
    pub hour: CronField,
    pub weekday: CronField,
}

impl CronSpec {
    pub const MINUTE_MAX: u32 = 59;
    pub const HOUR_MAX: u32 = 23;
    pub const WEEKDAY_MAX: u32 = 6;

    pub fn new(minute: CronField, hour: CronField, weekday: CronField) -> Self {
        Self {
            minute,
            hour,
            weekday,
        }
    }

    /// Matches every minute.
    pub fn every_minute() -> Self {
        Self::new(CronField::Any, CronField::Any, CronField::Any)
    }

    pub fn validate(&self) -> Result<()> {
        self.minute.validate("minute", Self::MINUTE_MAX)?;
        self.hour.validate("hour", Self::HOUR_MAX)?;
        self.weekday.validate("weekday", Self::WEEKDAY_MAX)?;
        Ok(())
    }
}

impl fmt::Display for CronSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.minute, self.hour, self.weekday)
    }
}

/// One cron field: wildcard or an explicit set of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronField {
    Any,
    Values(BTreeSet<u32>),
}

impl CronField {
    pub fn values(values: impl IntoIterator<Item = u32>) -> Self {
        CronField::Values(values.into_iter().collect())
    }

    pub fn matches(&self, value: u32) -> bool {
        match self {
            CronField::Any => true,
            CronField::Values(set) => set.contains(&value),
        }
    }

    fn validate(&self, name: &str, max: u32) -> Result<()> {
        match self {
            CronField::Any => Ok(()),
            CronField::Values(set) => {
                if set.is_empty() {
                    return Err(SchedulerError::InvalidTrigger(format!(
                        "cron {name} field has no values"
                    )));
                }
                if let Some(bad) = set.iter().find(|v| **v > max) {
                    return Err(SchedulerError::InvalidTrigger(format!(
                        "cron {name} value {bad} out of range 0-{max}"
                    )));
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for CronField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CronField::Any => f.write_str("*"),
            CronField::Values(set) => {
                let parts: Vec<String> = set.iter().map(|v| v.to_string()).collect();
                f.write_str(&parts.join(","))
            }
        }
    }
}
