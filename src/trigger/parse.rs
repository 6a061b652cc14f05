// src/trigger/parse.rs

//! Parsing of reduced cron expressions: `"<minute> <hour> <weekday>"`.
//!
//! Each field accepts `*`, `*/step`, `n`, `a-b`, `a-b/step`, or a comma list
//! of those. A weekday of `7` is folded into Sunday (`0`).

use std::collections::BTreeSet;
use std::str::FromStr;

use crate::errors::SchedulerError;
use crate::trigger::spec::{CronField, CronSpec};

impl FromStr for CronSpec {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(SchedulerError::InvalidTrigger(format!(
                "cron expression '{s}' must have 3 fields (minute hour weekday), got {}",
                parts.len()
            )));
        }

        let minute = parse_field(parts[0], "minute", CronSpec::MINUTE_MAX)?;
        let hour = parse_field(parts[1], "hour", CronSpec::HOUR_MAX)?;
        let weekday = fold_sunday(parse_field(parts[2], "weekday", 7)?);

        let spec = CronSpec::new(minute, hour, weekday);
        spec.validate()?;
        Ok(spec)
    }
}

fn parse_field(raw: &str, name: &str, max: u32) -> Result<CronField, SchedulerError> {
    if raw == "*" {
        return Ok(CronField::Any);
    }

    let mut values = BTreeSet::new();
    for item in raw.split(',') {
        values.extend(parse_item(item, name, max)?);
    }
    Ok(CronField::Values(values))
}

fn parse_item(item: &str, name: &str, max: u32) -> Result<Vec<u32>, SchedulerError> {
    let (range_part, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(parse_number(step, name)?)),
        None => (item, None),
    };

    let (start, end) = if range_part == "*" {
        (0, max)
    } else if let Some((a, b)) = range_part.split_once('-') {
        (parse_number(a, name)?, parse_number(b, name)?)
    } else {
        let v = parse_number(range_part, name)?;
        // `5/10` means "from 5 to the end, every 10".
        (v, if step.is_some() { max } else { v })
    };

    if start > end {
        return Err(SchedulerError::InvalidTrigger(format!(
            "cron {name} range '{range_part}' is reversed"
        )));
    }
    if end > max {
        return Err(SchedulerError::InvalidTrigger(format!(
            "cron {name} value {end} out of range 0-{max}"
        )));
    }

    let step = match step {
        Some(0) => {
            return Err(SchedulerError::InvalidTrigger(format!(
                "cron {name} step must be at least 1"
            )));
        }
        Some(s) => s as usize,
        None => 1,
    };

    Ok((start..=end).step_by(step).collect())
}

fn parse_number(raw: &str, name: &str) -> Result<u32, SchedulerError> {
    raw.trim().parse::<u32>().map_err(|e| {
        SchedulerError::InvalidTrigger(format!("cron {name} value '{raw}' is not a number: {e}"))
    })
}

fn fold_sunday(field: CronField) -> CronField {
    match field {
        CronField::Any => CronField::Any,
        CronField::Values(set) => {
            CronField::Values(set.into_iter().map(|v| if v == 7 { 0 } else { v }).collect())
        }
    }
}
