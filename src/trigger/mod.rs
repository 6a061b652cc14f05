// src/trigger/mod.rs

//! Trigger model and next-run calculation.
//!
//! - [`spec`] defines the tagged [`TriggerSpec`] (`Once | Interval | Cron`).
//! - [`calculator`] computes the next execution instant.
//! - [`parse`] reads reduced cron expressions from strings.

pub mod calculator;
pub mod parse;
pub mod spec;

pub use calculator::{first_run, next_cron_match, next_run};
pub use spec::{CronField, CronSpec, TriggerSpec};
