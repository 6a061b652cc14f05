use chrono::{DateTime, TimeDelta, Utc};
use taskloom::clock::{Clock, ClockError};
use tokio::time::Instant;

/// Wall clock derived from Tokio's (pausable) monotonic clock.
///
/// With `#[tokio::test(start_paused = true)]` the runtime auto-advances
/// time whenever every task is idle, so scheduler-loop tests run instantly
/// and deterministically while the loop still sleeps "for real".
#[derive(Debug, Clone)]
pub struct TokioClock {
    base: DateTime<Utc>,
    started: Instant,
}

impl TokioClock {
    /// Must be created inside a Tokio runtime.
    pub fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            started: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Result<DateTime<Utc>, ClockError> {
        let elapsed = TimeDelta::from_std(self.started.elapsed())
            .map_err(|e| ClockError(format!("elapsed time out of range: {e}")))?;
        Ok(self.base + elapsed)
    }
}
