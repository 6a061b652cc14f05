// src/clock.rs

//! Injectable time source.
//!
//! The scheduler never calls `Utc::now()` directly; every time read goes
//! through a [`Clock`], so tests can drive time by hand.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use thiserror::Error;

/// A clock read failed. Treated as fatal by the scheduler loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ClockError(pub String);

pub trait Clock: Send + Sync {
    fn now(&self) -> Result<DateTime<Utc>, ClockError>;
}

/// Wall clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<DateTime<Utc>, ClockError> {
        Ok(Utc::now())
    }
}

#[derive(Debug)]
struct ManualClockState {
    now: DateTime<Utc>,
    unavailable: bool,
}

/// Clock that only moves when told to.
///
/// Clones share the same underlying time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualClockState>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualClockState {
                now: start,
                unavailable: false,
            })),
        }
    }

    /// Clock starting at the Unix epoch.
    pub fn at_epoch() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.lock().now = now;
    }

    pub fn advance(&self, by: std::time::Duration) {
        let delta = ChronoDuration::from_std(by).unwrap_or(ChronoDuration::MAX);
        let mut state = self.lock();
        state.now = state.now.checked_add_signed(delta).unwrap_or(state.now);
    }

    /// Make every subsequent read fail.
    pub fn make_unavailable(&self) {
        self.lock().unavailable = true;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualClockState> {
        // A poisoned clock still holds a valid timestamp.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<DateTime<Utc>, ClockError> {
        let state = self.lock();
        if state.unavailable {
            return Err(ClockError("manual clock marked unavailable".to_string()));
        }
        Ok(state.now)
    }
}
