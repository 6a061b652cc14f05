// src/retry.rs

//! Retry policy and exponential backoff.
//!
//! The controller is split in two pure steps so that it is easy to test:
//! [`backoff_delay`] computes the deterministic part of the delay, and
//! [`decide_after_failure`] turns a failure count into either another attempt
//! or exhaustion, adding bounded jitter when the policy asks for it.

use std::time::Duration;

use rand::Rng;

use crate::errors::{Result, SchedulerError};

/// Jitter adds at most this fraction of the computed delay.
pub const JITTER_RATIO: f64 = 0.1;

/// Upper bound for any computed delay, used when the policy has no cap.
const DELAY_CEILING: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `1` disables retries.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Growth factor per failed attempt, `>= 1.0`.
    pub multiplier: f64,
    pub jitter: bool,
    /// Optional cap applied before jitter.
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: false,
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    /// Policy that gives up after the first failure.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier,
            jitter: false,
            max_delay: None,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(SchedulerError::InvalidRetryPolicy(
                "max_attempts must be >= 1".to_string(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(SchedulerError::InvalidRetryPolicy(format!(
                "multiplier must be a finite number >= 1.0 (got {})",
                self.multiplier
            )));
        }
        if let Some(max) = self.max_delay {
            if max < self.base_delay {
                return Err(SchedulerError::InvalidRetryPolicy(format!(
                    "max_delay {max:?} is smaller than base_delay {:?}",
                    self.base_delay
                )));
            }
        }
        Ok(())
    }
}

/// What the controller decided after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// `attempts` failures used up the policy; the task is terminally failed.
    Exhausted { attempts: u32 },
}

/// Deterministic backoff after the `attempt`-th consecutive failure:
/// `base_delay * multiplier^(attempt - 1)`, capped by `max_delay`.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let secs = policy.base_delay.as_secs_f64() * policy.multiplier.powi(exponent);
    let cap = policy.max_delay.unwrap_or(DELAY_CEILING).min(DELAY_CEILING);

    if !secs.is_finite() || secs >= cap.as_secs_f64() {
        return cap;
    }
    Duration::from_secs_f64(secs)
}

/// Uniform random extra delay in `[0, delay * JITTER_RATIO]`.
pub fn jitter_for<R: Rng + ?Sized>(delay: Duration, rng: &mut R) -> Duration {
    let bound = delay.as_secs_f64() * JITTER_RATIO;
    if bound <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(rng.gen_range(0.0..=bound))
}

/// Decide what happens after a failure. `attempt_count` is the number of
/// consecutive failures including the one just observed.
pub fn decide_after_failure<R: Rng + ?Sized>(
    policy: &RetryPolicy,
    attempt_count: u32,
    rng: &mut R,
) -> RetryDecision {
    if attempt_count >= policy.max_attempts {
        return RetryDecision::Exhausted {
            attempts: attempt_count,
        };
    }

    let mut delay = backoff_delay(policy, attempt_count);
    if policy.jitter {
        delay += jitter_for(delay, rng);
    }

    RetryDecision::Retry {
        attempt: attempt_count,
        delay,
    }
}
