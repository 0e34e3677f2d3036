//! Exponential backoff for failed publish attempts.
//!
//! [`backoff`] is the deterministic schedule: `initial * 2^(attempt - 1)`,
//! capped at the policy maximum. [`RetryPolicy::delay_for`] layers optional
//! bounded jitter on top so many partition loops recovering from the same
//! outage do not retry in lockstep.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;

/// Retry configuration shared read-only by every delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of publish calls per message, including the first.
    pub max_attempts: u32,

    /// Wait before the first retry.
    pub initial_delay: Duration,

    /// Upper bound for any single wait.
    pub max_delay: Duration,

    /// Jitter fraction in `[0.0, 1.0]`. Zero disables jitter.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy without jitter.
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self { max_attempts, initial_delay, max_delay, jitter_factor: 0.0 }
    }

    /// Sets the jitter fraction.
    #[must_use]
    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    /// Checks the policy invariants.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] when `max_attempts` is zero,
    /// `initial_delay` is zero, `max_delay` is below `initial_delay`, or the
    /// jitter fraction is outside `[0.0, 1.0]`.
    pub fn validate(&self) -> Result<(), DeliveryError> {
        if self.max_attempts == 0 {
            return Err(DeliveryError::configuration("max_attempts must be at least 1"));
        }
        if self.initial_delay.is_zero() {
            return Err(DeliveryError::configuration("initial_delay must be greater than zero"));
        }
        if self.max_delay < self.initial_delay {
            return Err(DeliveryError::configuration(format!(
                "max_delay ({:?}) must not be less than initial_delay ({:?})",
                self.max_delay, self.initial_delay
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(DeliveryError::configuration(format!(
                "jitter_factor must be within [0.0, 1.0], got {}",
                self.jitter_factor
            )));
        }
        Ok(())
    }

    /// Whether another attempt may follow the attempt with the given 0-based
    /// index.
    pub fn allows_retry_after(&self, attempt_index: u32) -> bool {
        attempt_index.saturating_add(1) < self.max_attempts
    }

    /// Wait before the retry that follows `attempt` prior attempts, with
    /// jitter applied and re-capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = backoff(attempt, self);
        std::cmp::min(apply_jitter(delay, self.jitter_factor), self.max_delay)
    }
}

/// Deterministic backoff for the retry following `attempt` prior attempts.
///
/// `attempt` is 1-based: the first retry uses `attempt = 1` and waits
/// `initial_delay`. The first publish never waits, so `attempt = 0` is not a
/// meaningful input and is treated as `1`. Overflow saturates to
/// `max_delay`.
pub fn backoff(attempt: u32, policy: &RetryPolicy) -> Duration {
    let exponent = attempt.max(1) - 1;
    let delay = 2_u32
        .checked_pow(exponent)
        .and_then(|multiplier| policy.initial_delay.checked_mul(multiplier))
        .unwrap_or(policy.max_delay);

    std::cmp::min(delay, policy.max_delay)
}

/// Randomizes a delay by ±`jitter_factor`.
///
/// With a factor of 0.25 a 10s delay becomes anything from 7.5s to 12.5s.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let clamped_jitter = jitter_factor.clamp(0.0, 1.0);

    let mut rng = rand::rng();
    let jitter_range = duration.as_secs_f64() * clamped_jitter;
    let jitter_offset = rng.random_range(-jitter_range..=jitter_range);
    let jittered_secs = duration.as_secs_f64() + jitter_offset;

    Duration::from_secs_f64(jittered_secs.max(0.0))
}
