//! Backoff policy and delay computation

use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::debug;

/// Problems with a retry policy's parameters
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("backoff multiplier must be a finite number >= 1, got {0}")]
    InvalidMultiplier(f64),

    #[error("jitter fraction must be within [0, 1], got {0}")]
    InvalidJitter(f64),
}

/// Bounded exponential backoff with multiplicative jitter
///
/// Delay before retry `n` (0-based) is `min(max_delay, initial_delay * multiplier^n)`,
/// then scaled by `1 + U(-jitter, +jitter)` and floored at zero. Clamping
/// happens before jitter, so a jittered delay may exceed `max_delay` by at most
/// `jitter_fraction * max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_fraction: 0.1,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(PolicyError::InvalidMultiplier(self.backoff_multiplier));
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(PolicyError::InvalidJitter(self.jitter_fraction));
        }
        Ok(())
    }

    /// Total number of attempts this policy allows
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Clamped delay before retry `attempt` (0-based), without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        // 0 * inf
        if raw.is_nan() {
            return Duration::ZERO;
        }
        let clamped = raw.min(self.max_delay.as_secs_f64());
        if clamped.is_finite() && clamped > 0.0 {
            Duration::from_secs_f64(clamped)
        } else {
            Duration::ZERO
        }
    }

    /// Apply jitter to a delay given a sample in [-1, 1]
    pub fn jittered(&self, delay: Duration, sample: f64) -> Duration {
        let factor = 1.0 + sample.clamp(-1.0, 1.0) * self.jitter_fraction;
        let scaled = delay.as_secs_f64() * factor;
        if scaled.is_finite() && scaled > 0.0 {
            Duration::from_secs_f64(scaled)
        } else {
            Duration::ZERO
        }
    }

    /// Delay before retry `attempt` (0-based), jittered with `rng`
    pub fn delay_for<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter_fraction <= 0.0 {
            return base;
        }
        let sample: f64 = rng.random_range(-1.0..=1.0);
        let delay = self.jittered(base, sample);
        debug!(attempt, ?base, ?delay, "RetryPolicy::delay_for: jittered");
        delay
    }
}
