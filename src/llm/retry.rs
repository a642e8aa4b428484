//! Exponential backoff with jitter for transport retries.

use rand::RngExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default maximum transport attempts per invoke.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry, in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Default cap on a single backoff delay, in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Retry ceiling and backoff shape for retryable transport failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Relative jitter in `[0.0, 1.0]`; each delay is scaled by a random
    /// factor in `[1 - jitter, 1 + jitter]` before the cap is applied.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Backoff before retry number `retry` (1 for the first retry), without
    /// jitter and capped at `max_delay`.
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(63) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Backoff before retry number `retry` with jitter applied.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let nominal = self.nominal_delay(retry).as_millis() as f64;
        if self.jitter <= 0.0 || nominal <= 0.0 {
            return Duration::from_millis(nominal as u64);
        }
        let mut rng = rand::rng();
        let factor = rng.random_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        let jittered = (nominal * factor).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(jittered.max(0.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_nominal_delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy::default().with_max_delay(Duration::from_millis(5000));
        assert_eq!(policy.nominal_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.nominal_delay(2), Duration::from_millis(2000));
        assert_eq!(policy.nominal_delay(3), Duration::from_millis(4000));
        assert_eq!(policy.nominal_delay(4), Duration::from_millis(5000));
        assert_eq!(policy.nominal_delay(60), Duration::from_millis(5000));
    }

    #[test]
    fn test_jittered_delay_stays_in_bounds() {
        let policy = RetryPolicy::default().with_jitter(0.5);
        for _ in 0..200 {
            let delay = policy.delay_for(2).as_millis();
            assert!((1000..=3000).contains(&delay), "delay {delay} out of bounds");
        }
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let policy = RetryPolicy::default().with_jitter(0.0);
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_max_attempts_floor() {
        assert_eq!(RetryPolicy::default().with_max_attempts(0).max_attempts, 1);
        assert_eq!(RetryPolicy::no_retry().max_attempts, 1);
    }
}
