//! Exponential backoff retry policy with jitter.
//!
//! Implements the retry timing for failed sends. Delays grow as
//! `base x multiplier^(attempt-1)`, gain up to 10% random jitter to spread
//! load, and are capped at a configurable maximum.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry policy configuration for message delivery.
///
/// Defines how failed sends are retried at the queue level: maximum
/// attempts, backoff base, growth factor, jitter, and delay ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of delivery attempts (including the initial attempt).
    pub max_attempts: u32,

    /// Base delay for the first retry.
    pub base_delay: Duration,

    /// Maximum delay between retry attempts.
    pub max_delay: Duration,

    /// Growth factor applied per attempt.
    pub multiplier: f64,

    /// Jitter fraction (0.0 to 1.0) added on top of the computed delay.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Calculates the delay before the given attempt (1-based).
    ///
    /// `base x multiplier^(attempt-1)`, plus up to `jitter_factor` random
    /// jitter, capped at `max_delay`. Attempt numbers below 1 are clamped
    /// to 1.
    pub fn delay_for_attempt(&self, attempt_number: u32) -> Duration {
        let exponent = attempt_number.max(1).saturating_sub(1).min(20);
        let scaled = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent as i32);

        let jittered = apply_jitter(scaled, self.jitter_factor);
        let capped = jittered.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped as u64)
    }

    /// Whether another attempt is allowed after `attempt_number` failures.
    pub fn attempts_remaining(&self, attempt_number: u32) -> bool {
        attempt_number < self.max_attempts
    }
}

/// Adds up to `jitter_factor` of random positive jitter to a delay.
///
/// A 1000ms delay with 10% jitter lands in [1000, 1100). The jitter is
/// one-sided so the computed delay is always a lower bound.
fn apply_jitter(delay_ms: f64, jitter_factor: f64) -> f64 {
    if jitter_factor <= 0.0 {
        return delay_ms;
    }

    let clamped = jitter_factor.clamp(0.0, 1.0);
    let mut rng = rand::rng();
    let jitter = rng.random_range(0.0..clamped);

    delay_ms * (1.0 + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter_policy() -> RetryPolicy {
        RetryPolicy { jitter_factor: 0.0, ..Default::default() }
    }

    #[test]
    fn exponential_backoff_doubles_without_jitter() {
        let policy = no_jitter_policy();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(8000));
    }

    #[test]
    fn delay_capped_at_maximum() {
        let policy = no_jitter_policy();

        // Attempt 10 would be 512s uncapped.
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for_attempt(100), Duration::from_millis(30_000));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let policy = RetryPolicy::default();

        for _ in 0..50 {
            let delay = policy.delay_for_attempt(2).as_millis();
            assert!(delay >= 2000, "delay below base: {delay}ms");
            assert!(delay < 2200, "delay above jitter ceiling: {delay}ms");
        }
    }

    #[test]
    fn jitter_varies_delay() {
        let policy = RetryPolicy::default();
        let mut seen = std::collections::HashSet::new();

        for _ in 0..30 {
            seen.insert(policy.delay_for_attempt(3).as_millis());
        }

        assert!(seen.len() > 1, "jitter should create variation");
    }

    #[test]
    fn attempt_zero_clamped_to_one() {
        let policy = no_jitter_policy();
        assert_eq!(policy.delay_for_attempt(0), policy.delay_for_attempt(1));
    }

    #[test]
    fn attempts_remaining_respects_maximum() {
        let policy = RetryPolicy { max_attempts: 3, ..Default::default() };

        assert!(policy.attempts_remaining(1));
        assert!(policy.attempts_remaining(2));
        assert!(!policy.attempts_remaining(3));
        assert!(!policy.attempts_remaining(4));
    }
}
