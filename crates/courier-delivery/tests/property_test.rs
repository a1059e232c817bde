//! Property-based tests for retry timing and classification invariants.

use std::time::Duration;

use courier_delivery::classify::{calculate_retry_delay, classify, should_retry, RawProviderError};
use courier_delivery::{ErrorCategory, ProviderError, RetryPolicy};
use proptest::prelude::*;

proptest! {
    #[test]
    fn retry_delay_never_below_exponential_floor(attempt in 1u32..=10) {
        let floor = 1000u128.saturating_mul(2u128.pow(attempt - 1)).min(30_000);
        let delay = calculate_retry_delay(attempt, None).as_millis();

        prop_assert!(delay >= floor.min(30_000));
        prop_assert!(delay <= 30_000);
    }

    #[test]
    fn retry_delay_jitter_bounded_by_ten_percent(
        attempt in 1u32..=5,
        base_ms in 100u64..=2000,
    ) {
        let delay = calculate_retry_delay(attempt, Some(Duration::from_millis(base_ms)));
        let floor = (base_ms as f64) * 2f64.powi(attempt as i32 - 1);
        let ceiling = (floor * 1.1).min(30_000.0);

        let millis = delay.as_millis() as f64;
        prop_assert!(millis >= floor.min(30_000.0) - 1.0, "delay {millis} below floor {floor}");
        prop_assert!(millis <= ceiling + 1.0, "delay {millis} above ceiling {ceiling}");
    }

    #[test]
    fn server_status_range_always_service_unavailable(status in 500u16..=599) {
        let error = classify(&RawProviderError {
            status_code: Some(status),
            message: "server error".to_string(),
            ..Default::default()
        });

        prop_assert_eq!(ErrorCategory::from(&error), ErrorCategory::ServiceUnavailable);
        prop_assert!(error.is_retryable());
    }

    #[test]
    fn unmapped_statuses_default_to_retryable_unknown(status in 300u16..=399) {
        let error = classify(&RawProviderError {
            status_code: Some(status),
            message: "odd response".to_string(),
            ..Default::default()
        });

        prop_assert_eq!(ErrorCategory::from(&error), ErrorCategory::Unknown);
        prop_assert!(error.is_retryable());
    }

    #[test]
    fn should_retry_is_monotone_in_attempts(attempt in 1u32..=20, max in 1u32..=10) {
        let error = ProviderError::network("timed out");
        // Once an attempt count is refused, every later count is refused.
        if !should_retry(&error, attempt, max) {
            prop_assert!(!should_retry(&error, attempt + 1, max));
        }
    }

    #[test]
    fn custom_policy_cap_always_respected(
        attempt in 1u32..=30,
        cap_ms in 1000u64..=60_000,
    ) {
        let policy = RetryPolicy {
            max_delay: Duration::from_millis(cap_ms),
            ..Default::default()
        };

        prop_assert!(policy.delay_for_attempt(attempt) <= Duration::from_millis(cap_ms));
    }
}
