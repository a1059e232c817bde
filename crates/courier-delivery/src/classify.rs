//! Classification of raw provider failures into typed error categories.
//!
//! The ordering of the rules matters: a 429 carrying a validation-looking
//! provider code is still rate limiting, because the condition is
//! transient. Authentication outranks everything since retrying with the
//! same credentials can never succeed.

use std::time::Duration;

use crate::{error::ProviderError, retry::RetryPolicy};

/// Fixed fallback delay for rate limits without a Retry-After header.
pub const RATE_LIMIT_FALLBACK_DELAY_MS: u64 = 3000;

/// Initial delay for network and unclassified failures.
pub const INITIAL_RETRY_DELAY_MS: u64 = 1000;

/// Default maximum retry attempts at the queue level.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Twilio error codes that signal rate limiting.
const RATE_LIMIT_CODES: &[i64] = &[20429, 14107];

/// Twilio validation error codes with human-readable messages.
const VALIDATION_CODE_MESSAGES: &[(i64, &str)] = &[
    (21211, "Invalid recipient phone number"),
    (21212, "Invalid sender phone number"),
    (21408, "Permission to send an SMS has not been enabled for the region"),
    (21610, "Recipient has opted out of messages from this sender"),
    (21617, "Message body exceeds the maximum length"),
];

/// Raw failure details extracted from a provider response or transport
/// error, before classification.
#[derive(Debug, Clone, Default)]
pub struct RawProviderError {
    /// HTTP status code, when a response was received.
    pub status_code: Option<u16>,
    /// Provider error code from the response body.
    pub error_code: Option<i64>,
    /// Error message text.
    pub message: String,
    /// Raw `Retry-After` header value, when present.
    pub retry_after: Option<String>,
}

/// Maps a raw provider failure to a typed, retry-aware error.
///
/// Rules are evaluated in priority order:
/// 1. HTTP 401/403: authentication, never retried.
/// 2. HTTP 429 or a known rate-limit code: rate limit, retried after the
///    `Retry-After` hint (seconds) or a 3s fallback.
/// 3. HTTP 400 or a known validation code: validation, never retried; the
///    message is mapped per known code, falling back to the raw text.
/// 4. Socket-level failures (reset/refused) or any mention of a timeout:
///    network, retried with the initial delay.
/// 5. HTTP 5xx: service unavailable, retried.
/// 6. Anything else: unknown, retried conservatively.
pub fn classify(raw: &RawProviderError) -> ProviderError {
    if matches!(raw.status_code, Some(401 | 403)) {
        return ProviderError::authentication(fallback_message(raw, "authentication failed"));
    }

    let is_rate_limit_code = raw.error_code.is_some_and(|c| RATE_LIMIT_CODES.contains(&c));
    if raw.status_code == Some(429) || is_rate_limit_code {
        let retry_after_ms = raw
            .retry_after
            .as_deref()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| secs * 1000)
            .unwrap_or(RATE_LIMIT_FALLBACK_DELAY_MS);
        return ProviderError::rate_limited(
            retry_after_ms,
            fallback_message(raw, "rate limit exceeded"),
        );
    }

    let known_validation =
        raw.error_code.and_then(|c| {
            VALIDATION_CODE_MESSAGES.iter().find(|(code, _)| *code == c).map(|(_, msg)| (c, *msg))
        });
    if raw.status_code == Some(400) || known_validation.is_some() {
        return match known_validation {
            Some((code, mapped)) => ProviderError::validation_with_code(code, mapped),
            None => ProviderError::validation(fallback_message(raw, "request validation failed")),
        };
    }

    if is_network_failure(&raw.message) {
        return ProviderError::network(fallback_message(raw, "network failure"));
    }

    if matches!(raw.status_code, Some(code) if (500..=599).contains(&code)) {
        return ProviderError::service_unavailable(
            raw.status_code.unwrap_or(500),
            fallback_message(raw, "provider unavailable"),
        );
    }

    ProviderError::unknown(fallback_message(raw, "unclassified provider error"))
}

/// Whether an error message describes a socket-level failure.
fn is_network_failure(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("timeout")
        || lowered.contains("timed out")
        || lowered.contains("connection reset")
        || lowered.contains("connection refused")
        || lowered.contains("econnreset")
        || lowered.contains("econnrefused")
        || lowered.contains("etimedout")
}

fn fallback_message(raw: &RawProviderError, default: &str) -> String {
    if raw.message.is_empty() {
        default.to_string()
    } else {
        raw.message.clone()
    }
}

/// Whether a failed attempt should be retried.
///
/// False once `attempt_number` exceeds the maximum or the error class is
/// not retryable.
pub fn should_retry(error: &ProviderError, attempt_number: u32, max_retries: u32) -> bool {
    if attempt_number > max_retries {
        return false;
    }

    error.is_retryable()
}

/// Calculates the exponential backoff delay for a retry attempt.
///
/// `base x 2^(attempt-1)` with up to 10% jitter, capped at 30s. `base`
/// defaults to 1s when not given.
pub fn calculate_retry_delay(attempt_number: u32, base_delay: Option<Duration>) -> Duration {
    let policy = RetryPolicy {
        base_delay: base_delay.unwrap_or(Duration::from_millis(INITIAL_RETRY_DELAY_MS)),
        ..Default::default()
    };

    policy.delay_for_attempt(attempt_number)
}

/// Suggested delay before retrying a classified error.
///
/// Rate limits carry their own hint; network and unknown failures use the
/// initial delay; provider outages wait twice as long. Non-retryable
/// classes return `None`.
pub fn retry_delay_hint(error: &ProviderError) -> Option<Duration> {
    match error {
        ProviderError::RateLimited { retry_after_ms, .. } => {
            Some(Duration::from_millis(*retry_after_ms))
        },
        ProviderError::Network { .. } | ProviderError::Unknown { .. } => {
            Some(Duration::from_millis(INITIAL_RETRY_DELAY_MS))
        },
        ProviderError::ServiceUnavailable { .. } => {
            Some(Duration::from_millis(2 * INITIAL_RETRY_DELAY_MS))
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    fn raw(status_code: Option<u16>, message: &str) -> RawProviderError {
        RawProviderError { status_code, message: message.to_string(), ..Default::default() }
    }

    #[test]
    fn auth_statuses_never_retryable() {
        for status in [401, 403] {
            let error = classify(&raw(Some(status), "unauthorized"));
            assert_eq!(ErrorCategory::from(&error), ErrorCategory::Authentication);
            assert!(!error.is_retryable());
        }
    }

    #[test]
    fn rate_limit_outranks_validation_code() {
        // A 429 with a validation-looking code is transient, not a payload
        // problem.
        let error = classify(&RawProviderError {
            status_code: Some(429),
            error_code: Some(21211),
            message: "Rate limit exceeded".to_string(),
            retry_after: None,
        });

        assert_eq!(ErrorCategory::from(&error), ErrorCategory::RateLimit);
        assert!(error.is_retryable());
        assert_eq!(error.retry_after_ms(), Some(RATE_LIMIT_FALLBACK_DELAY_MS));
    }

    #[test]
    fn retry_after_header_converted_to_millis() {
        let error = classify(&RawProviderError {
            status_code: Some(429),
            error_code: None,
            message: "Too Many Requests".to_string(),
            retry_after: Some("120".to_string()),
        });

        assert_eq!(error.retry_after_ms(), Some(120_000));
    }

    #[test]
    fn known_validation_code_mapped_to_readable_message() {
        let error = classify(&RawProviderError {
            status_code: Some(400),
            error_code: Some(21211),
            message: "The 'To' number is not a valid phone number.".to_string(),
            retry_after: None,
        });

        assert_eq!(error.to_string(), "Invalid recipient phone number");
        assert_eq!(error.provider_code(), Some(21211));
        assert!(!error.is_retryable());
    }

    #[test]
    fn unknown_validation_falls_back_to_raw_message() {
        let error = classify(&raw(Some(400), "Strange payload"));
        assert_eq!(error.to_string(), "Strange payload");
        assert!(!error.is_retryable());
    }

    #[test]
    fn timeout_text_classified_as_network() {
        let error = classify(&raw(None, "request timed out"));
        assert_eq!(ErrorCategory::from(&error), ErrorCategory::Network);
        assert!(error.is_retryable());
    }

    #[test]
    fn socket_errors_classified_as_network() {
        for message in ["ECONNRESET", "connection refused", "ETIMEDOUT"] {
            let error = classify(&raw(None, message));
            assert_eq!(ErrorCategory::from(&error), ErrorCategory::Network, "{message}");
        }
    }

    #[test]
    fn server_errors_retryable() {
        for status in [500, 502, 503, 599] {
            let error = classify(&raw(Some(status), "server error"));
            assert_eq!(ErrorCategory::from(&error), ErrorCategory::ServiceUnavailable);
            assert!(error.is_retryable());
        }
    }

    #[test]
    fn anything_else_is_unknown_and_retryable() {
        let error = classify(&raw(Some(418), "I'm a teapot"));
        assert_eq!(ErrorCategory::from(&error), ErrorCategory::Unknown);
        assert!(error.is_retryable());
    }

    #[test]
    fn should_retry_respects_attempt_cap() {
        let error = ProviderError::network("timed out");

        assert!(should_retry(&error, 1, DEFAULT_MAX_RETRIES));
        assert!(should_retry(&error, 3, DEFAULT_MAX_RETRIES));
        assert!(!should_retry(&error, 4, DEFAULT_MAX_RETRIES));
    }

    #[test]
    fn should_retry_rejects_non_retryable() {
        let error = ProviderError::validation("bad number");
        assert!(!should_retry(&error, 1, DEFAULT_MAX_RETRIES));
    }

    #[test]
    fn retry_delay_bounds() {
        // base 1000ms, multiplier 2, <= 10% jitter
        let first = calculate_retry_delay(1, None).as_millis();
        assert!((1000..1500).contains(&first), "attempt 1: {first}ms");

        let second = calculate_retry_delay(2, None).as_millis();
        assert!((2000..3000).contains(&second), "attempt 2: {second}ms");

        let third = calculate_retry_delay(3, None).as_millis();
        assert!((4000..6000).contains(&third), "attempt 3: {third}ms");
    }

    #[test]
    fn retry_delay_capped_for_large_attempts() {
        let delay = calculate_retry_delay(30, None);
        assert_eq!(delay.as_millis(), 30_000);
    }

    #[test]
    fn delay_hints_per_category() {
        assert_eq!(
            retry_delay_hint(&ProviderError::rate_limited(5000, "slow down")),
            Some(Duration::from_millis(5000))
        );
        assert_eq!(
            retry_delay_hint(&ProviderError::network("timed out")),
            Some(Duration::from_millis(INITIAL_RETRY_DELAY_MS))
        );
        assert_eq!(
            retry_delay_hint(&ProviderError::service_unavailable(503, "down")),
            Some(Duration::from_millis(2 * INITIAL_RETRY_DELAY_MS))
        );
        assert_eq!(retry_delay_hint(&ProviderError::validation("bad")), None);
    }
}
