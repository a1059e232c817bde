//! Error types for SMS delivery operations.
//!
//! Defines all error conditions that can occur while sending messages
//! through the provider, including network failures, provider rejections,
//! rate limiting, and database operations. Errors include context for
//! debugging and proper categorization for retry decisions.

use std::fmt;

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Comprehensive error types for SMS delivery operations.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Provider credentials or sender configuration invalid.
    ///
    /// Detected before any network call; never retried.
    #[error("{message}")]
    Configuration {
        /// Description of the configuration problem
        message: String,
    },

    /// Request payload rejected by validation.
    #[error("{message}")]
    Validation {
        /// Provider error code, when one was reported
        code: Option<i64>,
        /// Human-readable validation failure
        message: String,
    },

    /// Provider rejected our credentials (HTTP 401/403).
    #[error("{message}")]
    Authentication {
        /// Description of the authentication failure
        message: String,
    },

    /// Provider rate limit hit (HTTP 429 or rate-limit error code).
    #[error("{message}")]
    RateLimited {
        /// Suggested wait before retrying, in milliseconds
        retry_after_ms: u64,
        /// Description from the provider
        message: String,
    },

    /// Network-level connectivity failure or timeout.
    #[error("{message}")]
    Network {
        /// Description of the network failure
        message: String,
    },

    /// Provider reported a server-side failure (HTTP 5xx).
    #[error("{message}")]
    ServiceUnavailable {
        /// HTTP status code (5xx)
        status_code: u16,
        /// Response body or status text
        message: String,
    },

    /// Unclassified failure; retried conservatively.
    #[error("{message}")]
    Unknown {
        /// Description of the failure
        message: String,
    },

    /// Recipient has not consented to receive messages.
    #[error("{message}")]
    Consent {
        /// Description of the consent failure
        message: String,
    },

    /// Database operation failed during delivery.
    #[error("database error: {message}")]
    Database {
        /// Database error message
        message: String,
    },

    /// Message persisted but the queue job was never created.
    #[error("queue error: {message}")]
    Queue {
        /// Queue error message
        message: String,
    },
}

impl ProviderError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Creates a validation error without a provider code.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { code: None, message: message.into() }
    }

    /// Creates a validation error carrying the provider's error code.
    pub fn validation_with_code(code: i64, message: impl Into<String>) -> Self {
        Self::Validation { code: Some(code), message: message.into() }
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication { message: message.into() }
    }

    /// Creates a rate limit error with retry guidance.
    pub fn rate_limited(retry_after_ms: u64, message: impl Into<String>) -> Self {
        Self::RateLimited { retry_after_ms, message: message.into() }
    }

    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a service unavailable error from an HTTP response.
    pub fn service_unavailable(status_code: u16, message: impl Into<String>) -> Self {
        Self::ServiceUnavailable { status_code, message: message.into() }
    }

    /// Creates an unknown error.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown { message: message.into() }
    }

    /// Creates a consent error.
    pub fn consent(message: impl Into<String>) -> Self {
        Self::Consent { message: message.into() }
    }

    /// Creates a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database { message: message.into() }
    }

    /// Creates a queue error.
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue { message: message.into() }
    }

    /// Determines if this error represents a temporary failure that should
    /// be retried.
    ///
    /// Returns `true` for rate limits, network failures, server errors
    /// (5xx), database hiccups, and unclassified failures. Returns `false`
    /// for configuration, validation, authentication, consent, and queue
    /// errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::Network { .. }
            | Self::ServiceUnavailable { .. }
            | Self::Unknown { .. }
            | Self::Database { .. } => true,

            Self::Configuration { .. }
            | Self::Validation { .. }
            | Self::Authentication { .. }
            | Self::Consent { .. }
            | Self::Queue { .. } => false,
        }
    }

    /// Returns the suggested retry delay in milliseconds for rate limits.
    ///
    /// `None` means standard exponential backoff applies.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms, .. } => Some(*retry_after_ms),
            _ => None,
        }
    }

    /// Returns the stable taxonomy code for this error class.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "CONFIG_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Authentication { .. } => "AUTHENTICATION",
            Self::RateLimited { .. } => "RATE_LIMIT",
            Self::Network { .. } => "NETWORK",
            Self::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            Self::Unknown { .. } => "UNKNOWN",
            Self::Consent { .. } => "CONSENT_ERROR",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Queue { .. } => "QUEUE_ERROR",
        }
    }

    /// Returns the provider error code, when one was reported.
    pub fn provider_code(&self) -> Option<i64> {
        match self {
            Self::Validation { code, .. } => *code,
            _ => None,
        }
    }

    /// Returns the same error class with a different message.
    ///
    /// Used by the processor to surface "Twilio API failed: ..." while
    /// keeping the classification intact for retry decisions.
    pub fn with_message(self, message: String) -> Self {
        match self {
            Self::Configuration { .. } => Self::Configuration { message },
            Self::Validation { code, .. } => Self::Validation { code, message },
            Self::Authentication { .. } => Self::Authentication { message },
            Self::RateLimited { retry_after_ms, .. } => Self::RateLimited { retry_after_ms, message },
            Self::Network { .. } => Self::Network { message },
            Self::ServiceUnavailable { status_code, .. } => {
                Self::ServiceUnavailable { status_code, message }
            },
            Self::Unknown { .. } => Self::Unknown { message },
            Self::Consent { .. } => Self::Consent { message },
            Self::Database { .. } => Self::Database { message },
            Self::Queue { .. } => Self::Queue { message },
        }
    }
}

impl From<courier_core::CoreError> for ProviderError {
    fn from(err: courier_core::CoreError) -> Self {
        Self::Database { message: err.to_string() }
    }
}

/// Category of delivery error for metrics and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Provider credentials or configuration.
    Configuration,
    /// Request payload problems.
    Validation,
    /// Rejected credentials.
    Authentication,
    /// Rate limiting.
    RateLimit,
    /// Network connectivity or timeout.
    Network,
    /// Provider server errors (5xx).
    ServiceUnavailable,
    /// Unclassified failures.
    Unknown,
    /// Consent preconditions.
    Consent,
    /// Database operations.
    Database,
    /// Queue scheduling.
    Queue,
}

impl From<&ProviderError> for ErrorCategory {
    fn from(error: &ProviderError) -> Self {
        match error {
            ProviderError::Configuration { .. } => Self::Configuration,
            ProviderError::Validation { .. } => Self::Validation,
            ProviderError::Authentication { .. } => Self::Authentication,
            ProviderError::RateLimited { .. } => Self::RateLimit,
            ProviderError::Network { .. } => Self::Network,
            ProviderError::ServiceUnavailable { .. } => Self::ServiceUnavailable,
            ProviderError::Unknown { .. } => Self::Unknown,
            ProviderError::Consent { .. } => Self::Consent,
            ProviderError::Database { .. } => Self::Database,
            ProviderError::Queue { .. } => Self::Queue,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Validation => write!(f, "validation"),
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Network => write!(f, "network"),
            Self::ServiceUnavailable => write!(f, "service_unavailable"),
            Self::Unknown => write!(f, "unknown"),
            Self::Consent => write!(f, "consent"),
            Self::Database => write!(f, "database"),
            Self::Queue => write!(f, "queue"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors_identified_correctly() {
        assert!(ProviderError::rate_limited(3000, "slow down").is_retryable());
        assert!(ProviderError::network("connection refused").is_retryable());
        assert!(ProviderError::service_unavailable(503, "unavailable").is_retryable());
        assert!(ProviderError::unknown("???").is_retryable());
        assert!(ProviderError::database("connection lost").is_retryable());

        assert!(!ProviderError::configuration("bad account sid").is_retryable());
        assert!(!ProviderError::validation("bad number").is_retryable());
        assert!(!ProviderError::authentication("bad token").is_retryable());
        assert!(!ProviderError::consent("opted out").is_retryable());
        assert!(!ProviderError::queue("enqueue failed").is_retryable());
    }

    #[test]
    fn rate_limit_retry_after_extracted() {
        let error = ProviderError::rate_limited(120_000, "rate limited");
        assert_eq!(error.retry_after_ms(), Some(120_000));

        let network_error = ProviderError::network("timed out");
        assert_eq!(network_error.retry_after_ms(), None);
    }

    #[test]
    fn error_categories_mapped_correctly() {
        assert_eq!(
            ErrorCategory::from(&ProviderError::network("test")),
            ErrorCategory::Network
        );
        assert_eq!(
            ErrorCategory::from(&ProviderError::validation_with_code(21211, "bad to")),
            ErrorCategory::Validation
        );
        assert_eq!(
            ErrorCategory::from(&ProviderError::rate_limited(3000, "429")),
            ErrorCategory::RateLimit
        );
        assert_eq!(
            ErrorCategory::from(&ProviderError::service_unavailable(500, "error")),
            ErrorCategory::ServiceUnavailable
        );
    }

    #[test]
    fn with_message_preserves_classification() {
        let error = ProviderError::rate_limited(3000, "Rate limit exceeded");
        let wrapped = error.with_message("Twilio API failed: Rate limit exceeded".to_string());

        assert!(wrapped.is_retryable());
        assert_eq!(wrapped.retry_after_ms(), Some(3000));
        assert_eq!(wrapped.to_string(), "Twilio API failed: Rate limit exceeded");
    }
}
