//! Error types and result handling for message pipeline operations.
//!
//! Defines a structured error taxonomy with codes for client
//! disambiguation. Covers validation, consent, provider, and
//! infrastructure failures across the delivery pipeline.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for internal operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Entity not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Constraint violation.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("requested entity not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::ConstraintViolation(format!("unique constraint violation: {}", db_err))
            },
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                Self::ConstraintViolation(format!("foreign key constraint violation: {}", db_err))
            },
            sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
                Self::ConstraintViolation(format!("check constraint violation: {}", db_err))
            },
            _ => Self::Database(err.to_string()),
        }
    }
}

/// Pipeline error taxonomy with stable codes.
///
/// The codes disambiguate failure classes for API clients and logs:
/// configuration and validation problems are detected before any side
/// effect and never retried; provider-transient classes retry with
/// backoff.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Provider credentials or sender number misconfigured.
    #[error("[CONFIG_ERROR] {0}")]
    Config(String),

    /// Job or webhook payload failed validation.
    #[error("[VALIDATION_ERROR] {0}")]
    Validation(String),

    /// Provider rejected our credentials.
    #[error("[AUTHENTICATION] {0}")]
    Authentication(String),

    /// Provider rate limit hit.
    #[error("[RATE_LIMIT] {0}")]
    RateLimit(String),

    /// Network-level failure reaching the provider.
    #[error("[NETWORK] {0}")]
    Network(String),

    /// Provider reported a server-side failure.
    #[error("[SERVICE_UNAVAILABLE] {0}")]
    ServiceUnavailable(String),

    /// Unclassified failure.
    #[error("[UNKNOWN] {0}")]
    Unknown(String),

    /// Recipient has not consented to receive messages.
    #[error("[CONSENT_ERROR] {0}")]
    Consent(String),

    /// Message persisted but the queue job was never created.
    ///
    /// Requires manual recovery; the message row exists with no worker
    /// scheduled to pick it up.
    #[error("[QUEUE_ERROR] {0}")]
    Queue(String),
}

impl CourierError {
    /// Returns the stable error code for this class.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Authentication(_) => "AUTHENTICATION",
            Self::RateLimit(_) => "RATE_LIMIT",
            Self::Network(_) => "NETWORK",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Unknown(_) => "UNKNOWN",
            Self::Consent(_) => "CONSENT_ERROR",
            Self::Queue(_) => "QUEUE_ERROR",
        }
    }

    /// Returns whether this error class should trigger a retry.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit(_) | Self::Network(_) | Self::ServiceUnavailable(_) | Self::Unknown(_)
        )
    }
}
