//! Cryptographic utilities for webhook signature validation.
//!
//! The provider signs each status callback with HMAC-SHA1 over the fully
//! reconstructed request URL concatenated with the raw body, base64
//! encoded. Validation uses constant-time comparison so neither the
//! expected signature nor its length leaks through timing.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Result of signature validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Whether the signature is valid.
    pub is_valid: bool,
    /// Error message if validation failed.
    pub error_message: Option<String>,
}

impl ValidationResult {
    /// Creates a successful validation result.
    pub fn valid() -> Self {
        Self { is_valid: true, error_message: None }
    }

    /// Creates a failed validation result with error message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self { is_valid: false, error_message: Some(message.into()) }
    }
}

/// Signature validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Missing signature header.
    MissingSignature,
    /// Signature is not valid base64.
    InvalidEncoding,
    /// Signature verification failed.
    VerificationFailed,
    /// Invalid secret key.
    InvalidSecret,
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSignature => write!(f, "signature header missing"),
            Self::InvalidEncoding => write!(f, "signature is not valid base64"),
            Self::VerificationFailed => write!(f, "signature verification failed"),
            Self::InvalidSecret => write!(f, "invalid secret key"),
        }
    }
}

impl std::error::Error for SignatureError {}

/// Computes the expected callback signature for a URL and raw body.
///
/// HMAC-SHA1 over `url + body` with the shared secret, base64 encoded.
///
/// # Errors
///
/// Returns `SignatureError::InvalidSecret` if the secret key is rejected
/// by the MAC.
pub fn compute_signature(url: &str, body: &[u8], secret: &str) -> Result<String, SignatureError> {
    compute_signature_bytes(url, body, secret).map(|bytes| BASE64.encode(bytes))
}

/// Computes the raw HMAC-SHA1 bytes for a URL and body.
fn compute_signature_bytes(
    url: &str,
    body: &[u8],
    secret: &str,
) -> Result<[u8; 20], SignatureError> {
    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;

    mac.update(url.as_bytes());
    mac.update(body);

    Ok(mac.finalize().into_bytes().into())
}

/// Validates a callback signature against the reconstructed URL and raw
/// body.
///
/// Mismatched lengths and invalid base64 both yield a plain verification
/// failure; no internal state is surfaced.
pub fn validate_signature(
    url: &str,
    body: &[u8],
    signature: &str,
    secret: &str,
) -> ValidationResult {
    if signature.is_empty() {
        return ValidationResult::invalid("signature header is empty");
    }

    if secret.is_empty() {
        return ValidationResult::invalid("signing secret is empty");
    }

    let Ok(provided) = BASE64.decode(signature) else {
        return ValidationResult::invalid(SignatureError::InvalidEncoding.to_string());
    };

    let expected = match compute_signature_bytes(url, body, secret) {
        Ok(bytes) => bytes,
        Err(err) => return ValidationResult::invalid(err.to_string()),
    };

    if timing_safe_eq(&provided, &expected) {
        ValidationResult::valid()
    } else {
        ValidationResult::invalid("signature mismatch")
    }
}

/// Timing-safe byte comparison to prevent timing attacks.
///
/// Uses constant-time comparison to avoid leaking information about the
/// expected signature through timing analysis.
fn timing_safe_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (a_byte, b_byte) in a.iter().zip(b.iter()) {
        result |= a_byte ^ b_byte;
    }

    result == 0
}
