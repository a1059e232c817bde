//! Provider API client for SMS submission.
//!
//! Wraps the Twilio REST messages API behind the [`ProviderClient`] trait.
//! Validates configuration before any network call, races requests against
//! a timeout, and normalizes failures through the response classifier.

use std::{future::Future, pin::Pin, time::Duration};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    classify::{classify, RawProviderError},
    error::{ProviderError, Result},
};

/// Default provider API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.twilio.com";

/// Default timeout for provider API calls.
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider account configuration for one send.
///
/// Validated before any network call: a validation failure short-circuits
/// with a configuration error and never reaches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwilioConfig {
    /// Account SID ("AC..." prefix).
    pub account_sid: String,
    /// API auth token.
    pub auth_token: String,
    /// Sender phone number in E.164 format.
    pub from_number: String,
    /// URL the provider posts delivery status callbacks to.
    pub status_callback_url: Option<String>,
    /// API base URL; overridable for tests.
    pub api_base: String,
    /// Timeout for a single API call.
    pub timeout: Duration,
    /// Maximum queue-level retries for messages sent with this config.
    pub max_retries: u32,
}

impl TwilioConfig {
    /// Creates a config with defaults for the optional fields.
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Self {
        Self {
            account_sid,
            auth_token,
            from_number,
            status_callback_url: None,
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: DEFAULT_API_TIMEOUT,
            max_retries: 3,
        }
    }

    /// Validates credentials, sender number, and numeric bounds.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Configuration` describing the first invalid
    /// field.
    pub fn validate(&self) -> Result<()> {
        if self.account_sid.is_empty() || !self.account_sid.starts_with("AC") {
            return Err(ProviderError::configuration(
                "Twilio account SID must be present and start with 'AC'",
            ));
        }

        if self.auth_token.is_empty() {
            return Err(ProviderError::configuration("Twilio auth token is required"));
        }

        if !is_e164(&self.from_number) {
            return Err(ProviderError::configuration(format!(
                "sender number must be in E.164 format, got '{}'",
                self.from_number
            )));
        }

        let timeout_secs = self.timeout.as_secs();
        if !(1..=600).contains(&timeout_secs) {
            return Err(ProviderError::configuration(format!(
                "API timeout must be between 1s and 600s, got {timeout_secs}s"
            )));
        }

        if self.max_retries > 10 {
            return Err(ProviderError::configuration(format!(
                "max retries must be at most 10, got {}",
                self.max_retries
            )));
        }

        Ok(())
    }
}

/// Checks E.164 format: '+', a non-zero leading digit, at most 15 digits.
pub fn is_e164(number: &str) -> bool {
    let Some(digits) = number.strip_prefix('+') else {
        return false;
    };

    if digits.is_empty() || digits.len() > 15 {
        return false;
    }

    digits.chars().all(|c| c.is_ascii_digit()) && !digits.starts_with('0')
}

/// Outbound message payload for one provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessage {
    /// Recipient phone number (E.164).
    pub to: String,
    /// Message body text.
    pub body: String,
}

/// Normalized successful provider response.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// Provider message SID.
    pub external_id: String,
    /// Provider-reported message status ("queued", "sent", ...).
    pub status: String,
    /// Full response body for diagnostics.
    pub raw_response: Value,
}

/// Capability of sending SMS through an external provider.
///
/// Abstracting the provider behind a trait keeps the processor and worker
/// testable without network access; tests use the mock in
/// [`mock::MockProviderClient`].
pub trait ProviderClient: Send + Sync + 'static {
    /// Submits one SMS to the provider.
    ///
    /// Stateless per call; the only side effect is the outbound network
    /// request.
    fn send_sms(
        &self,
        message: SendMessage,
        config: TwilioConfig,
    ) -> Pin<Box<dyn Future<Output = Result<SendOutcome>> + Send + '_>>;

    /// Fetches the provider's current status for a previously sent message.
    fn get_message_status(
        &self,
        external_id: String,
        config: TwilioConfig,
    ) -> Pin<Box<dyn Future<Output = Result<SendOutcome>> + Send + '_>>;
}

/// Production provider client over HTTPS.
#[derive(Debug, Clone)]
pub struct TwilioClient {
    http: reqwest::Client,
}

impl TwilioClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Configuration` if the HTTP client cannot be
    /// constructed.
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("Courier/1.0")
            .build()
            .map_err(|e| ProviderError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http })
    }

    async fn send_sms_inner(
        &self,
        message: SendMessage,
        config: TwilioConfig,
    ) -> Result<SendOutcome> {
        config.validate()?;

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            config.api_base.trim_end_matches('/'),
            config.account_sid
        );

        debug!(to = %message.to, "submitting message to provider");

        let mut params = vec![
            ("To", message.to.clone()),
            ("From", config.from_number.clone()),
            ("Body", message.body.clone()),
        ];
        if let Some(callback) = &config.status_callback_url {
            params.push(("StatusCallback", callback.clone()));
        }

        let request = self
            .http
            .post(&url)
            .basic_auth(&config.account_sid, Some(&config.auth_token))
            .form(&params)
            .send();

        let response = match tokio::time::timeout(config.timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(transport_error(&e)),
            Err(_) => {
                warn!(timeout_secs = config.timeout.as_secs(), "provider request timed out");
                return Err(ProviderError::network(format!(
                    "provider request timed out after {}s",
                    config.timeout.as_secs()
                )));
            },
        };

        Self::parse_response(response).await
    }

    async fn get_message_status_inner(
        &self,
        external_id: String,
        config: TwilioConfig,
    ) -> Result<SendOutcome> {
        config.validate()?;

        if external_id.is_empty() {
            return Err(ProviderError::validation("External ID is required"));
        }

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages/{}.json",
            config.api_base.trim_end_matches('/'),
            config.account_sid,
            external_id
        );

        let request = self
            .http
            .get(&url)
            .basic_auth(&config.account_sid, Some(&config.auth_token))
            .send();

        let response = match tokio::time::timeout(config.timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(transport_error(&e)),
            Err(_) => {
                return Err(ProviderError::network(format!(
                    "provider request timed out after {}s",
                    config.timeout.as_secs()
                )));
            },
        };

        Self::parse_response(response).await
    }

    /// Converts a provider HTTP response into an outcome or a classified
    /// error.
    async fn parse_response(response: reqwest::Response) -> Result<SendOutcome> {
        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned);

        let body: Value = response.json().await.unwrap_or(Value::Null);

        if status.is_success() {
            let external_id = body
                .get("sid")
                .and_then(Value::as_str)
                .ok_or_else(|| ProviderError::unknown("provider response missing message sid"))?
                .to_string();
            let provider_status =
                body.get("status").and_then(Value::as_str).unwrap_or("queued").to_string();

            info!(external_id = %external_id, status = %provider_status, "provider accepted message");

            return Ok(SendOutcome { external_id, status: provider_status, raw_response: body });
        }

        let raw = RawProviderError {
            status_code: Some(status.as_u16()),
            error_code: body.get("code").and_then(Value::as_i64),
            message: body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("provider request failed"))
                .to_string(),
            retry_after,
        };

        warn!(
            status = status.as_u16(),
            provider_code = ?raw.error_code,
            "provider rejected message"
        );

        Err(classify(&raw))
    }
}

/// Classifies a reqwest transport error.
fn transport_error(error: &reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        return ProviderError::network("provider request timed out".to_string());
    }
    if error.is_connect() {
        return ProviderError::network(format!("connection failed: {error}"));
    }

    classify(&RawProviderError { message: error.to_string(), ..Default::default() })
}

impl ProviderClient for TwilioClient {
    fn send_sms(
        &self,
        message: SendMessage,
        config: TwilioConfig,
    ) -> Pin<Box<dyn Future<Output = Result<SendOutcome>> + Send + '_>> {
        Box::pin(self.send_sms_inner(message, config))
    }

    fn get_message_status(
        &self,
        external_id: String,
        config: TwilioConfig,
    ) -> Pin<Box<dyn Future<Output = Result<SendOutcome>> + Send + '_>> {
        Box::pin(self.get_message_status_inner(external_id, config))
    }
}

pub mod mock {
    //! Mock provider client for testing.
    //!
    //! Returns scripted outcomes in order and records every call for
    //! verification, so processor and worker logic can be exercised without
    //! network access.

    use std::{collections::VecDeque, future::Future, pin::Pin, sync::Arc};

    use tokio::sync::Mutex;

    use super::{ProviderClient, SendMessage, SendOutcome, TwilioConfig};
    use crate::error::{ProviderError, Result};

    /// Scriptable in-memory provider client.
    pub struct MockProviderClient {
        outcomes: Arc<Mutex<VecDeque<Result<SendOutcome>>>>,
        calls: Arc<Mutex<Vec<SendMessage>>>,
    }

    impl MockProviderClient {
        /// Creates a mock with no scripted outcomes.
        pub fn new() -> Self {
            Self {
                outcomes: Arc::new(Mutex::new(VecDeque::new())),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Scripts the next send outcome.
        pub async fn push_outcome(&self, outcome: Result<SendOutcome>) {
            self.outcomes.lock().await.push_back(outcome);
        }

        /// Scripts a successful send with the given SID.
        pub async fn push_success(&self, external_id: &str) {
            self.push_outcome(Ok(SendOutcome {
                external_id: external_id.to_string(),
                status: "queued".to_string(),
                raw_response: serde_json::json!({ "sid": external_id, "status": "queued" }),
            }))
            .await;
        }

        /// Returns every message passed to `send_sms`, in order.
        pub async fn recorded_calls(&self) -> Vec<SendMessage> {
            self.calls.lock().await.clone()
        }
    }

    impl Default for MockProviderClient {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ProviderClient for MockProviderClient {
        fn send_sms(
            &self,
            message: SendMessage,
            _config: TwilioConfig,
        ) -> Pin<Box<dyn Future<Output = Result<SendOutcome>> + Send + '_>> {
            let outcomes = self.outcomes.clone();
            let calls = self.calls.clone();

            Box::pin(async move {
                calls.lock().await.push(message);
                outcomes
                    .lock()
                    .await
                    .pop_front()
                    .unwrap_or_else(|| Err(ProviderError::unknown("no scripted outcome")))
            })
        }

        fn get_message_status(
            &self,
            external_id: String,
            _config: TwilioConfig,
        ) -> Pin<Box<dyn Future<Output = Result<SendOutcome>> + Send + '_>> {
            Box::pin(async move {
                Ok(SendOutcome {
                    external_id,
                    status: "sent".to_string(),
                    raw_response: serde_json::Value::Null,
                })
            })
        }
    }
}
