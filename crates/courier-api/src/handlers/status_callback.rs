//! Delivery status webhook handler.
//!
//! Receives provider status callbacks, validates their signature and
//! shape, and routes accepted updates through the status updater. The
//! provider retries callbacks and may deliver them more than once or out
//! of order; duplicate suppression here plus the status updater's own
//! idempotency check make repeated deliveries safe no-ops.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use courier_core::models::{CallbackStatus, DeliveryStatus, MessageStatus};
use courier_core::CourierError;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::{crypto::validate_signature, server::ApiState};

/// Path the provider posts callbacks to, appended to the public URL when
/// reconstructing the signed request URL.
pub const STATUS_CALLBACK_PATH: &str = "/webhooks/twilio/status";

/// Raw form payload of a provider status callback.
///
/// The status arrives under either of two field-name variants depending on
/// the provider API version.
#[derive(Debug, Deserialize)]
pub struct StatusCallbackForm {
    /// Provider message SID.
    #[serde(rename = "MessageSid")]
    pub message_sid: Option<String>,
    /// Status under the current field name.
    #[serde(rename = "MessageStatus")]
    pub message_status: Option<String>,
    /// Status under the legacy field name.
    #[serde(rename = "SmsStatus")]
    pub sms_status: Option<String>,
    /// Recipient number.
    #[serde(rename = "To")]
    pub to: Option<String>,
    /// Sender number.
    #[serde(rename = "From")]
    pub from: Option<String>,
    /// Provider error code for failure callbacks.
    #[serde(rename = "ErrorCode")]
    pub error_code: Option<String>,
    /// Provider error description for failure callbacks.
    #[serde(rename = "ErrorMessage")]
    pub error_message: Option<String>,
}

/// A validated status callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCallback {
    /// Provider message SID.
    pub message_sid: String,
    /// Raw provider status string.
    pub status: String,
    /// Recipient number.
    pub to: String,
    /// Sender number.
    pub from: String,
    /// Provider error code, when the callback signals a failure.
    pub error_code: Option<String>,
    /// Provider error description.
    pub error_message: Option<String>,
}

/// Parses and validates the callback payload shape.
///
/// # Errors
///
/// Returns a description of the first missing or malformed field.
pub fn parse_status_callback(body: &[u8]) -> Result<StatusCallback, String> {
    let form: StatusCallbackForm = serde_urlencoded::from_bytes(body)
        .map_err(|e| format!("malformed form payload: {e}"))?;

    let message_sid = form
        .message_sid
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "MessageSid is required".to_string())?;

    let status = form
        .message_status
        .or(form.sms_status)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "MessageStatus or SmsStatus is required".to_string())?;

    let to = form.to.filter(|s| !s.is_empty()).ok_or_else(|| "To is required".to_string())?;
    let from = form.from.filter(|s| !s.is_empty()).ok_or_else(|| "From is required".to_string())?;

    Ok(StatusCallback {
        message_sid,
        status: status.to_lowercase(),
        to,
        from,
        error_code: form.error_code.filter(|s| !s.is_empty()),
        error_message: form.error_message.filter(|s| !s.is_empty()),
    })
}

/// Whether a provider status is in the terminal/near-terminal set the
/// handler acts on. Early "queued"/"sending" callbacks are discarded.
pub fn is_delivery_status(status: &str) -> bool {
    matches!(status, "sent" | "delivered" | "undelivered" | "failed" | "received")
}

/// Fixed provider-vocabulary mapping to internal statuses.
///
/// Returns the delivery-level and message-level targets. "received" is the
/// inbound confirmation and maps to delivered.
pub fn map_provider_status(status: &str) -> Option<(DeliveryStatus, MessageStatus)> {
    match status {
        "queued" | "sending" => Some((DeliveryStatus::Pending, MessageStatus::Sending)),
        "sent" => Some((DeliveryStatus::Sent, MessageStatus::Sent)),
        "delivered" => Some((DeliveryStatus::Delivered, MessageStatus::Delivered)),
        "undelivered" | "failed" => Some((DeliveryStatus::Failed, MessageStatus::Failed)),
        "received" => Some((DeliveryStatus::Delivered, MessageStatus::Delivered)),
        _ => None,
    }
}

/// Response for an applied or suppressed status update.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackResponse {
    /// Whether any state was written.
    pub status_updated: bool,
    /// Local delivery record ID.
    pub delivery_id: String,
    /// The delivery status after this callback.
    pub new_status: String,
}

/// Response for callbacks outside the delivery status set.
#[derive(Debug, Serialize)]
pub struct IgnoredResponse {
    /// Why the callback was ignored.
    pub message: String,
}

/// Error response with code and message.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details including code and message.
    pub error: ErrorDetail,
}

/// Detailed error information.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Stable error code.
    pub code: String,
    /// Human-readable error description.
    pub message: String,
}

fn error_response(status: StatusCode, error: &CourierError) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: ErrorDetail { code: error.code().to_string(), message: error.to_string() },
        }),
    )
        .into_response()
}

/// Handles a provider delivery-status callback.
///
/// Signature validation happens before any payload parsing; payload
/// validation before any state read; and the delivery lookup, duplicate
/// suppression, and status write share one transaction that rolls back on
/// any failure.
#[instrument(name = "delivery_status_callback", skip(state, headers, body))]
pub async fn delivery_status_callback(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // 1. Signature: reject before touching the payload.
    let Some(secret) = state.webhook_secret.as_deref() else {
        warn!("status callback received but no webhook secret is configured");
        return error_response(
            StatusCode::UNAUTHORIZED,
            &CourierError::Authentication(
                "webhook signature validation is not configured".to_string(),
            ),
        );
    };

    let Some(signature) = headers.get("x-twilio-signature").and_then(|v| v.to_str().ok()) else {
        warn!("status callback missing signature header");
        return error_response(
            StatusCode::UNAUTHORIZED,
            &CourierError::Authentication("missing webhook signature".to_string()),
        );
    };

    let url = format!("{}{}", state.public_url.trim_end_matches('/'), STATUS_CALLBACK_PATH);
    let validation = validate_signature(&url, &body, signature, secret);
    if !validation.is_valid {
        warn!(
            reason = validation.error_message.as_deref().unwrap_or("unknown"),
            "status callback signature rejected"
        );
        return error_response(
            StatusCode::UNAUTHORIZED,
            &CourierError::Authentication("invalid webhook signature".to_string()),
        );
    }

    // 2. Payload shape.
    let callback = match parse_status_callback(&body) {
        Ok(callback) => callback,
        Err(reason) => {
            warn!(reason = %reason, "status callback payload rejected");
            return error_response(StatusCode::BAD_REQUEST, &CourierError::Validation(reason));
        },
    };

    // 3. Discard early lifecycle callbacks.
    if !is_delivery_status(&callback.status) {
        debug!(status = %callback.status, "ignoring non-delivery status callback");
        return (
            StatusCode::OK,
            Json(IgnoredResponse {
                message: "Webhook ignored - not a delivery status".to_string(),
            }),
        )
            .into_response();
    }

    // 4. Vocabulary mapping; total over the delivery status set.
    let Some((delivery_status, message_status)) = map_provider_status(&callback.status) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            &CourierError::Validation(format!("unsupported status: {}", callback.status)),
        );
    };

    match apply_callback(&state, &callback, delivery_status, message_status).await {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, message_sid = %callback.message_sid, "status callback failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &CourierError::Unknown("failed to process status callback".to_string()),
            )
        },
    }
}

/// Steps 5-7: lookup, duplicate suppression, and the status write, all in
/// one transaction.
async fn apply_callback(
    state: &ApiState,
    callback: &StatusCallback,
    delivery_status: DeliveryStatus,
    message_status: MessageStatus,
) -> courier_core::Result<Response> {
    let mut tx = state.storage.messages.pool().begin().await?;

    // 5. Correlate by provider SID.
    let Some(delivery) = state
        .storage
        .deliveries
        .find_by_external_delivery_id_in_tx(&mut tx, &callback.message_sid)
        .await?
    else {
        // Nothing to roll back; no writes have happened.
        return Ok(error_response(
            StatusCode::BAD_REQUEST,
            &CourierError::Validation(format!(
                "unknown delivery for MessageSid {}",
                callback.message_sid
            )),
        ));
    };

    // 6. Duplicate suppression: the provider redelivers callbacks, so a
    // repeat of the current status is acknowledged without writes.
    if delivery.status == delivery_status {
        debug!(
            delivery_id = %delivery.id,
            status = %delivery_status,
            "duplicate status callback suppressed"
        );
        tx.commit().await?;
        return Ok((
            StatusCode::OK,
            Json(CallbackResponse {
                status_updated: false,
                delivery_id: delivery.id.to_string(),
                new_status: delivery_status.to_string(),
            }),
        )
            .into_response());
    }

    // 7. Route the transition through the status updater so both pipeline
    // paths share one write authority.
    if callback.status == "failed" || callback.status == "undelivered" {
        let code = callback.error_code.clone().unwrap_or_else(|| "DELIVERY_FAILED".to_string());
        let message = callback
            .error_message
            .clone()
            .unwrap_or_else(|| format!("provider reported status '{}'", callback.status));

        state
            .updater
            .update_with_error_in_tx(&mut tx, delivery.message_id, message_status, &code, &message)
            .await?;
    } else {
        state
            .updater
            .update_with_external_id_in_tx(
                &mut tx,
                delivery.message_id,
                message_status,
                &callback.message_sid,
            )
            .await?;
    }

    state
        .storage
        .deliveries
        .update_callback_status_in_tx(&mut tx, delivery.id, CallbackStatus::Completed)
        .await?;

    tx.commit().await?;

    info!(
        delivery_id = %delivery.id,
        message_id = %delivery.message_id,
        new_status = %delivery_status,
        "delivery status updated from callback"
    );

    Ok((
        StatusCode::OK,
        Json(CallbackResponse {
            status_updated: true,
            delivery_id: delivery.id.to_string(),
            new_status: delivery_status.to_string(),
        }),
    )
        .into_response())
}
