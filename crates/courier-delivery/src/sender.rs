//! Consent-gated enqueueing of outbound messages.
//!
//! Sends enter the pipeline here: the recipient's consent is a hard
//! precondition, checked before the message row is created. Once the row
//! exists in `Queued` status the delivery workers pick it up; there is no
//! separate job to create, so a persisted message is always schedulable.

use std::sync::Arc;

use chrono::Utc;
use courier_core::{
    models::{MessageId, WorkspaceId},
    storage::Storage,
    Consent, Message,
};
use tracing::info;

use crate::{
    client::is_e164,
    error::{ProviderError, Result},
};

/// A request to send one outbound SMS.
#[derive(Debug, Clone)]
pub struct SendRequest {
    /// Workspace the send belongs to.
    pub workspace_id: WorkspaceId,
    /// Sender phone number (E.164).
    pub from: String,
    /// Recipient phone number (E.164).
    pub to: String,
    /// Message body text.
    pub body: String,
}

/// Validates and enqueues outbound messages.
pub struct Sender {
    storage: Arc<Storage>,
}

impl Sender {
    /// Creates a sender over the given storage.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Enqueues an outbound SMS after checking consent.
    ///
    /// # Errors
    ///
    /// - `ProviderError::Validation` for malformed numbers or an empty
    ///   body.
    /// - `ProviderError::Consent` when the recipient has not opted in.
    /// - `ProviderError::Database` if persisting the message fails.
    pub async fn enqueue(&self, request: SendRequest) -> Result<MessageId> {
        if !is_e164(&request.to) {
            return Err(ProviderError::validation(format!(
                "recipient number must be in E.164 format, got '{}'",
                request.to
            )));
        }
        if !is_e164(&request.from) {
            return Err(ProviderError::validation(format!(
                "sender number must be in E.164 format, got '{}'",
                request.from
            )));
        }
        if request.body.is_empty() {
            return Err(ProviderError::validation("message body is required"));
        }

        let consent = self.storage.consents.find_by_phone_number(&request.to).await?;
        let allowed = consent.as_ref().is_some_and(Consent::allows_sending);
        if !allowed {
            return Err(ProviderError::consent(format!(
                "recipient {} has not opted in to receiving messages",
                request.to
            )));
        }

        let message = Message::new_outbound_sms(
            request.workspace_id,
            request.body,
            request.from,
            request.to,
            Utc::now(),
        );
        let message_id = self.storage.messages.create(&message).await?;

        info!(
            message_id = %message_id,
            workspace_id = %request.workspace_id,
            "outbound message enqueued"
        );

        Ok(message_id)
    }
}
