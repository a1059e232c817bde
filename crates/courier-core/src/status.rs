//! Transactional, idempotent status transitions for messages and their
//! delivery records.
//!
//! The status updater is the single write authority for the
//! message/delivery pair. Both the outbound queue path and the inbound
//! webhook path converge here, so the pessimistic row lock taken inside
//! the transaction is what serializes their competing updates.

use sqlx::{Postgres, Transaction};
use tracing::{debug, info};

use crate::{
    error::{CoreError, Result},
    models::{Delivery, DeliveryStatus, Message, MessageId, MessageStatus},
    storage::Storage,
};

/// Outcome of a status update operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Whether any row was written.
    ///
    /// `false` means the message already carried the target values and the
    /// operation was an idempotent no-op.
    pub changed: bool,
}

/// The requested state change, including variant-specific fields.
#[derive(Debug, Clone)]
enum StatusChange<'a> {
    Plain(MessageStatus),
    WithExternalId(MessageStatus, &'a str),
    WithError(MessageStatus, &'a str, &'a str),
}

impl StatusChange<'_> {
    fn status(&self) -> MessageStatus {
        match self {
            Self::Plain(status)
            | Self::WithExternalId(status, _)
            | Self::WithError(status, _, _) => *status,
        }
    }

    /// Whether the message already carries every value this change would
    /// write. Repeated webhook deliveries and duplicate queue executions
    /// resolve to `true` here and skip all writes.
    fn is_noop(&self, message: &Message) -> bool {
        match self {
            Self::Plain(status) => message.status == *status,
            Self::WithExternalId(status, external_id) => {
                message.status == *status && message.external_id.as_deref() == Some(*external_id)
            },
            Self::WithError(status, code, text) => {
                message.status == *status
                    && message.error_code.as_deref() == Some(*code)
                    && message.error_message.as_deref() == Some(*text)
            },
        }
    }

    fn is_error_path(&self) -> bool {
        matches!(self, Self::WithError(..))
    }
}

/// Transactional writer for message and delivery status.
///
/// Every operation runs in one atomic transaction: lock the message row,
/// check idempotency, write the message, then upsert the paired delivery
/// record. Storage errors propagate uncaught; the caller owns retry
/// policy.
#[derive(Clone)]
pub struct StatusUpdater {
    storage: Storage,
    provider: String,
}

impl StatusUpdater {
    /// Creates a status updater writing delivery records for the given
    /// provider name.
    pub fn new(storage: Storage, provider: impl Into<String>) -> Self {
        Self { storage, provider: provider.into() }
    }

    /// Updates a message to a new status.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the message does not exist, or a
    /// database error if the transaction fails.
    pub async fn update_status(
        &self,
        message_id: MessageId,
        new_status: MessageStatus,
    ) -> Result<StatusUpdate> {
        let mut tx = self.storage.messages.pool().begin().await?;
        let update = self.update_status_in_tx(&mut tx, message_id, new_status).await?;
        tx.commit().await?;
        Ok(update)
    }

    /// Updates a message to a new status inside a caller-owned transaction.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the message does not exist.
    pub async fn update_status_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        message_id: MessageId,
        new_status: MessageStatus,
    ) -> Result<StatusUpdate> {
        self.apply(tx, message_id, StatusChange::Plain(new_status)).await
    }

    /// Updates a message to a new status and records the provider's
    /// external ID.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` when the external ID is empty,
    /// `CoreError::NotFound` if the message does not exist.
    pub async fn update_with_external_id(
        &self,
        message_id: MessageId,
        new_status: MessageStatus,
        external_id: &str,
    ) -> Result<StatusUpdate> {
        let mut tx = self.storage.messages.pool().begin().await?;
        let update =
            self.update_with_external_id_in_tx(&mut tx, message_id, new_status, external_id).await?;
        tx.commit().await?;
        Ok(update)
    }

    /// Transactional variant of [`Self::update_with_external_id`].
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` when the external ID is empty,
    /// `CoreError::NotFound` if the message does not exist.
    pub async fn update_with_external_id_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        message_id: MessageId,
        new_status: MessageStatus,
        external_id: &str,
    ) -> Result<StatusUpdate> {
        if external_id.is_empty() {
            return Err(CoreError::InvalidInput("External ID is required".to_string()));
        }

        self.apply(tx, message_id, StatusChange::WithExternalId(new_status, external_id)).await
    }

    /// Updates a message to a new status and records error details.
    ///
    /// The paired delivery record's attempt counter increments relative to
    /// its previously stored value on this path.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` when the error code or message is
    /// empty, `CoreError::NotFound` if the message does not exist.
    pub async fn update_with_error(
        &self,
        message_id: MessageId,
        new_status: MessageStatus,
        error_code: &str,
        error_message: &str,
    ) -> Result<StatusUpdate> {
        let mut tx = self.storage.messages.pool().begin().await?;
        let update = self
            .update_with_error_in_tx(&mut tx, message_id, new_status, error_code, error_message)
            .await?;
        tx.commit().await?;
        Ok(update)
    }

    /// Transactional variant of [`Self::update_with_error`].
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` when the error code or message is
    /// empty, `CoreError::NotFound` if the message does not exist.
    pub async fn update_with_error_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        message_id: MessageId,
        new_status: MessageStatus,
        error_code: &str,
        error_message: &str,
    ) -> Result<StatusUpdate> {
        if error_code.is_empty() {
            return Err(CoreError::InvalidInput("Error code is required".to_string()));
        }
        if error_message.is_empty() {
            return Err(CoreError::InvalidInput("Error message is required".to_string()));
        }

        self.apply(tx, message_id, StatusChange::WithError(new_status, error_code, error_message))
            .await
    }

    /// Shared transaction body for all three operations.
    async fn apply(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        message_id: MessageId,
        change: StatusChange<'_>,
    ) -> Result<StatusUpdate> {
        // Pessimistic write lock; competing updaters for the same message
        // queue behind this read until our transaction resolves.
        let message = self
            .storage
            .messages
            .find_by_id_for_update(tx, message_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Message not found: {message_id}")))?;

        if change.is_noop(&message) {
            debug!(
                message_id = %message_id,
                status = %message.status,
                "status already current, skipping write"
            );
            return Ok(StatusUpdate { changed: false });
        }

        let new_status = change.status();

        match &change {
            StatusChange::Plain(status) => {
                self.storage.messages.update_status_in_tx(tx, message_id, *status).await?;
            },
            StatusChange::WithExternalId(status, external_id) => {
                self.storage
                    .messages
                    .update_status_with_external_id_in_tx(tx, message_id, *status, external_id)
                    .await?;
            },
            StatusChange::WithError(status, code, text) => {
                self.storage
                    .messages
                    .update_status_with_error_in_tx(tx, message_id, *status, code, text)
                    .await?;
            },
        }

        self.upsert_delivery(tx, &message, &change).await?;

        info!(
            message_id = %message_id,
            from = %message.status,
            to = %new_status,
            "message status updated"
        );

        Ok(StatusUpdate { changed: true })
    }

    /// Creates or updates the delivery record paired with the message.
    async fn upsert_delivery(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        message: &Message,
        change: &StatusChange<'_>,
    ) -> Result<()> {
        let new_status = change.status();
        let existing = self.storage.deliveries.find_by_message_id_in_tx(tx, message.id).await?;

        let (external_id, error_code, error_message) = match change {
            StatusChange::Plain(_) => (None, None, None),
            StatusChange::WithExternalId(_, external_id) => (Some(*external_id), None, None),
            StatusChange::WithError(_, code, text) => (None, Some(*code), Some(*text)),
        };

        match existing {
            Some(delivery) => {
                let attempts = if change.is_error_path() {
                    delivery.attempts + 1
                } else {
                    delivery.attempts
                };

                self.storage
                    .deliveries
                    .update_status_in_tx(
                        tx,
                        delivery.id,
                        DeliveryStatus::from(new_status),
                        external_id,
                        attempts,
                        error_code,
                        error_message,
                    )
                    .await?;
            },
            None => {
                let mut delivery = Delivery::for_message(
                    message.id,
                    self.provider.clone(),
                    new_status,
                    chrono::Utc::now(),
                );
                delivery.external_delivery_id = external_id.map(ToOwned::to_owned);
                delivery.error_code = error_code.map(ToOwned::to_owned);
                delivery.error_message = error_message.map(ToOwned::to_owned);

                self.storage.deliveries.create_in_tx(tx, &delivery).await?;
            },
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;

    use super::*;
    use crate::models::{MessageChannel, MessageDirection, WorkspaceId};

    fn message(status: MessageStatus) -> Message {
        let now = Utc::now();
        Message {
            id: MessageId::new(),
            workspace_id: WorkspaceId::new(),
            content: "hello".to_string(),
            channel: MessageChannel::Sms,
            direction: MessageDirection::Outbound,
            from_number: "+15550001111".to_string(),
            to_number: "+15552223333".to_string(),
            status,
            external_id: None,
            error_code: None,
            error_message: None,
            retry_count: 0,
            priority: 0,
            metadata: sqlx::types::Json(HashMap::new()),
            next_retry_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn plain_change_is_noop_only_when_status_matches() {
        let msg = message(MessageStatus::Sent);

        assert!(StatusChange::Plain(MessageStatus::Sent).is_noop(&msg));
        assert!(!StatusChange::Plain(MessageStatus::Delivered).is_noop(&msg));
    }

    #[test]
    fn external_id_change_requires_matching_id_for_noop() {
        let mut msg = message(MessageStatus::Sent);

        // Same status, no external id stored yet: still a write.
        assert!(!StatusChange::WithExternalId(MessageStatus::Sent, "SM123").is_noop(&msg));

        msg.external_id = Some("SM123".to_string());
        assert!(StatusChange::WithExternalId(MessageStatus::Sent, "SM123").is_noop(&msg));
        assert!(!StatusChange::WithExternalId(MessageStatus::Sent, "SM999").is_noop(&msg));
    }

    #[test]
    fn error_change_requires_matching_fields_for_noop() {
        let mut msg = message(MessageStatus::Failed);
        msg.error_code = Some("PROCESSING_ERROR".to_string());
        msg.error_message = Some("Twilio API failed: Rate limit exceeded".to_string());

        assert!(StatusChange::WithError(
            MessageStatus::Failed,
            "PROCESSING_ERROR",
            "Twilio API failed: Rate limit exceeded"
        )
        .is_noop(&msg));

        assert!(!StatusChange::WithError(MessageStatus::Failed, "PROCESSING_ERROR", "other")
            .is_noop(&msg));
        assert!(!StatusChange::WithError(MessageStatus::Failed, "OTHER", "other").is_noop(&msg));
    }

    #[test]
    fn error_path_detection() {
        assert!(StatusChange::WithError(MessageStatus::Failed, "c", "m").is_error_path());
        assert!(!StatusChange::Plain(MessageStatus::Sent).is_error_path());
        assert!(!StatusChange::WithExternalId(MessageStatus::Sent, "SM1").is_error_path());
    }
}
