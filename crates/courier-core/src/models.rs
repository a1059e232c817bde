//! Core domain models and strongly-typed identifiers.
//!
//! Defines messages, deliveries, and newtype ID wrappers for compile-time
//! type safety. Includes database serialization traits and the status
//! mapping used by the message delivery pipeline.

use std::{collections::HashMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Strongly-typed message identifier.
///
/// Wraps a UUID to prevent mixing with other ID types. The ID follows a
/// message through its entire lifecycle, from enqueueing to terminal state.
///
/// # Example
///
/// ```
/// use courier_core::models::MessageId;
/// let message_id = MessageId::new();
/// println!("Processing message: {}", message_id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    /// Creates a new random message ID.
    ///
    /// Uses UUID v4 for globally unique identifiers without coordination.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for MessageId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for MessageId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for MessageId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed delivery identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(pub Uuid);

impl DeliveryId {
    /// Creates a new random delivery ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeliveryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for DeliveryId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for DeliveryId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for DeliveryId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for DeliveryId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed workspace identifier.
///
/// Scopes messages and rate-limit counters to an isolated workspace. All
/// pipeline operations carry the workspace of the message they act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceId(pub Uuid);

impl WorkspaceId {
    /// Creates a new random workspace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkspaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for WorkspaceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for WorkspaceId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for WorkspaceId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for WorkspaceId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Communication channel a message travels over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageChannel {
    /// Plain SMS text message.
    Sms,
    /// Multimedia message.
    Mms,
    /// Email message.
    Email,
    /// WhatsApp message.
    Whatsapp,
    /// Voice call.
    Voice,
}

impl fmt::Display for MessageChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sms => write!(f, "sms"),
            Self::Mms => write!(f, "mms"),
            Self::Email => write!(f, "email"),
            Self::Whatsapp => write!(f, "whatsapp"),
            Self::Voice => write!(f, "voice"),
        }
    }
}

impl sqlx::Type<PgDb> for MessageChannel {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for MessageChannel {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "sms" => Ok(Self::Sms),
            "mms" => Ok(Self::Mms),
            "email" => Ok(Self::Email),
            "whatsapp" => Ok(Self::Whatsapp),
            "voice" => Ok(Self::Voice),
            _ => Err(format!("invalid message channel: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for MessageChannel {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// Direction of a message relative to this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    /// Received from an external sender.
    Inbound,
    /// Sent by this service.
    Outbound,
}

impl fmt::Display for MessageDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => write!(f, "inbound"),
            Self::Outbound => write!(f, "outbound"),
        }
    }
}

impl sqlx::Type<PgDb> for MessageDirection {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for MessageDirection {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "inbound" => Ok(Self::Inbound),
            "outbound" => Ok(Self::Outbound),
            _ => Err(format!("invalid message direction: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for MessageDirection {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// Message lifecycle status.
///
/// Messages progress through these states during processing. State
/// transitions flow exclusively through the status updater:
///
/// ```text
/// Queued -> Sending -> Sent -> Delivered
///                   |       -> Undelivered
///                   +-> Failed
/// ```
///
/// Inbound messages use `Receiving`/`Received` instead of the outbound
/// path. `Canceled` is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Persisted and waiting for a delivery worker.
    Queued,

    /// A worker is actively submitting this message to the provider.
    ///
    /// This state prevents duplicate submissions.
    Sending,

    /// Accepted by the provider for delivery.
    Sent,

    /// Confirmed delivered to the handset.
    ///
    /// Terminal success state, reached via status callback.
    Delivered,

    /// Permanently failed.
    ///
    /// Terminal failure state after a non-retryable error or exhausted
    /// retries.
    Failed,

    /// The provider could not deliver to the handset.
    Undelivered,

    /// Canceled before submission.
    Canceled,

    /// Inbound message currently being received.
    Receiving,

    /// Inbound message fully received.
    Received,
}

impl MessageStatus {
    /// Whether this status represents a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::Failed | Self::Undelivered | Self::Canceled | Self::Received
        )
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Sending => write!(f, "sending"),
            Self::Sent => write!(f, "sent"),
            Self::Delivered => write!(f, "delivered"),
            Self::Failed => write!(f, "failed"),
            Self::Undelivered => write!(f, "undelivered"),
            Self::Canceled => write!(f, "canceled"),
            Self::Receiving => write!(f, "receiving"),
            Self::Received => write!(f, "received"),
        }
    }
}

impl sqlx::Type<PgDb> for MessageStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for MessageStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "queued" => Ok(Self::Queued),
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            "undelivered" => Ok(Self::Undelivered),
            "canceled" => Ok(Self::Canceled),
            "receiving" => Ok(Self::Receiving),
            "received" => Ok(Self::Received),
            _ => Err(format!("invalid message status: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for MessageStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// Provider-level delivery status.
///
/// Coarser than [`MessageStatus`]: tracks what the provider reports about a
/// single delivery record. `Pending` is the mapped target for early
/// ("queued"/"sending") status callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Waiting for submission.
    Queued,
    /// Submission in progress.
    Sending,
    /// Accepted by the provider.
    Sent,
    /// Confirmed delivered.
    Delivered,
    /// Permanently failed.
    Failed,
    /// Provider could not deliver.
    Undelivered,
    /// Inbound delivery in progress.
    Receiving,
    /// Inbound delivery complete.
    Received,
    /// Accepted but not yet queued by the provider.
    Accepted,
    /// Canceled before submission.
    Canceled,
    /// Early provider callback, delivery outcome not yet known.
    Pending,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Sending => write!(f, "sending"),
            Self::Sent => write!(f, "sent"),
            Self::Delivered => write!(f, "delivered"),
            Self::Failed => write!(f, "failed"),
            Self::Undelivered => write!(f, "undelivered"),
            Self::Receiving => write!(f, "receiving"),
            Self::Received => write!(f, "received"),
            Self::Accepted => write!(f, "accepted"),
            Self::Canceled => write!(f, "canceled"),
            Self::Pending => write!(f, "pending"),
        }
    }
}

impl sqlx::Type<PgDb> for DeliveryStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for DeliveryStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "queued" => Ok(Self::Queued),
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            "undelivered" => Ok(Self::Undelivered),
            "receiving" => Ok(Self::Receiving),
            "received" => Ok(Self::Received),
            "accepted" => Ok(Self::Accepted),
            "canceled" => Ok(Self::Canceled),
            "pending" => Ok(Self::Pending),
            _ => Err(format!("invalid delivery status: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for DeliveryStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

impl From<MessageStatus> for DeliveryStatus {
    /// Fixed mapping applied when a delivery record is lazily created
    /// from the owning message's status.
    fn from(status: MessageStatus) -> Self {
        match status {
            MessageStatus::Queued => Self::Queued,
            MessageStatus::Sending => Self::Sending,
            MessageStatus::Sent => Self::Sent,
            MessageStatus::Delivered => Self::Delivered,
            MessageStatus::Failed => Self::Failed,
            MessageStatus::Undelivered => Self::Undelivered,
            MessageStatus::Canceled => Self::Canceled,
            MessageStatus::Receiving => Self::Receiving,
            MessageStatus::Received => Self::Received,
        }
    }
}

/// Webhook-processing sub-state of a delivery record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    /// No callback received yet.
    Pending,
    /// Callback currently being processed.
    Processing,
    /// Callback applied successfully.
    Completed,
    /// Callback processing failed.
    Failed,
    /// Callback processing being retried.
    Retrying,
    /// Callback processing abandoned after repeated failures.
    Abandoned,
}

impl fmt::Display for CallbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Retrying => write!(f, "retrying"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

impl sqlx::Type<PgDb> for CallbackStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for CallbackStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "retrying" => Ok(Self::Retrying),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(format!("invalid callback status: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for CallbackStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// Core message entity.
///
/// Represents one unit of outbound or inbound communication. Tracks the
/// complete lifecycle from enqueueing to final delivery or failure.
///
/// # Idempotency
///
/// `external_id` (the provider's message SID) is unique once set. A status
/// callback that arrives twice resolves to the same row, so duplicate
/// webhook processing can never create two logical records for one
/// provider message.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    /// Unique identifier for this message.
    pub id: MessageId,

    /// Workspace that owns this message.
    pub workspace_id: WorkspaceId,

    /// Message body text.
    pub content: String,

    /// Channel the message travels over.
    pub channel: MessageChannel,

    /// Inbound or outbound.
    pub direction: MessageDirection,

    /// Sender phone number (E.164).
    pub from_number: String,

    /// Recipient phone number (E.164).
    pub to_number: String,

    /// Current lifecycle status.
    pub status: MessageStatus,

    /// Provider message SID, set once the provider accepts the message.
    pub external_id: Option<String>,

    /// Error code from the last failure, if any.
    pub error_code: Option<String>,

    /// Human-readable error description from the last failure.
    pub error_message: Option<String>,

    /// Number of queue-level retry attempts consumed.
    pub retry_count: i32,

    /// Scheduling priority; higher is sooner.
    pub priority: i32,

    /// Opaque key-value metadata carried with the message.
    pub metadata: sqlx::types::Json<HashMap<String, String>>,

    /// When to retry next (exponential backoff schedule).
    pub next_retry_at: Option<DateTime<Utc>>,

    /// When this message was created.
    pub created_at: DateTime<Utc>,

    /// When this message was last updated.
    pub updated_at: DateTime<Utc>,

    /// Soft delete timestamp. Messages are never hard-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Creates a new outbound SMS message in `Queued` status.
    pub fn new_outbound_sms(
        workspace_id: WorkspaceId,
        content: String,
        from_number: String,
        to_number: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            workspace_id,
            content,
            channel: MessageChannel::Sms,
            direction: MessageDirection::Outbound,
            from_number,
            to_number,
            status: MessageStatus::Queued,
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

    /// Metadata as a regular map for easy access.
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata.0
    }
}

/// Provider-specific delivery tracking record.
///
/// Paired 1:1 with a message and lazily created on the first status write.
/// Updated by both the outbound (queue) and inbound (webhook) paths; both
/// writers go through the status updater to avoid races.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Delivery {
    /// Unique identifier for this delivery record.
    pub id: DeliveryId,

    /// Owning message.
    pub message_id: MessageId,

    /// Provider name (e.g. "twilio").
    pub provider: String,

    /// Current provider-level status.
    pub status: DeliveryStatus,

    /// Provider's delivery identifier (the message SID for SMS).
    pub external_delivery_id: Option<String>,

    /// Number of delivery attempts.
    ///
    /// Incremented only on error-path writes.
    pub attempts: i32,

    /// Error code from the last failed attempt, if any.
    pub error_code: Option<String>,

    /// Error description from the last failed attempt.
    pub error_message: Option<String>,

    /// URL the provider posts status callbacks to.
    pub webhook_url: Option<String>,

    /// Webhook-processing sub-state.
    pub callback_status: CallbackStatus,

    /// Opaque key-value metadata.
    pub metadata: sqlx::types::Json<HashMap<String, String>>,

    /// When this record was created.
    pub created_at: DateTime<Utc>,

    /// When this record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    /// Creates a delivery record derived from the owning message's status.
    pub fn for_message(
        message_id: MessageId,
        provider: String,
        status: MessageStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DeliveryId::new(),
            message_id,
            provider,
            status: DeliveryStatus::from(status),
            external_delivery_id: None,
            attempts: 1,
            error_code: None,
            error_message: None,
            webhook_url: None,
            callback_status: CallbackStatus::Pending,
            metadata: sqlx::types::Json(HashMap::new()),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_status_display_format() {
        assert_eq!(MessageStatus::Queued.to_string(), "queued");
        assert_eq!(MessageStatus::Sending.to_string(), "sending");
        assert_eq!(MessageStatus::Sent.to_string(), "sent");
        assert_eq!(MessageStatus::Delivered.to_string(), "delivered");
        assert_eq!(MessageStatus::Failed.to_string(), "failed");
        assert_eq!(MessageStatus::Undelivered.to_string(), "undelivered");
        assert_eq!(MessageStatus::Canceled.to_string(), "canceled");
    }

    #[test]
    fn terminal_statuses_identified() {
        assert!(MessageStatus::Delivered.is_terminal());
        assert!(MessageStatus::Failed.is_terminal());
        assert!(MessageStatus::Canceled.is_terminal());
        assert!(!MessageStatus::Queued.is_terminal());
        assert!(!MessageStatus::Sending.is_terminal());
        assert!(!MessageStatus::Sent.is_terminal());
    }

    #[test]
    fn message_to_delivery_status_mapping() {
        assert_eq!(DeliveryStatus::from(MessageStatus::Queued), DeliveryStatus::Queued);
        assert_eq!(DeliveryStatus::from(MessageStatus::Sending), DeliveryStatus::Sending);
        assert_eq!(DeliveryStatus::from(MessageStatus::Sent), DeliveryStatus::Sent);
        assert_eq!(DeliveryStatus::from(MessageStatus::Delivered), DeliveryStatus::Delivered);
        assert_eq!(DeliveryStatus::from(MessageStatus::Failed), DeliveryStatus::Failed);
        assert_eq!(DeliveryStatus::from(MessageStatus::Undelivered), DeliveryStatus::Undelivered);
        assert_eq!(DeliveryStatus::from(MessageStatus::Canceled), DeliveryStatus::Canceled);
    }

    #[test]
    fn new_outbound_sms_starts_queued() {
        let now = Utc::now();
        let message = Message::new_outbound_sms(
            WorkspaceId::new(),
            "hello".to_string(),
            "+15550001111".to_string(),
            "+15552223333".to_string(),
            now,
        );

        assert_eq!(message.status, MessageStatus::Queued);
        assert_eq!(message.direction, MessageDirection::Outbound);
        assert_eq!(message.channel, MessageChannel::Sms);
        assert_eq!(message.retry_count, 0);
        assert!(message.external_id.is_none());
        assert!(message.deleted_at.is_none());
    }

    #[test]
    fn delivery_for_message_derives_status() {
        let now = Utc::now();
        let delivery =
            Delivery::for_message(MessageId::new(), "twilio".to_string(), MessageStatus::Sent, now);

        assert_eq!(delivery.status, DeliveryStatus::Sent);
        assert_eq!(delivery.attempts, 1);
        assert_eq!(delivery.callback_status, CallbackStatus::Pending);
    }
}
