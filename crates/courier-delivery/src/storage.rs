//! Storage abstraction layer for the delivery engine.
//!
//! Provides trait-based abstractions over storage operations to enable
//! testability without database dependencies. The production implementation
//! routes every status write through the `courier_core` status updater so
//! the delivery engine and the webhook path share one transition authority;
//! tests can provide mock implementations for deterministic behavior
//! validation.

use std::{future::Future, pin::Pin, sync::Arc};

use chrono::{DateTime, Utc};
use courier_core::{
    error::Result,
    models::{Message, MessageId, MessageStatus},
    status::{StatusUpdate, StatusUpdater},
    storage::Storage,
};

/// Storage operations required by the delivery engine.
///
/// This trait abstracts all database operations needed for message
/// delivery, enabling both production PostgreSQL implementations and
/// lightweight test doubles. The separation allows testing processor
/// logic, retry policies, and error handling without database overhead.
pub trait DeliveryStorage: Send + Sync + 'static {
    /// Claims queued messages for processing.
    ///
    /// Uses FOR UPDATE SKIP LOCKED in production to enable lock-free
    /// concurrent claiming. Returns up to `batch_size` messages ordered by
    /// priority and age, respecting retry schedules.
    fn claim_queued(
        &self,
        batch_size: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send + '_>>;

    /// Marks a message as being submitted to the provider.
    fn mark_sending(
        &self,
        message_id: MessageId,
    ) -> Pin<Box<dyn Future<Output = Result<StatusUpdate>> + Send + '_>>;

    /// Marks a message as accepted by the provider, recording its SID.
    fn mark_sent(
        &self,
        message_id: MessageId,
        external_id: String,
    ) -> Pin<Box<dyn Future<Output = Result<StatusUpdate>> + Send + '_>>;

    /// Marks a message as failed with error details.
    fn mark_failed(
        &self,
        message_id: MessageId,
        error_code: String,
        error_message: String,
    ) -> Pin<Box<dyn Future<Output = Result<StatusUpdate>> + Send + '_>>;

    /// Returns a message to the queue with a retry schedule.
    ///
    /// Queue-claim mechanics: sets the message back to `queued` with the
    /// given attempt count and next-retry timestamp.
    fn schedule_retry(
        &self,
        message_id: MessageId,
        next_retry_at: DateTime<Utc>,
        retry_count: i32,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Finds a message by ID.
    ///
    /// Used for verification in tests and monitoring message lifecycle.
    fn find_message(
        &self,
        message_id: MessageId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Message>>> + Send + '_>>;
}

/// Production storage implementation using PostgreSQL.
///
/// Wraps the concrete `courier_core::storage::Storage` and routes status
/// writes through the status updater, keeping the queue path and the
/// webhook path on the same transactional, idempotent transitions.
pub struct PostgresDeliveryStorage {
    storage: Arc<Storage>,
    updater: StatusUpdater,
}

impl PostgresDeliveryStorage {
    /// Creates a new PostgreSQL storage adapter.
    pub fn new(storage: Arc<Storage>, updater: StatusUpdater) -> Self {
        Self { storage, updater }
    }
}

impl DeliveryStorage for PostgresDeliveryStorage {
    fn claim_queued(
        &self,
        batch_size: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.messages.claim_queued(batch_size).await })
    }

    fn mark_sending(
        &self,
        message_id: MessageId,
    ) -> Pin<Box<dyn Future<Output = Result<StatusUpdate>> + Send + '_>> {
        let updater = self.updater.clone();
        Box::pin(async move { updater.update_status(message_id, MessageStatus::Sending).await })
    }

    fn mark_sent(
        &self,
        message_id: MessageId,
        external_id: String,
    ) -> Pin<Box<dyn Future<Output = Result<StatusUpdate>> + Send + '_>> {
        let updater = self.updater.clone();
        Box::pin(async move {
            updater.update_with_external_id(message_id, MessageStatus::Sent, &external_id).await
        })
    }

    fn mark_failed(
        &self,
        message_id: MessageId,
        error_code: String,
        error_message: String,
    ) -> Pin<Box<dyn Future<Output = Result<StatusUpdate>> + Send + '_>> {
        let updater = self.updater.clone();
        Box::pin(async move {
            updater
                .update_with_error(message_id, MessageStatus::Failed, &error_code, &error_message)
                .await
        })
    }

    fn schedule_retry(
        &self,
        message_id: MessageId,
        next_retry_at: DateTime<Utc>,
        retry_count: i32,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage.messages.schedule_retry(message_id, next_retry_at, retry_count).await
        })
    }

    fn find_message(
        &self,
        message_id: MessageId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Message>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.messages.find_by_id(message_id).await })
    }
}

pub mod mock {
    //! Mock storage implementation for testing.
    //!
    //! Provides deterministic, in-memory storage for testing delivery logic
    //! without database dependencies. Mirrors the status updater's
    //! idempotency semantics so duplicate writes report `changed: false`.

    use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

    use chrono::{DateTime, Utc};
    use courier_core::{
        error::{CoreError, Result},
        models::{Message, MessageId, MessageStatus},
        status::StatusUpdate,
    };
    use tokio::sync::RwLock;

    use super::DeliveryStorage;

    /// Mock storage for testing delivery logic without a database.
    pub struct MockDeliveryStorage {
        messages: Arc<RwLock<HashMap<MessageId, Message>>>,
        pending: Arc<RwLock<Vec<Message>>>,
        transitions: Arc<RwLock<Vec<(MessageId, MessageStatus)>>>,
        retries: Arc<RwLock<Vec<(MessageId, DateTime<Utc>, i32)>>>,
    }

    impl MockDeliveryStorage {
        /// Creates a new mock storage with empty state.
        pub fn new() -> Self {
            Self {
                messages: Arc::new(RwLock::new(HashMap::new())),
                pending: Arc::new(RwLock::new(Vec::new())),
                transitions: Arc::new(RwLock::new(Vec::new())),
                retries: Arc::new(RwLock::new(Vec::new())),
            }
        }

        /// Adds a message to storage and the claimable queue.
        pub async fn add_queued_message(&self, message: Message) {
            self.messages.write().await.insert(message.id, message.clone());
            self.pending.write().await.push(message);
        }

        /// Adds a message to storage without queueing it.
        pub async fn add_message(&self, message: Message) {
            self.messages.write().await.insert(message.id, message);
        }

        /// Every status transition applied, in order.
        pub async fn recorded_transitions(&self) -> Vec<(MessageId, MessageStatus)> {
            self.transitions.read().await.clone()
        }

        /// Every retry schedule applied, in order.
        pub async fn recorded_retries(&self) -> Vec<(MessageId, DateTime<Utc>, i32)> {
            self.retries.read().await.clone()
        }

        /// Verifies a message reached the expected status.
        pub async fn verify_status(&self, message_id: MessageId, expected: MessageStatus) -> bool {
            self.messages.read().await.get(&message_id).is_some_and(|m| m.status == expected)
        }

        async fn apply(
            &self,
            message_id: MessageId,
            status: MessageStatus,
            external_id: Option<String>,
            error: Option<(String, String)>,
        ) -> Result<StatusUpdate> {
            let mut messages = self.messages.write().await;
            let message = messages
                .get_mut(&message_id)
                .ok_or_else(|| CoreError::NotFound(format!("Message not found: {message_id}")))?;

            let noop = message.status == status
                && external_id
                    .as_deref()
                    .map_or(true, |e| message.external_id.as_deref() == Some(e))
                && error.as_ref().map_or(true, |(code, text)| {
                    message.error_code.as_deref() == Some(code.as_str())
                        && message.error_message.as_deref() == Some(text.as_str())
                });
            if noop {
                return Ok(StatusUpdate { changed: false });
            }

            message.status = status;
            if let Some(external_id) = external_id {
                message.external_id = Some(external_id);
            }
            if let Some((code, text)) = error {
                message.error_code = Some(code);
                message.error_message = Some(text);
            }
            message.updated_at = Utc::now();
            drop(messages);

            self.transitions.write().await.push((message_id, status));
            Ok(StatusUpdate { changed: true })
        }
    }

    impl Default for MockDeliveryStorage {
        fn default() -> Self {
            Self::new()
        }
    }

    impl DeliveryStorage for MockDeliveryStorage {
        fn claim_queued(
            &self,
            batch_size: usize,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send + '_>> {
            let pending = self.pending.clone();
            let messages = self.messages.clone();

            Box::pin(async move {
                let mut pending = pending.write().await;
                let take = batch_size.min(pending.len());
                let mut claimed: Vec<Message> = pending.drain(..take).collect();
                drop(pending);

                let mut messages = messages.write().await;
                for message in &mut claimed {
                    message.status = MessageStatus::Sending;
                    if let Some(stored) = messages.get_mut(&message.id) {
                        stored.status = MessageStatus::Sending;
                    }
                }

                Ok(claimed)
            })
        }

        fn mark_sending(
            &self,
            message_id: MessageId,
        ) -> Pin<Box<dyn Future<Output = Result<StatusUpdate>> + Send + '_>> {
            Box::pin(self.apply(message_id, MessageStatus::Sending, None, None))
        }

        fn mark_sent(
            &self,
            message_id: MessageId,
            external_id: String,
        ) -> Pin<Box<dyn Future<Output = Result<StatusUpdate>> + Send + '_>> {
            Box::pin(self.apply(message_id, MessageStatus::Sent, Some(external_id), None))
        }

        fn mark_failed(
            &self,
            message_id: MessageId,
            error_code: String,
            error_message: String,
        ) -> Pin<Box<dyn Future<Output = Result<StatusUpdate>> + Send + '_>> {
            Box::pin(self.apply(
                message_id,
                MessageStatus::Failed,
                None,
                Some((error_code, error_message)),
            ))
        }

        fn schedule_retry(
            &self,
            message_id: MessageId,
            next_retry_at: DateTime<Utc>,
            retry_count: i32,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let messages = self.messages.clone();
            let pending = self.pending.clone();
            let retries = self.retries.clone();

            Box::pin(async move {
                let mut messages = messages.write().await;
                if let Some(message) = messages.get_mut(&message_id) {
                    message.status = MessageStatus::Queued;
                    message.retry_count = retry_count;
                    message.next_retry_at = Some(next_retry_at);
                    pending.write().await.push(message.clone());
                }
                drop(messages);

                retries.write().await.push((message_id, next_retry_at, retry_count));
                Ok(())
            })
        }

        fn find_message(
            &self,
            message_id: MessageId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Message>>> + Send + '_>> {
            let messages = self.messages.clone();
            Box::pin(async move { Ok(messages.read().await.get(&message_id).cloned()) })
        }
    }
}
