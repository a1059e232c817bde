//! Repository for message database operations.
//!
//! Provides type-safe access to messages with support for concurrent
//! claiming, pessimistic row locks, and transactional operations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Executor, PgPool, Postgres, Transaction};

use crate::{
    error::Result,
    models::{Message, MessageId, MessageStatus, WorkspaceId},
};

const MESSAGE_COLUMNS: &str = r#"id, workspace_id, content, channel, direction,
       from_number, to_number, status, external_id, error_code, error_message,
       retry_count, priority, metadata, next_retry_at,
       created_at, updated_at, deleted_at"#;

/// Repository for message database operations.
///
/// Handles all database interactions for messages including creation,
/// status updates, and lock-free claiming for concurrent processing.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Creates a new message.
    ///
    /// # Errors
    ///
    /// Returns error if insert fails or constraints are violated.
    pub async fn create(&self, message: &Message) -> Result<MessageId> {
        self.create_impl(&*self.pool, message).await
    }

    /// Creates a message within a transaction.
    ///
    /// # Errors
    ///
    /// Returns error if insert fails.
    pub async fn create_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        message: &Message,
    ) -> Result<MessageId> {
        self.create_impl(&mut **tx, message).await
    }

    /// Private helper for creating messages with generic executor.
    async fn create_impl<'e, E>(&self, executor: E, message: &Message) -> Result<MessageId>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO messages (
                id, workspace_id, content, channel, direction, from_number,
                to_number, status, external_id, error_code, error_message,
                retry_count, priority, metadata, next_retry_at,
                created_at, updated_at, deleted_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18
            )
            RETURNING id
            "#,
        )
        .bind(message.id.0)
        .bind(message.workspace_id.0)
        .bind(&message.content)
        .bind(message.channel)
        .bind(message.direction)
        .bind(&message.from_number)
        .bind(&message.to_number)
        .bind(message.status)
        .bind(&message.external_id)
        .bind(&message.error_code)
        .bind(&message.error_message)
        .bind(message.retry_count)
        .bind(message.priority)
        .bind(&message.metadata)
        .bind(message.next_retry_at)
        .bind(message.created_at)
        .bind(message.updated_at)
        .bind(message.deleted_at)
        .fetch_one(executor)
        .await?;

        Ok(MessageId(id))
    }

    /// Finds a message by ID.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_id(&self, message_id: MessageId) -> Result<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1",
        ))
        .bind(message_id.0)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(message)
    }

    /// Finds a message by ID within a transaction, taking a pessimistic
    /// write lock on the row.
    ///
    /// The lock serializes competing status updates from the outbound
    /// (queue) and inbound (webhook) paths for the same message. It is held
    /// until the transaction commits or rolls back.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_id_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        message_id: MessageId,
    ) -> Result<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1 FOR UPDATE",
        ))
        .bind(message_id.0)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(message)
    }

    /// Finds a message by its provider external ID.
    ///
    /// External IDs are unique once set, so at most one row matches.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE external_id = $1",
        ))
        .bind(external_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(message)
    }

    /// Claims queued messages for delivery processing.
    ///
    /// Uses `FOR UPDATE SKIP LOCKED` to enable lock-free concurrent
    /// claiming across multiple workers without blocking. Messages are
    /// claimed oldest-first within descending priority, respecting
    /// `next_retry_at` backoff schedules.
    ///
    /// Claimed rows transition to `sending`; this is the queue-claim
    /// mechanics, the delivery pipeline itself reports the same transition
    /// through the status updater where it lands as an idempotent no-op.
    ///
    /// # Errors
    ///
    /// Returns error if database transaction fails.
    pub async fn claim_queued(&self, batch_size: usize) -> Result<Vec<Message>> {
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let message_ids: Vec<uuid::Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM messages
            WHERE status = 'queued'
              AND deleted_at IS NULL
              AND (next_retry_at IS NULL OR next_retry_at <= $1)
            ORDER BY priority DESC, created_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .bind(batch_size as i32)
        .fetch_all(&mut *tx)
        .await?;

        if message_ids.is_empty() {
            tx.rollback().await?;
            return Ok(Vec::new());
        }

        let messages = sqlx::query_as::<_, Message>(&format!(
            r#"
            UPDATE messages
            SET status = 'sending', updated_at = NOW()
            WHERE id = ANY($1)
            RETURNING {MESSAGE_COLUMNS}
            "#,
        ))
        .bind(&message_ids)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(messages)
    }

    /// Returns a message to the queue with a retry schedule.
    ///
    /// Sets status back to `queued`, records the consumed attempt, and
    /// stamps when the next attempt may run. Part of the queue-claim
    /// mechanics rather than the delivery status machine.
    ///
    /// # Errors
    ///
    /// Returns error if update fails.
    pub async fn schedule_retry(
        &self,
        message_id: MessageId,
        next_retry_at: DateTime<Utc>,
        retry_count: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE messages
            SET status = 'queued',
                retry_count = $1,
                next_retry_at = $2,
                updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(retry_count)
        .bind(next_retry_at)
        .bind(message_id.0)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Updates the status of a message.
    ///
    /// # Errors
    ///
    /// Returns error if update fails.
    pub async fn update_status(&self, message_id: MessageId, status: MessageStatus) -> Result<()> {
        self.update_status_impl(&*self.pool, message_id, status).await
    }

    /// Updates the status of a message within a transaction.
    ///
    /// # Errors
    ///
    /// Returns error if update fails.
    pub async fn update_status_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        message_id: MessageId,
        status: MessageStatus,
    ) -> Result<()> {
        self.update_status_impl(&mut **tx, message_id, status).await
    }

    /// Private helper for updating message status with generic executor.
    async fn update_status_impl<'e, E>(
        &self,
        executor: E,
        message_id: MessageId,
        status: MessageStatus,
    ) -> Result<()>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE messages
            SET status = $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(status)
        .bind(message_id.0)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Updates status and external ID within a transaction.
    ///
    /// # Errors
    ///
    /// Returns error if update fails.
    pub async fn update_status_with_external_id_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        message_id: MessageId,
        status: MessageStatus,
        external_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE messages
            SET status = $1, external_id = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(status)
        .bind(external_id)
        .bind(message_id.0)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Updates status and error fields within a transaction.
    ///
    /// # Errors
    ///
    /// Returns error if update fails.
    pub async fn update_status_with_error_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        message_id: MessageId,
        status: MessageStatus,
        error_code: &str,
        error_message: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE messages
            SET status = $1, error_code = $2, error_message = $3, updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(status)
        .bind(error_code)
        .bind(error_message)
        .bind(message_id.0)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Soft-deletes a message.
    ///
    /// Messages are never hard-deleted; the row remains for audit.
    ///
    /// # Errors
    ///
    /// Returns error if update fails.
    pub async fn soft_delete(&self, message_id: MessageId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE messages
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(message_id.0)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Counts messages by status for a workspace.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn count_by_status(
        &self,
        workspace_id: WorkspaceId,
        status: MessageStatus,
    ) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE workspace_id = $1 AND status = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(workspace_id.0)
        .bind(status)
        .fetch_one(&*self.pool)
        .await?;

        Ok(count.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repository_can_be_created() {
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _repo = Repository::new(Arc::new(pool));
    }
}
