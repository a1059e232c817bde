//! Repository for delivery tracking records.
//!
//! Deliveries are created lazily by the status updater and looked up by
//! either the owning message or the provider's delivery identifier when a
//! status callback arrives.

use std::sync::Arc;

use sqlx::{Executor, PgPool, Postgres, Transaction};

use crate::{
    error::Result,
    models::{CallbackStatus, Delivery, DeliveryId, DeliveryStatus, MessageId},
};

const DELIVERY_COLUMNS: &str = r#"id, message_id, provider, status, external_delivery_id,
       attempts, error_code, error_message, webhook_url, callback_status,
       metadata, created_at, updated_at"#;

/// Repository for delivery database operations.
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

    /// Creates a new delivery record.
    ///
    /// # Errors
    ///
    /// Returns error if insert fails or constraints are violated.
    pub async fn create(&self, delivery: &Delivery) -> Result<DeliveryId> {
        self.create_impl(&*self.pool, delivery).await
    }

    /// Creates a delivery record within a transaction.
    ///
    /// # Errors
    ///
    /// Returns error if insert fails.
    pub async fn create_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        delivery: &Delivery,
    ) -> Result<DeliveryId> {
        self.create_impl(&mut **tx, delivery).await
    }

    /// Private helper for creating deliveries with generic executor.
    async fn create_impl<'e, E>(&self, executor: E, delivery: &Delivery) -> Result<DeliveryId>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO deliveries (
                id, message_id, provider, status, external_delivery_id,
                attempts, error_code, error_message, webhook_url,
                callback_status, metadata, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13
            )
            RETURNING id
            "#,
        )
        .bind(delivery.id.0)
        .bind(delivery.message_id.0)
        .bind(&delivery.provider)
        .bind(delivery.status)
        .bind(&delivery.external_delivery_id)
        .bind(delivery.attempts)
        .bind(&delivery.error_code)
        .bind(&delivery.error_message)
        .bind(&delivery.webhook_url)
        .bind(delivery.callback_status)
        .bind(&delivery.metadata)
        .bind(delivery.created_at)
        .bind(delivery.updated_at)
        .fetch_one(executor)
        .await?;

        Ok(DeliveryId(id))
    }

    /// Finds the delivery paired with a message.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_message_id(&self, message_id: MessageId) -> Result<Option<Delivery>> {
        self.find_by_message_id_impl(&*self.pool, message_id).await
    }

    /// Finds the delivery paired with a message within a transaction.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_message_id_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        message_id: MessageId,
    ) -> Result<Option<Delivery>> {
        self.find_by_message_id_impl(&mut **tx, message_id).await
    }

    /// Private helper for finding deliveries by message with generic
    /// executor.
    async fn find_by_message_id_impl<'e, E>(
        &self,
        executor: E,
        message_id: MessageId,
    ) -> Result<Option<Delivery>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let delivery = sqlx::query_as::<_, Delivery>(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE message_id = $1",
        ))
        .bind(message_id.0)
        .fetch_optional(executor)
        .await?;

        Ok(delivery)
    }

    /// Finds a delivery by the provider's delivery identifier.
    ///
    /// Status callbacks carry only the provider SID; this is how they are
    /// correlated back to a local record.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_external_delivery_id(
        &self,
        external_delivery_id: &str,
    ) -> Result<Option<Delivery>> {
        self.find_by_external_delivery_id_impl(&*self.pool, external_delivery_id).await
    }

    /// Finds a delivery by provider identifier within a transaction.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_external_delivery_id_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        external_delivery_id: &str,
    ) -> Result<Option<Delivery>> {
        self.find_by_external_delivery_id_impl(&mut **tx, external_delivery_id).await
    }

    /// Private helper for finding deliveries by provider identifier.
    async fn find_by_external_delivery_id_impl<'e, E>(
        &self,
        executor: E,
        external_delivery_id: &str,
    ) -> Result<Option<Delivery>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let delivery = sqlx::query_as::<_, Delivery>(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE external_delivery_id = $1",
        ))
        .bind(external_delivery_id)
        .fetch_optional(executor)
        .await?;

        Ok(delivery)
    }

    /// Updates a delivery's status, attempts, and error fields within a
    /// transaction.
    ///
    /// `attempts` is the absolute new value; the status updater computes
    /// increments from the previously stored value.
    ///
    /// # Errors
    ///
    /// Returns error if update fails.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_status_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        delivery_id: DeliveryId,
        status: DeliveryStatus,
        external_delivery_id: Option<&str>,
        attempts: i32,
        error_code: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE deliveries
            SET status = $1,
                external_delivery_id = COALESCE($2, external_delivery_id),
                attempts = $3,
                error_code = COALESCE($4, error_code),
                error_message = COALESCE($5, error_message),
                updated_at = NOW()
            WHERE id = $6
            "#,
        )
        .bind(status)
        .bind(external_delivery_id)
        .bind(attempts)
        .bind(error_code)
        .bind(error_message)
        .bind(delivery_id.0)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Updates the webhook-processing sub-state of a delivery.
    ///
    /// # Errors
    ///
    /// Returns error if update fails.
    pub async fn update_callback_status_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        delivery_id: DeliveryId,
        callback_status: CallbackStatus,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE deliveries
            SET callback_status = $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(callback_status)
        .bind(delivery_id.0)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}
