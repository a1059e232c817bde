//! Repository for consent records.
//!
//! Consent is keyed by phone number and consulted before any outbound send
//! is enqueued. Writes carry the full record including the append-only
//! audit trail.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{consent::Consent, error::Result};

const CONSENT_COLUMNS: &str = r#"phone_number, status, source, consent_type,
       verification_method, legal_basis, opt_in_date, opt_out_date,
       version, audit_trail, created_at, updated_at"#;

/// Repository for consent database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Finds the consent record for a phone number.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_phone_number(&self, phone_number: &str) -> Result<Option<Consent>> {
        let consent = sqlx::query_as::<_, Consent>(&format!(
            "SELECT {CONSENT_COLUMNS} FROM consents WHERE phone_number = $1",
        ))
        .bind(phone_number)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(consent)
    }

    /// Inserts or replaces a consent record.
    ///
    /// The version column provides optimistic detection of concurrent
    /// writers: the update only applies when the stored version matches the
    /// one the caller read.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails or the version check rejects it.
    pub async fn upsert(&self, consent: &Consent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO consents (
                phone_number, status, source, consent_type,
                verification_method, legal_basis, opt_in_date, opt_out_date,
                version, audit_trail, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12
            )
            ON CONFLICT (phone_number) DO UPDATE SET
                status = EXCLUDED.status,
                source = EXCLUDED.source,
                consent_type = EXCLUDED.consent_type,
                verification_method = EXCLUDED.verification_method,
                legal_basis = EXCLUDED.legal_basis,
                opt_in_date = EXCLUDED.opt_in_date,
                opt_out_date = EXCLUDED.opt_out_date,
                version = EXCLUDED.version,
                audit_trail = EXCLUDED.audit_trail,
                updated_at = EXCLUDED.updated_at
            WHERE consents.version = EXCLUDED.version - 1
            "#,
        )
        .bind(&consent.phone_number)
        .bind(consent.status)
        .bind(&consent.source)
        .bind(&consent.consent_type)
        .bind(&consent.verification_method)
        .bind(&consent.legal_basis)
        .bind(consent.opt_in_date)
        .bind(consent.opt_out_date)
        .bind(consent.version)
        .bind(&consent.audit_trail)
        .bind(consent.created_at)
        .bind(consent.updated_at)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }
}
