//! TCPA consent records and their transition rules.
//!
//! Consent is a precondition checked before an outbound send is enqueued.
//! The transition graph is restricted: once a number has opted in or out it
//! can only flip between those two states, never back to unknown/pending.

use std::{collections::HashMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    std::result::Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Opt-in/opt-out state of a phone number.
///
/// ```text
/// Unknown ----+----> OptedIn <----> OptedOut
/// Pending ----+
/// ```
///
/// There is no route back to `Unknown` or `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    /// No consent information recorded.
    Unknown,
    /// Consent requested but not yet confirmed.
    Pending,
    /// Number has opted in to receiving messages.
    OptedIn,
    /// Number has opted out of receiving messages.
    OptedOut,
}

impl ConsentStatus {
    /// Whether a transition from `self` to `target` is allowed.
    pub fn can_transition_to(&self, target: ConsentStatus) -> bool {
        match (self, target) {
            (Self::Unknown | Self::Pending, Self::OptedIn | Self::OptedOut) => true,
            (Self::OptedIn, Self::OptedOut) | (Self::OptedOut, Self::OptedIn) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Pending => write!(f, "pending"),
            Self::OptedIn => write!(f, "opted_in"),
            Self::OptedOut => write!(f, "opted_out"),
        }
    }
}

impl sqlx::Type<PgDb> for ConsentStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for ConsentStatus {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "unknown" => Ok(Self::Unknown),
            "pending" => Ok(Self::Pending),
            "opted_in" => Ok(Self::OptedIn),
            "opted_out" => Ok(Self::OptedOut),
            _ => Err(format!("invalid consent status: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for ConsentStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// One append-only audit trail entry for a consent change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentAuditEntry {
    /// What happened (e.g. "opt_in", "opt_out").
    pub action: String,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Where the change originated (e.g. "sms_keyword", "web_form").
    pub source: String,
    /// Additional context for the change.
    pub metadata: HashMap<String, String>,
}

/// TCPA consent record for a phone number.
///
/// Tracks opt-in/opt-out state with a full audit trail. The invariants are
/// enforced by [`Consent::apply_transition`] rather than by the database:
/// `OptedIn` requires an opt-in date, `OptedOut` requires an opt-out date,
/// and when both dates are present the opt-out must be strictly later.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Consent {
    /// Phone number this consent applies to (E.164).
    pub phone_number: String,

    /// Current consent state.
    pub status: ConsentStatus,

    /// Where the consent originated.
    pub source: Option<String>,

    /// Kind of consent granted (e.g. "marketing", "transactional").
    pub consent_type: Option<String>,

    /// How the opt-in was verified (e.g. "double_opt_in").
    pub verification_method: Option<String>,

    /// Legal basis for processing.
    pub legal_basis: Option<String>,

    /// When the number opted in.
    pub opt_in_date: Option<DateTime<Utc>>,

    /// When the number opted out.
    pub opt_out_date: Option<DateTime<Utc>>,

    /// Record version, incremented on every change.
    pub version: i32,

    /// Append-only history of consent changes.
    pub audit_trail: sqlx::types::Json<Vec<ConsentAuditEntry>>,

    /// When this record was created.
    pub created_at: DateTime<Utc>,

    /// When this record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Consent {
    /// Creates a fresh record in `Unknown` status for a phone number.
    pub fn new(phone_number: String, now: DateTime<Utc>) -> Self {
        Self {
            phone_number,
            status: ConsentStatus::Unknown,
            source: None,
            consent_type: None,
            verification_method: None,
            legal_basis: None,
            opt_in_date: None,
            opt_out_date: None,
            version: 1,
            audit_trail: sqlx::types::Json(Vec::new()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a consent transition, enforcing the restricted graph and the
    /// date invariants, and appends an audit trail entry.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` when the transition is not allowed
    /// or the resulting dates would violate the ordering invariant.
    pub fn apply_transition(
        &mut self,
        target: ConsentStatus,
        source: String,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(CoreError::InvalidInput(format!(
                "consent transition {} -> {} is not allowed",
                self.status, target
            )));
        }

        match target {
            ConsentStatus::OptedIn => {
                self.opt_in_date = Some(now);
            },
            ConsentStatus::OptedOut => {
                if let Some(opt_in) = self.opt_in_date {
                    if now <= opt_in {
                        return Err(CoreError::InvalidInput(
                            "opt-out date must be strictly after opt-in date".to_string(),
                        ));
                    }
                }
                self.opt_out_date = Some(now);
            },
            ConsentStatus::Unknown | ConsentStatus::Pending => {
                // Unreachable through can_transition_to, kept for exhaustiveness.
            },
        }

        let action = match target {
            ConsentStatus::OptedIn => "opt_in",
            ConsentStatus::OptedOut => "opt_out",
            ConsentStatus::Pending => "pending",
            ConsentStatus::Unknown => "unknown",
        };

        self.audit_trail.0.push(ConsentAuditEntry {
            action: action.to_string(),
            timestamp: now,
            source: source.clone(),
            metadata: HashMap::new(),
        });

        self.status = target;
        self.source = Some(source);
        self.version += 1;
        self.updated_at = now;

        Ok(())
    }

    /// Whether marketing messages may currently be sent to this number.
    ///
    /// A missing opt-in date on an opted-in record is treated as "not
    /// expired", i.e. permissive. This mirrors the recorded behavior and is
    /// pending product confirmation before being tightened.
    pub fn allows_marketing(&self, max_age: chrono::Duration, now: DateTime<Utc>) -> bool {
        if self.status != ConsentStatus::OptedIn {
            return false;
        }

        match self.opt_in_date {
            Some(opted_in) => now.signed_duration_since(opted_in) <= max_age,
            None => true,
        }
    }

    /// Whether an outbound send to this number is permitted at all.
    pub fn allows_sending(&self) -> bool {
        self.status == ConsentStatus::OptedIn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consent() -> Consent {
        Consent::new("+15550001111".to_string(), Utc::now())
    }

    #[test]
    fn transition_graph_accepts_specified_edges() {
        assert!(ConsentStatus::Unknown.can_transition_to(ConsentStatus::OptedIn));
        assert!(ConsentStatus::Unknown.can_transition_to(ConsentStatus::OptedOut));
        assert!(ConsentStatus::Pending.can_transition_to(ConsentStatus::OptedIn));
        assert!(ConsentStatus::Pending.can_transition_to(ConsentStatus::OptedOut));
        assert!(ConsentStatus::OptedIn.can_transition_to(ConsentStatus::OptedOut));
        assert!(ConsentStatus::OptedOut.can_transition_to(ConsentStatus::OptedIn));
    }

    #[test]
    fn transition_graph_rejects_routes_back() {
        assert!(!ConsentStatus::OptedIn.can_transition_to(ConsentStatus::Unknown));
        assert!(!ConsentStatus::OptedIn.can_transition_to(ConsentStatus::Pending));
        assert!(!ConsentStatus::OptedOut.can_transition_to(ConsentStatus::Unknown));
        assert!(!ConsentStatus::OptedOut.can_transition_to(ConsentStatus::Pending));
        assert!(!ConsentStatus::Unknown.can_transition_to(ConsentStatus::Pending));
    }

    #[test]
    fn opt_in_records_date_and_audit_entry() {
        let mut consent = consent();
        let now = Utc::now();

        consent.apply_transition(ConsentStatus::OptedIn, "web_form".to_string(), now).unwrap();

        assert_eq!(consent.status, ConsentStatus::OptedIn);
        assert_eq!(consent.opt_in_date, Some(now));
        assert_eq!(consent.version, 2);
        assert_eq!(consent.audit_trail.0.len(), 1);
        assert_eq!(consent.audit_trail.0[0].action, "opt_in");
        assert_eq!(consent.audit_trail.0[0].source, "web_form");
    }

    #[test]
    fn opt_out_must_follow_opt_in_strictly() {
        let mut consent = consent();
        let opted_in_at = Utc::now();

        consent
            .apply_transition(ConsentStatus::OptedIn, "web_form".to_string(), opted_in_at)
            .unwrap();

        // Same timestamp is rejected, strictly-after is required.
        let result =
            consent.apply_transition(ConsentStatus::OptedOut, "sms_keyword".to_string(), opted_in_at);
        assert!(result.is_err());

        let later = opted_in_at + chrono::Duration::seconds(1);
        consent.apply_transition(ConsentStatus::OptedOut, "sms_keyword".to_string(), later).unwrap();
        assert_eq!(consent.status, ConsentStatus::OptedOut);
        assert_eq!(consent.opt_out_date, Some(later));
    }

    #[test]
    fn invalid_transition_rejected_without_mutation() {
        let mut consent = consent();
        let now = Utc::now();
        consent.apply_transition(ConsentStatus::OptedIn, "web_form".to_string(), now).unwrap();

        let result = consent.apply_transition(ConsentStatus::Pending, "web_form".to_string(), now);
        assert!(result.is_err());
        assert_eq!(consent.status, ConsentStatus::OptedIn);
        assert_eq!(consent.audit_trail.0.len(), 1);
    }

    #[test]
    fn allows_marketing_requires_opt_in() {
        let consent = consent();
        assert!(!consent.allows_marketing(chrono::Duration::days(365), Utc::now()));
    }

    #[test]
    fn allows_marketing_with_missing_date_is_permissive() {
        let mut consent = consent();
        let now = Utc::now();
        consent.apply_transition(ConsentStatus::OptedIn, "import".to_string(), now).unwrap();
        consent.opt_in_date = None; // Legacy records imported without a date.

        assert!(consent.allows_marketing(chrono::Duration::days(365), now));
    }

    #[test]
    fn allows_marketing_expires() {
        let mut consent = consent();
        let opted_in_at = Utc::now() - chrono::Duration::days(400);
        consent
            .apply_transition(ConsentStatus::OptedIn, "web_form".to_string(), opted_in_at)
            .unwrap();

        assert!(!consent.allows_marketing(chrono::Duration::days(365), Utc::now()));
    }
}
