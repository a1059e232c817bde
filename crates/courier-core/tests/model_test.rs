//! Integration tests for domain model behavior.

use chrono::{Duration, Utc};
use courier_core::{
    Consent, ConsentStatus, Delivery, DeliveryStatus, Message, MessageStatus, WorkspaceId,
};
use courier_core::models::MessageId;

#[test]
fn outbound_message_lifecycle_states() {
    let now = Utc::now();
    let message = Message::new_outbound_sms(
        WorkspaceId::new(),
        "appointment reminder".to_string(),
        "+15550001111".to_string(),
        "+15552223333".to_string(),
        now,
    );

    // Queued -> Sending -> Sent is the outbound happy path; none of the
    // intermediate states are terminal.
    assert_eq!(message.status, MessageStatus::Queued);
    assert!(!MessageStatus::Queued.is_terminal());
    assert!(!MessageStatus::Sending.is_terminal());
    assert!(!MessageStatus::Sent.is_terminal());
    assert!(MessageStatus::Delivered.is_terminal());
    assert!(MessageStatus::Undelivered.is_terminal());
}

#[test]
fn delivery_created_from_failed_message_keeps_attempt_floor() {
    let delivery = Delivery::for_message(
        MessageId::new(),
        "twilio".to_string(),
        MessageStatus::Failed,
        Utc::now(),
    );

    assert_eq!(delivery.status, DeliveryStatus::Failed);
    assert_eq!(delivery.attempts, 1);
}

#[test]
fn consent_full_opt_in_opt_out_cycle() {
    let mut consent = Consent::new("+15550001111".to_string(), Utc::now());
    assert!(!consent.allows_sending());

    let opted_in = Utc::now();
    consent.apply_transition(ConsentStatus::OptedIn, "web_form".to_string(), opted_in).unwrap();
    assert!(consent.allows_sending());
    assert!(consent.allows_marketing(Duration::days(365), opted_in));

    let opted_out = opted_in + Duration::minutes(5);
    consent.apply_transition(ConsentStatus::OptedOut, "sms_keyword".to_string(), opted_out).unwrap();
    assert!(!consent.allows_sending());

    // Opting back in is allowed; the audit trail keeps every step.
    let back_in = opted_out + Duration::minutes(5);
    consent.apply_transition(ConsentStatus::OptedIn, "web_form".to_string(), back_in).unwrap();
    assert!(consent.allows_sending());
    assert_eq!(consent.audit_trail.0.len(), 3);
    assert_eq!(consent.version, 4);
}

#[test]
fn consent_never_returns_to_unknown() {
    let mut consent = Consent::new("+15550001111".to_string(), Utc::now());
    consent.apply_transition(ConsentStatus::OptedOut, "import".to_string(), Utc::now()).unwrap();

    assert!(consent.apply_transition(ConsentStatus::Unknown, "x".to_string(), Utc::now()).is_err());
    assert!(consent.apply_transition(ConsentStatus::Pending, "x".to_string(), Utc::now()).is_err());
    assert_eq!(consent.status, ConsentStatus::OptedOut);
}

#[test]
fn status_serialization_round_trip() {
    // Statuses serialize as snake_case for API payloads and the database.
    let json = serde_json::to_string(&MessageStatus::Undelivered).unwrap();
    assert_eq!(json, "\"undelivered\"");

    let status: MessageStatus = serde_json::from_str("\"sending\"").unwrap();
    assert_eq!(status, MessageStatus::Sending);

    let delivery_status: DeliveryStatus = serde_json::from_str("\"pending\"").unwrap();
    assert_eq!(delivery_status, DeliveryStatus::Pending);
}
