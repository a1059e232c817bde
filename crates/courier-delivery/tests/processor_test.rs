//! Processor behavior tests over mock storage and a scripted provider.

use std::sync::Arc;

use chrono::Utc;
use courier_core::models::{MessageStatus, WorkspaceId};
use courier_core::Message;
use courier_delivery::{
    client::mock::MockProviderClient, storage::mock::MockDeliveryStorage, DeliveryStorage,
    ErrorCategory, Processor, ProviderError, SendJob, SendMessage, TwilioConfig,
    PROCESSING_ERROR_CODE,
};

fn provider_config() -> TwilioConfig {
    TwilioConfig::new(
        "AC00000000000000000000000000000000".to_string(),
        "secret-token".to_string(),
        "+15550001111".to_string(),
    )
}

fn queued_message() -> Message {
    Message::new_outbound_sms(
        WorkspaceId::new(),
        "appointment reminder".to_string(),
        "+15550001111".to_string(),
        "+15552223333".to_string(),
        Utc::now(),
    )
}

fn job_for(message: &Message) -> SendJob {
    SendJob {
        message_id: Some(message.id),
        config: Some(provider_config()),
        message_data: Some(SendMessage {
            to: message.to_number.clone(),
            body: message.content.clone(),
        }),
        workspace_id: message.workspace_id,
        retry_attempt: 0,
    }
}

#[tokio::test]
async fn successful_job_transitions_queued_sending_sent() {
    let storage = Arc::new(MockDeliveryStorage::new());
    let client = Arc::new(MockProviderClient::new());

    let message = queued_message();
    storage.add_message(message.clone()).await;
    client.push_success("SM123").await;

    let processor = Processor::new(storage.clone(), client.clone());
    let outcome = processor.process(&job_for(&message)).await.unwrap();

    assert_eq!(outcome.external_id, "SM123");
    assert!(storage.verify_status(message.id, MessageStatus::Sent).await);

    let stored = storage.find_message(message.id).await.unwrap().unwrap();
    assert_eq!(stored.external_id.as_deref(), Some("SM123"));

    let transitions: Vec<_> =
        storage.recorded_transitions().await.into_iter().map(|(_, s)| s).collect();
    assert_eq!(transitions, vec![MessageStatus::Sending, MessageStatus::Sent]);

    // The provider saw exactly the job's recipient and body.
    let calls = client.recorded_calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].to, "+15552223333");
}

#[tokio::test]
async fn provider_failure_marks_failed_then_rethrows() {
    let storage = Arc::new(MockDeliveryStorage::new());
    let client = Arc::new(MockProviderClient::new());

    let message = queued_message();
    storage.add_message(message.clone()).await;
    client
        .push_outcome(Err(ProviderError::rate_limited(3000, "Rate limit exceeded")))
        .await;

    let processor = Processor::new(storage.clone(), client);
    let error = processor.process(&job_for(&message)).await.unwrap_err();

    assert_eq!(error.to_string(), "Twilio API failed: Rate limit exceeded");
    // Classification survives the rewrap for the queue's retry decision.
    assert!(error.is_retryable());
    assert_eq!(ErrorCategory::from(&error), ErrorCategory::RateLimit);

    // The failure was persisted before the error was returned.
    assert!(storage.verify_status(message.id, MessageStatus::Failed).await);
    let stored = storage.find_message(message.id).await.unwrap().unwrap();
    assert_eq!(stored.error_code.as_deref(), Some(PROCESSING_ERROR_CODE));
    assert_eq!(
        stored.error_message.as_deref(),
        Some("Twilio API failed: Rate limit exceeded")
    );
}

#[tokio::test]
async fn missing_message_id_rejected_before_any_write() {
    let storage = Arc::new(MockDeliveryStorage::new());
    let client = Arc::new(MockProviderClient::new());
    let processor = Processor::new(storage.clone(), client);

    let message = queued_message();
    let mut job = job_for(&message);
    job.message_id = None;

    let error = processor.process(&job).await.unwrap_err();
    assert_eq!(error.to_string(), "Message ID is required");
    assert!(!error.is_retryable());
    assert!(storage.recorded_transitions().await.is_empty());
}

#[tokio::test]
async fn missing_config_rejected_before_any_write() {
    let storage = Arc::new(MockDeliveryStorage::new());
    let client = Arc::new(MockProviderClient::new());
    let processor = Processor::new(storage.clone(), client);

    let message = queued_message();
    storage.add_message(message.clone()).await;
    let mut job = job_for(&message);
    job.config = None;

    let error = processor.process(&job).await.unwrap_err();
    assert_eq!(error.to_string(), "Twilio configuration is required");
    assert!(storage.recorded_transitions().await.is_empty());
}

#[tokio::test]
async fn missing_message_data_rejected_before_any_write() {
    let storage = Arc::new(MockDeliveryStorage::new());
    let client = Arc::new(MockProviderClient::new());
    let processor = Processor::new(storage.clone(), client);

    let message = queued_message();
    storage.add_message(message.clone()).await;
    let mut job = job_for(&message);
    job.message_data = None;

    let error = processor.process(&job).await.unwrap_err();
    assert_eq!(error.to_string(), "Message data is required");
    assert!(storage.recorded_transitions().await.is_empty());
}

#[tokio::test]
async fn unknown_message_surfaces_not_found() {
    let storage = Arc::new(MockDeliveryStorage::new());
    let client = Arc::new(MockProviderClient::new());
    let processor = Processor::new(storage.clone(), client);

    let message = queued_message();
    // Never added to storage.
    let error = processor.process(&job_for(&message)).await.unwrap_err();

    assert!(error.to_string().contains("Message not found"), "{error}");
}

#[tokio::test]
async fn repeated_terminal_write_is_idempotent() {
    let storage = Arc::new(MockDeliveryStorage::new());

    let message = queued_message();
    storage.add_message(message.clone()).await;

    let first = storage.mark_sent(message.id, "SM123".to_string()).await.unwrap();
    assert!(first.changed);

    // Applying the same update twice in a row produces exactly one write;
    // the second call is a no-op but still succeeds.
    let second = storage.mark_sent(message.id, "SM123".to_string()).await.unwrap();
    assert!(!second.changed);

    assert_eq!(storage.recorded_transitions().await.len(), 1);
}
