//! Delivery engine tests: claiming, retry scheduling, rate limiting, and
//! statistics over mock storage and a scripted provider.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use courier_core::models::{MessageStatus, WorkspaceId};
use courier_core::Message;
use courier_delivery::{
    client::mock::MockProviderClient, storage::mock::MockDeliveryStorage, DeliveryEngine,
    EngineConfig, ProviderError, RateLimitConfig, RetryPolicy, TwilioConfig,
};

fn provider_config() -> TwilioConfig {
    TwilioConfig::new(
        "AC00000000000000000000000000000000".to_string(),
        "secret-token".to_string(),
        "+15550001111".to_string(),
    )
}

fn engine_config() -> EngineConfig {
    EngineConfig {
        worker_count: 1,
        batch_size: 10,
        poll_interval: Duration::from_millis(10),
        retry_policy: RetryPolicy { jitter_factor: 0.0, ..Default::default() },
        rate_limit: RateLimitConfig::default(),
        shutdown_timeout: Duration::from_secs(1),
    }
}

fn queued_message() -> Message {
    Message::new_outbound_sms(
        WorkspaceId::new(),
        "hello".to_string(),
        "+15550001111".to_string(),
        "+15552223333".to_string(),
        Utc::now(),
    )
}

#[tokio::test]
async fn batch_sends_claimed_message() {
    let storage = Arc::new(MockDeliveryStorage::new());
    let client = Arc::new(MockProviderClient::new());

    let message = queued_message();
    storage.add_queued_message(message.clone()).await;
    client.push_success("SM123").await;

    let engine =
        DeliveryEngine::new(storage.clone(), client, provider_config(), engine_config());
    let processed = engine.process_batch().await.unwrap();

    assert_eq!(processed, 1);
    assert!(storage.verify_status(message.id, MessageStatus::Sent).await);

    let stats = engine.stats().await;
    assert_eq!(stats.messages_processed, 1);
    assert_eq!(stats.successful_sends, 1);
    assert_eq!(stats.failed_sends, 0);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test]
async fn retryable_failure_requeues_with_backoff() {
    let storage = Arc::new(MockDeliveryStorage::new());
    let client = Arc::new(MockProviderClient::new());

    let message = queued_message();
    storage.add_queued_message(message.clone()).await;
    client
        .push_outcome(Err(ProviderError::service_unavailable(503, "upstream down")))
        .await;

    let engine =
        DeliveryEngine::new(storage.clone(), client, provider_config(), engine_config());
    let before = Utc::now();
    engine.process_batch().await.unwrap();

    let retries = storage.recorded_retries().await;
    assert_eq!(retries.len(), 1);
    let (retried_id, next_retry_at, retry_count) = retries[0];
    assert_eq!(retried_id, message.id);
    assert_eq!(retry_count, 1);
    assert!(next_retry_at > before, "retry must be scheduled in the future");

    // Back in the queue awaiting the backoff window.
    assert!(storage.verify_status(message.id, MessageStatus::Queued).await);

    let stats = engine.stats().await;
    assert_eq!(stats.failed_sends, 1);
    assert_eq!(stats.permanent_failures, 0);
}

#[tokio::test]
async fn rate_limit_error_uses_provider_hint() {
    let storage = Arc::new(MockDeliveryStorage::new());
    let client = Arc::new(MockProviderClient::new());

    let message = queued_message();
    storage.add_queued_message(message.clone()).await;
    client
        .push_outcome(Err(ProviderError::rate_limited(120_000, "Rate limit exceeded")))
        .await;

    let engine =
        DeliveryEngine::new(storage.clone(), client, provider_config(), engine_config());
    let before = Utc::now();
    engine.process_batch().await.unwrap();

    let retries = storage.recorded_retries().await;
    assert_eq!(retries.len(), 1);
    let (_, next_retry_at, _) = retries[0];

    // Retry-After of 120s outranks the 1s exponential base.
    let delay = next_retry_at.signed_duration_since(before);
    assert!(delay >= chrono::Duration::seconds(119), "delay was {delay}");
}

#[tokio::test]
async fn non_retryable_failure_is_permanent() {
    let storage = Arc::new(MockDeliveryStorage::new());
    let client = Arc::new(MockProviderClient::new());

    let message = queued_message();
    storage.add_queued_message(message.clone()).await;
    client
        .push_outcome(Err(ProviderError::validation_with_code(
            21211,
            "Invalid recipient phone number",
        )))
        .await;

    let engine =
        DeliveryEngine::new(storage.clone(), client, provider_config(), engine_config());
    engine.process_batch().await.unwrap();

    assert!(storage.recorded_retries().await.is_empty());
    assert!(storage.verify_status(message.id, MessageStatus::Failed).await);

    let stats = engine.stats().await;
    assert_eq!(stats.permanent_failures, 1);
}

#[tokio::test]
async fn exhausted_attempts_give_up() {
    let storage = Arc::new(MockDeliveryStorage::new());
    let client = Arc::new(MockProviderClient::new());

    let mut message = queued_message();
    message.retry_count = 3; // Default policy allows 3 attempts.
    storage.add_queued_message(message.clone()).await;
    client.push_outcome(Err(ProviderError::network("connection reset"))).await;

    let engine =
        DeliveryEngine::new(storage.clone(), client, provider_config(), engine_config());
    engine.process_batch().await.unwrap();

    assert!(storage.recorded_retries().await.is_empty());
    assert!(storage.verify_status(message.id, MessageStatus::Failed).await);
}

#[tokio::test]
async fn rate_limited_workspace_is_deferred_without_attempt() {
    let storage = Arc::new(MockDeliveryStorage::new());
    let client = Arc::new(MockProviderClient::new());

    let message = queued_message();
    storage.add_queued_message(message.clone()).await;

    let mut config = engine_config();
    config.rate_limit = RateLimitConfig { free_limit: 0, ..Default::default() };

    let engine = DeliveryEngine::new(storage.clone(), client.clone(), provider_config(), config);
    engine.process_batch().await.unwrap();

    // Deferred, not attempted: no provider call, no retry_count increase.
    assert!(client.recorded_calls().await.is_empty());
    let retries = storage.recorded_retries().await;
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].2, 0);

    let stats = engine.stats().await;
    assert_eq!(stats.rate_limited, 1);
    assert_eq!(stats.messages_processed, 0);
}

#[tokio::test]
async fn success_rate_tracks_mixed_outcomes() {
    let storage = Arc::new(MockDeliveryStorage::new());
    let client = Arc::new(MockProviderClient::new());

    // 11 messages: 8 succeed, 3 fail with a non-retryable error.
    let mut ids = Vec::new();
    for i in 0..11 {
        let message = queued_message();
        ids.push(message.id);
        storage.add_queued_message(message).await;
        if i < 8 {
            client.push_success(&format!("SM{i}")).await;
        } else {
            client
                .push_outcome(Err(ProviderError::validation_with_code(
                    21211,
                    "Invalid recipient phone number",
                )))
                .await;
        }
    }

    let engine =
        DeliveryEngine::new(storage.clone(), client, provider_config(), engine_config());
    engine.process_batch().await.unwrap();

    let stats = engine.stats().await;
    assert_eq!(stats.messages_processed, 11);
    assert_eq!(stats.successful_sends, 8);
    assert_eq!(stats.success_rate_percent(), 73);
}

#[tokio::test]
async fn engine_start_and_shutdown_drain_queue() {
    let storage = Arc::new(MockDeliveryStorage::new());
    let client = Arc::new(MockProviderClient::new());

    let message = queued_message();
    storage.add_queued_message(message.clone()).await;
    client.push_success("SM123").await;

    let mut engine =
        DeliveryEngine::new(storage.clone(), client, provider_config(), engine_config());
    engine.start();

    // Give the worker a moment to claim and send.
    for _ in 0..50 {
        if storage.verify_status(message.id, MessageStatus::Sent).await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(storage.verify_status(message.id, MessageStatus::Sent).await);
    engine.shutdown().await;
}
