//! Worker pool engine for reliable message delivery.
//!
//! Orchestrates async workers that claim queued messages from PostgreSQL
//! using SKIP LOCKED for lock-free distribution. Integrates the workspace
//! rate limiter, exponential backoff scheduling, and graceful shutdown.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use courier_core::models::{Message, MessageStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    classify::{retry_delay_hint, should_retry},
    client::{ProviderClient, SendMessage, TwilioConfig},
    error::{ProviderError, Result},
    processor::{Processor, SendJob},
    ratelimit::{RateLimitConfig, RateLimiter},
    retry::RetryPolicy,
    storage::DeliveryStorage,
};

/// Configuration for the delivery engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of concurrent delivery workers.
    pub worker_count: usize,

    /// Maximum messages to claim per worker batch.
    pub batch_size: usize,

    /// How often workers poll for new messages.
    pub poll_interval: Duration,

    /// Queue-level retry policy.
    pub retry_policy: RetryPolicy,

    /// Rate limiter configuration.
    pub rate_limit: RateLimitConfig,

    /// Shutdown timeout - maximum time to wait for workers to complete.
    pub shutdown_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: crate::DEFAULT_WORKER_COUNT,
            batch_size: crate::DEFAULT_BATCH_SIZE,
            poll_interval: Duration::from_secs(1),
            retry_policy: RetryPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Statistics for delivery engine monitoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineStats {
    /// Total send jobs processed since startup.
    pub messages_processed: u64,
    /// Jobs where the provider accepted the message.
    pub successful_sends: u64,
    /// Jobs that failed (may retry).
    pub failed_sends: u64,
    /// Jobs that failed permanently (retries exhausted or non-retryable).
    pub permanent_failures: u64,
    /// Jobs deferred by the rate limiter.
    pub rate_limited: u64,
    /// Jobs currently in flight.
    pub in_flight: u64,
}

impl EngineStats {
    /// Overall success rate as a percentage, rounded to the nearest
    /// integer (8 successes out of 11 reports 73).
    pub fn success_rate_percent(&self) -> u32 {
        if self.messages_processed == 0 {
            return 0;
        }

        let rate = self.successful_sends as f64 / self.messages_processed as f64 * 100.0;
        rate.round() as u32
    }
}

/// Main delivery engine coordinating message send workers.
pub struct DeliveryEngine {
    storage: Arc<dyn DeliveryStorage>,
    processor: Arc<Processor>,
    rate_limiter: Arc<RateLimiter>,
    provider_config: TwilioConfig,
    config: EngineConfig,
    stats: Arc<RwLock<EngineStats>>,
    cancellation_token: CancellationToken,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl DeliveryEngine {
    /// Creates a new delivery engine.
    pub fn new(
        storage: Arc<dyn DeliveryStorage>,
        client: Arc<dyn ProviderClient>,
        provider_config: TwilioConfig,
        config: EngineConfig,
    ) -> Self {
        let processor = Arc::new(Processor::new(storage.clone(), client));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

        Self {
            storage,
            processor,
            rate_limiter,
            provider_config,
            config,
            stats: Arc::new(RwLock::new(EngineStats::default())),
            cancellation_token: CancellationToken::new(),
            workers: Vec::new(),
        }
    }

    /// Returns the engine's rate limiter for tier registration.
    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        self.rate_limiter.clone()
    }

    /// Starts the configured number of delivery workers.
    ///
    /// Returns immediately after spawning. Use `shutdown()` to stop
    /// gracefully.
    pub fn start(&mut self) {
        info!(
            worker_count = self.config.worker_count,
            batch_size = self.config.batch_size,
            "starting message delivery engine"
        );

        for id in 0..self.config.worker_count {
            let worker = DeliveryWorker {
                id,
                storage: self.storage.clone(),
                processor: self.processor.clone(),
                rate_limiter: self.rate_limiter.clone(),
                provider_config: self.provider_config.clone(),
                config: self.config.clone(),
                stats: self.stats.clone(),
                cancellation_token: self.cancellation_token.clone(),
            };

            self.workers.push(tokio::spawn(async move { worker.run().await }));
        }

        info!("delivery engine started");
    }

    /// Gracefully shuts down the delivery engine.
    ///
    /// Signals all workers to stop claiming new messages and waits for
    /// in-flight deliveries up to the shutdown timeout.
    pub async fn shutdown(mut self) {
        info!("shutting down delivery engine");
        self.cancellation_token.cancel();

        let deadline = tokio::time::sleep(self.config.shutdown_timeout);
        tokio::pin!(deadline);

        for handle in self.workers.drain(..) {
            tokio::select! {
                _ = handle => {},
                () = &mut deadline => {
                    warn!("shutdown timeout exceeded, abandoning remaining workers");
                    break;
                },
            }
        }

        info!("delivery engine stopped");
    }

    /// Returns current engine statistics.
    pub async fn stats(&self) -> EngineStats {
        *self.stats.read().await
    }

    /// Processes exactly one batch of queued messages synchronously.
    ///
    /// Designed for testing and controlled batch processing: claims one
    /// batch, processes it, and returns without spawning workers.
    ///
    /// # Errors
    ///
    /// Returns error if claiming fails.
    pub async fn process_batch(&self) -> Result<usize> {
        let worker = DeliveryWorker {
            id: 0,
            storage: self.storage.clone(),
            processor: self.processor.clone(),
            rate_limiter: self.rate_limiter.clone(),
            provider_config: self.provider_config.clone(),
            config: self.config.clone(),
            stats: self.stats.clone(),
            cancellation_token: self.cancellation_token.clone(),
        };

        worker.process_batch().await
    }
}

/// Individual worker that processes message sends.
struct DeliveryWorker {
    id: usize,
    storage: Arc<dyn DeliveryStorage>,
    processor: Arc<Processor>,
    rate_limiter: Arc<RateLimiter>,
    provider_config: TwilioConfig,
    config: EngineConfig,
    stats: Arc<RwLock<EngineStats>>,
    cancellation_token: CancellationToken,
}

impl DeliveryWorker {
    /// Main worker loop - claims and processes messages until cancelled.
    async fn run(&self) {
        info!(worker_id = self.id, "delivery worker starting");

        loop {
            if self.cancellation_token.is_cancelled() {
                info!(worker_id = self.id, "delivery worker received shutdown signal");
                break;
            }

            match self.process_batch().await {
                Ok(0) => {
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval) => {},
                        () = self.cancellation_token.cancelled() => break,
                    }
                },
                Ok(_) => {},
                Err(error) => {
                    error!(
                        worker_id = self.id,
                        error = %error,
                        "worker batch processing failed"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(Duration::from_secs(5)) => {
                            // Wait before retrying to avoid tight error loops
                        }
                        () = self.cancellation_token.cancelled() => break,
                    }
                },
            }
        }

        info!(worker_id = self.id, "delivery worker stopped");
    }

    /// Claims and processes a batch of queued messages.
    async fn process_batch(&self) -> Result<usize> {
        let messages = self
            .storage
            .claim_queued(self.config.batch_size)
            .await
            .map_err(|e| ProviderError::database(format!("failed to claim messages: {e}")))?;
        let batch_size = messages.len();

        debug!(worker_id = self.id, batch_size, "processing message batch");

        for message in messages {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            if let Err(error) = self.process_message(message).await {
                error!(
                    worker_id = self.id,
                    error = %error,
                    "message processing failed"
                );
            }
        }

        Ok(batch_size)
    }

    /// Drives one claimed message through the send pipeline.
    async fn process_message(&self, message: Message) -> Result<()> {
        let decision =
            self.rate_limiter.check_and_increment(message.workspace_id, message.channel).await;

        if !decision.allowed {
            // Admission denied: requeue for the next window without
            // consuming a retry attempt.
            let delay = decision.retry_after.unwrap_or(self.config.rate_limit.window);
            let next_retry_at = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(60));

            self.storage
                .schedule_retry(message.id, next_retry_at, message.retry_count)
                .await?;

            {
                let mut stats = self.stats.write().await;
                stats.rate_limited += 1;
            }

            warn!(
                worker_id = self.id,
                message_id = %message.id,
                workspace_id = %message.workspace_id,
                next_retry_at = %next_retry_at,
                "send deferred by rate limiter"
            );
            return Ok(());
        }

        {
            let mut stats = self.stats.write().await;
            stats.in_flight += 1;
        }

        let job = SendJob {
            message_id: Some(message.id),
            config: Some(self.provider_config.clone()),
            message_data: Some(SendMessage {
                to: message.to_number.clone(),
                body: message.content.clone(),
            }),
            workspace_id: message.workspace_id,
            retry_attempt: message.retry_count.max(0) as u32,
        };

        let result = self.processor.process(&job).await;

        {
            let mut stats = self.stats.write().await;
            stats.in_flight -= 1;
            stats.messages_processed += 1;
            match &result {
                Ok(_) => stats.successful_sends += 1,
                Err(_) => stats.failed_sends += 1,
            }
        }

        match result {
            Ok(_) => Ok(()),
            Err(error) => self.handle_failure(&message, error).await,
        }
    }

    /// Applies queue-level retry policy after a failed send.
    async fn handle_failure(&self, message: &Message, error: ProviderError) -> Result<()> {
        let attempt_number = (message.retry_count.max(0) as u32) + 1;
        let max_retries = self.config.retry_policy.max_attempts;

        if should_retry(&error, attempt_number, max_retries) {
            let delay = retry_delay_hint(&error)
                .unwrap_or_else(|| self.config.retry_policy.delay_for_attempt(attempt_number));
            let next_retry_at = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(60));

            self.storage
                .schedule_retry(message.id, next_retry_at, attempt_number as i32)
                .await?;

            warn!(
                worker_id = self.id,
                message_id = %message.id,
                attempt_number,
                next_retry_at = %next_retry_at,
                error = %error,
                "send failed, retry scheduled"
            );
            return Ok(());
        }

        {
            let mut stats = self.stats.write().await;
            stats.permanent_failures += 1;
        }

        // Provider failures were already marked Failed by the processor;
        // payload validation failures never reached a status write, so
        // terminate them here.
        let current = self.storage.find_message(message.id).await?;
        if current.is_some_and(|m| m.status != MessageStatus::Failed) {
            self.storage
                .mark_failed(message.id, error.code().to_string(), error.to_string())
                .await?;
        }

        error!(
            worker_id = self.id,
            message_id = %message.id,
            attempt_number,
            error = %error,
            "send permanently failed"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_rounds_to_nearest_integer() {
        let stats = EngineStats {
            messages_processed: 11,
            successful_sends: 8,
            ..Default::default()
        };

        assert_eq!(stats.success_rate_percent(), 73);
    }

    #[test]
    fn success_rate_handles_empty_and_full() {
        assert_eq!(EngineStats::default().success_rate_percent(), 0);

        let stats = EngineStats {
            messages_processed: 4,
            successful_sends: 4,
            ..Default::default()
        };
        assert_eq!(stats.success_rate_percent(), 100);
    }
}
