//! Queue processor for one message send.
//!
//! Orchestrates a single queued job: validate the payload, mark the
//! message `Sending`, call the provider, and record the terminal outcome.
//! Failures are persisted before the error is returned, so the stored
//! state never lags behind the last known outcome, and the original error
//! is rethrown so the queue layer applies its own retry policy.

use std::{sync::Arc, time::Instant};

use courier_core::models::{MessageId, WorkspaceId};
use tracing::{error, info};

use crate::{
    client::{ProviderClient, SendMessage, SendOutcome, TwilioConfig},
    error::{ProviderError, Result},
    storage::DeliveryStorage,
};

/// Error code recorded on messages that fail inside the processor.
pub const PROCESSING_ERROR_CODE: &str = "PROCESSING_ERROR";

/// One queued send job.
///
/// This is the payload contract with the queue layer. Fields are optional
/// so payload validation failures surface as descriptive errors rather
/// than deserialization panics.
#[derive(Debug, Clone)]
pub struct SendJob {
    /// Message to send.
    pub message_id: Option<MessageId>,
    /// Provider account configuration.
    pub config: Option<TwilioConfig>,
    /// Recipient and body.
    pub message_data: Option<SendMessage>,
    /// Workspace the message belongs to.
    pub workspace_id: WorkspaceId,
    /// Queue-level attempt number, starting at 0 for the first run.
    pub retry_attempt: u32,
}

/// Processes queued send jobs through the provider.
///
/// Stateless between jobs; all persistence goes through the injected
/// [`DeliveryStorage`], which routes status writes through the single
/// transactional status updater.
pub struct Processor {
    storage: Arc<dyn DeliveryStorage>,
    client: Arc<dyn ProviderClient>,
}

impl Processor {
    /// Creates a processor over the given storage and provider client.
    pub fn new(storage: Arc<dyn DeliveryStorage>, client: Arc<dyn ProviderClient>) -> Self {
        Self { storage, client }
    }

    /// Processes one send job to a terminal status.
    ///
    /// State machine: validate -> `Sending` -> provider call -> `Sent` on
    /// success, `Failed` on any failure. The failure is recorded before
    /// this returns, then rethrown for the queue's retry scheduling.
    ///
    /// # Errors
    ///
    /// - `ProviderError::Validation` for a malformed payload, before any
    ///   status mutation.
    /// - The classified provider error, message prefixed with
    ///   "Twilio API failed:", after the message is marked `Failed`.
    /// - `ProviderError::Database` if a status write itself fails.
    pub async fn process(&self, job: &SendJob) -> Result<SendOutcome> {
        let started = Instant::now();

        let message_id = job
            .message_id
            .ok_or_else(|| ProviderError::validation("Message ID is required"))?;
        let config = job
            .config
            .as_ref()
            .ok_or_else(|| ProviderError::validation("Twilio configuration is required"))?;
        let message_data = job
            .message_data
            .as_ref()
            .ok_or_else(|| ProviderError::validation("Message data is required"))?;

        info!(
            message_id = %message_id,
            to = %message_data.to,
            retry_attempt = job.retry_attempt,
            "processing send job"
        );

        self.storage.mark_sending(message_id).await?;

        match self.client.send_sms(message_data.clone(), config.clone()).await {
            Ok(outcome) => {
                self.storage.mark_sent(message_id, outcome.external_id.clone()).await?;

                info!(
                    message_id = %message_id,
                    external_id = %outcome.external_id,
                    processing_ms = started.elapsed().as_millis() as u64,
                    "message sent"
                );

                Ok(outcome)
            },
            Err(provider_error) => {
                let failure_text = format!("Twilio API failed: {provider_error}");

                // Persist the failure before rethrowing so the stored state
                // is current even while the queue is mid-retry-sequence.
                self.storage
                    .mark_failed(
                        message_id,
                        PROCESSING_ERROR_CODE.to_string(),
                        failure_text.clone(),
                    )
                    .await?;

                error!(
                    message_id = %message_id,
                    error = %failure_text,
                    processing_ms = started.elapsed().as_millis() as u64,
                    "send job failed"
                );

                Err(provider_error.with_message(failure_text))
            },
        }
    }
}
