//! Message delivery engine with reliability guarantees.
//!
//! This crate implements the core delivery system that processes queued
//! messages from the database and sends them through the SMS provider with
//! exponential backoff, workspace rate limiting, and comprehensive retry
//! logic.
//!
//! # Architecture
//!
//! The delivery engine uses a worker pool model where multiple async tasks
//! claim messages from PostgreSQL using `FOR UPDATE SKIP LOCKED` for
//! lock-free work distribution. Each worker handles the complete send
//! lifecycle:
//!
//! 1. **Claim Messages** - Worker claims queued messages from database
//! 2. **Rate Check** - Verify the workspace's send budget for the window
//! 3. **Provider Call** - Submit the SMS with timeout and classification
//! 4. **Status Update** - Record the outcome and schedule retries
//!
//! # Key Features
//!
//! - **Lock-free Distribution** - PostgreSQL SKIP LOCKED prevents worker
//!   contention
//! - **Single Transition Authority** - All status writes flow through the
//!   transactional, idempotent status updater
//! - **Exponential Backoff** - Configurable retry delays with jitter
//! - **Graceful Shutdown** - Workers complete in-flight sends before exit

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classify;
pub mod client;
pub mod error;
pub mod processor;
pub mod ratelimit;
pub mod retry;
pub mod sender;
pub mod storage;
mod worker;

// Re-export main public API
pub use client::{ProviderClient, SendMessage, SendOutcome, TwilioClient, TwilioConfig};
pub use error::{ErrorCategory, ProviderError, Result};
pub use processor::{Processor, SendJob, PROCESSING_ERROR_CODE};
pub use ratelimit::{RateLimitConfig, RateLimitDecision, RateLimiter, WorkspaceTier};
pub use retry::RetryPolicy;
pub use sender::{SendRequest, Sender};
pub use storage::{DeliveryStorage, PostgresDeliveryStorage};
pub use worker::{DeliveryEngine, EngineConfig, EngineStats};

/// Default number of concurrent delivery workers.
pub const DEFAULT_WORKER_COUNT: usize = 3;

/// Default batch size for claiming messages from the database.
pub const DEFAULT_BATCH_SIZE: usize = 10;
