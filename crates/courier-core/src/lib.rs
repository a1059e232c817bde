//! Core domain models, storage, and status transitions.
//!
//! Provides strongly-typed domain primitives, the repository layer, and the
//! transactional status updater for the message delivery pipeline. All
//! other crates depend on these foundational types for type safety and
//! consistency.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod consent;
pub mod error;
pub mod models;
pub mod status;
pub mod storage;

pub use consent::{Consent, ConsentAuditEntry, ConsentStatus};
pub use error::{CoreError, CourierError, Result};
pub use models::{
    CallbackStatus, Delivery, DeliveryId, DeliveryStatus, Message, MessageChannel, MessageDirection,
    MessageId, MessageStatus, WorkspaceId,
};
pub use status::{StatusUpdate, StatusUpdater};
pub use storage::Storage;
