//! HTTP surface for the Courier SMS delivery service.
//!
//! Hosts the provider status-callback webhook, health probes, and the
//! figment-based configuration layer. Webhook status updates route through
//! the same status updater as the delivery workers, so both paths share
//! one transactional transition authority.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod crypto;
pub mod handlers;
pub mod server;

pub use config::Config;
pub use server::{create_router, start_server, ApiState};
