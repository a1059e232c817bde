//! HTTP request handlers.

pub mod health;
pub mod status_callback;

pub use health::{health_check, liveness_check, readiness_check};
pub use status_callback::delivery_status_callback;
