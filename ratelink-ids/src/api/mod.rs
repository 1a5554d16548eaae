//! HTTP API handlers

pub mod health;
pub mod resolve;

pub use health::{fetch_status, health_check, readiness, status_routes, wait_ready};
pub use resolve::{resolve_handler, resolve_routes};
