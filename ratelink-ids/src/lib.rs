//! ratelink-ids library interface
//!
//! Maps university-local applicant IDs to national registry IDs. Exposed
//! as a library so the HTTP router, the services and the matcher can be
//! exercised from integration tests and embedded in-process.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod matching;
pub mod registry;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::services::ResolutionService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ResolutionService>,
    /// Upper bound on items per resolve request
    pub max_batch_items: usize,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(service: Arc<ResolutionService>, max_batch_items: usize) -> Self {
        Self {
            service,
            max_batch_items,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// Every route is served both at the root and under `/api/v1`.
pub fn build_router(state: AppState) -> Router {
    let routes: Router<AppState> = Router::new()
        .merge(api::resolve_routes())
        .merge(api::status_routes());

    Router::new()
        .merge(routes.clone())
        .nest("/api/v1", routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
