//! POST /resolve

use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use ratelink_common::{ResolveRequestItem, ResolveResponseItem};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Accepted request shapes: `{"items": [...]}` or a bare array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResolveBody {
    Wrapped { items: Vec<ResolveRequestItem> },
    Bare(Vec<ResolveRequestItem>),
}

impl ResolveBody {
    fn into_items(self) -> Vec<ResolveRequestItem> {
        match self {
            ResolveBody::Wrapped { items } | ResolveBody::Bare(items) => items,
        }
    }
}

fn parse_items(body: &[u8], max_items: usize) -> ApiResult<Vec<ResolveRequestItem>> {
    let items = serde_json::from_slice::<ResolveBody>(body)
        .map_err(|e| ApiError::BadRequest(format!("Malformed resolve request: {}", e)))?
        .into_items();

    if items.is_empty() {
        return Err(ApiError::BadRequest("No items to resolve".to_string()));
    }
    if items.len() > max_items {
        return Err(ApiError::BadRequest(format!(
            "Too many items: {} (maximum {})",
            items.len(),
            max_items
        )));
    }
    Ok(items)
}

/// POST /resolve
///
/// Malformed bodies are rejected first; a valid one gets 503 with
/// `Retry-After` while rosters are missing or outdated.
pub async fn resolve_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<Vec<ResolveResponseItem>>> {
    let items = parse_items(&body, state.max_batch_items)?;

    if !state.service.is_ready().await {
        return Err(ApiError::unavailable("Roster data is being loaded"));
    }

    tracing::debug!(items = items.len(), "Resolve request");

    Ok(Json(state.service.resolve(&items).await))
}

pub fn resolve_routes() -> Router<AppState> {
    Router::new().route("/resolve", post(resolve_handler))
}
