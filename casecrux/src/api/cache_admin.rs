//! Cache administration routes

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::server::AppState;
use crate::cache::middleware::timestamp;
use crate::cache::DEFAULT_CLEAR_PATTERN;

#[derive(Debug, Deserialize)]
pub struct ClearParams {
    pub pattern: Option<String>,
}

/// GET /cache/stats
pub async fn stats(State(state): State<AppState>) -> Json<Value> {
    let stats = state.cache.stats().await;
    let health = state.cache.health().await;
    Json(json!({
        "cache": stats,
        "health": health,
        "timestamp": timestamp(),
    }))
}

/// DELETE /cache/clear?pattern=
pub async fn clear(
    State(state): State<AppState>,
    Query(params): Query<ClearParams>,
) -> Json<Value> {
    let pattern = params
        .pattern
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_CLEAR_PATTERN.to_string());

    let cleared = state.cache.clear_by_pattern(&pattern).await;
    tracing::info!("Cache clear for '{}' removed {} key(s)", pattern, cleared);

    Json(json!({
        "message": "Cache cleared successfully",
        "pattern": pattern,
        "keysCleared": cleared,
        "timestamp": timestamp(),
    }))
}
