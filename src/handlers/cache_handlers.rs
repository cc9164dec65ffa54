use axum::{extract::State, response::Json};
use serde_json::{json, Value};

use crate::{error::ApiError, models::CacheStats, AppState};

pub async fn get_cache_stats(
    State(app_state): State<AppState>,
) -> Result<Json<CacheStats>, ApiError> {
    Ok(Json(app_state.cache.stats()))
}

pub async fn cleanup_cache(State(app_state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let removed = app_state.cache.cleanup_expired();
    tracing::info!(removed, "cache cleanup completed");
    Ok(Json(json!({ "removed_entries": removed })))
}
