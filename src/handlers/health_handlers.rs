use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};

use crate::{error::ApiError, AppState};

/// Health check with component status for operational dashboards.
pub async fn health_check(State(app_state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let cache_stats = app_state.cache.stats();
    let scans = app_state.scan_service.list_scans().await?;

    Ok(Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "service": "sitescan-backend",
        "checks": {
            "scans": { "healthy": true, "tracked": scans.len() },
            "cache": {
                "healthy": true,
                "total_entries": cache_stats.total_entries,
                "valid_entries": cache_stats.valid_entries,
            },
        }
    })))
}

/// Simple health check endpoint for load balancers
pub async fn health_check_simple() -> Result<&'static str, StatusCode> {
    Ok("OK")
}
