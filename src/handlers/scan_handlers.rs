use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::extract_client_ip,
    models::{
        PlanTier, Progress, RetryRequest, RetryResponse, ScanCreateRequest, ScanListEntry,
        ScanReport,
    },
    AppState,
};

/// Caller tier comes from the X-Plan-Tier header; absent means guest,
/// garbage is a caller error.
fn plan_tier(headers: &HeaderMap) -> Result<PlanTier, ApiError> {
    match headers.get("x-plan-tier") {
        None => Ok(PlanTier::Guest),
        Some(value) => {
            let raw = value
                .to_str()
                .map_err(|_| ApiError::validation("X-Plan-Tier header is not valid text"))?;
            raw.parse::<PlanTier>()
                .map_err(|_| ApiError::validation(format!("unknown plan tier '{}'", raw)))
        }
    }
}

fn caller_identity(headers: &HeaderMap) -> String {
    extract_client_ip(headers)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

pub async fn create_scan(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ScanCreateRequest>,
) -> Result<Json<ScanReport>, ApiError> {
    let tier = plan_tier(&headers)?;
    let identity = caller_identity(&headers);
    let agent = user_agent(&headers);
    let report = app_state
        .scan_service
        .create_scan(&identity, agent.as_deref(), tier, payload)
        .await?;
    Ok(Json(report))
}

pub async fn get_scan(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScanReport>, ApiError> {
    let report = app_state.scan_service.get_report(&id).await?;
    Ok(Json(report))
}

pub async fn get_scan_progress(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Progress>, ApiError> {
    let progress = app_state.scan_service.get_progress(&id).await?;
    Ok(Json(progress))
}

pub async fn get_scan_results(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScanReport>, ApiError> {
    let report = app_state.scan_service.get_results(&id).await?;
    Ok(Json(report))
}

pub async fn retry_scan(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    payload: Option<Json<RetryRequest>>,
) -> Result<Json<RetryResponse>, ApiError> {
    let identity = caller_identity(&headers);
    let agent = user_agent(&headers);
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let response = app_state
        .scan_service
        .retry_scan(&identity, agent.as_deref(), &id, request)
        .await?;
    Ok(Json(response))
}

pub async fn cancel_scan(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScanReport>, ApiError> {
    let report = app_state.scan_service.cancel_scan(&id).await?;
    Ok(Json(report))
}

pub async fn list_scans(
    State(app_state): State<AppState>,
) -> Result<Json<Vec<ScanListEntry>>, ApiError> {
    let scans = app_state.scan_service.list_scans().await?;
    Ok(Json(scans))
}
