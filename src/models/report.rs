use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::{
    Issue, Progress, RetryState, ScanStatus, ServiceError, ServiceName, ServiceStatus,
};

/// Request body for scan creation.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanCreateRequest {
    pub url: String,
    /// Service names to run. Omitted means every service the caller's plan
    /// allows. Validated by name so unknown entries produce a 400, not a
    /// deserialization rejection.
    #[serde(default)]
    pub services: Option<Vec<String>>,
    /// Force a fresh scan, invalidating any cached result first.
    #[serde(default)]
    pub force: bool,
}

/// Retry request. Explicit two-variant shape: retry everything eligible,
/// or retry a named subset.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RetryRequest {
    All,
    Named { services: Vec<String> },
}

impl Default for RetryRequest {
    fn default() -> Self {
        RetryRequest::All
    }
}

/// Outcome of a retry call. "Nothing to retry" is a valid, non-error
/// answer, so it is part of the response shape rather than an ApiError.
#[derive(Debug, Clone, Serialize)]
pub struct RetryResponse {
    pub scan_id: Uuid,
    pub retried: Vec<ServiceName>,
    pub nothing_to_retry: bool,
}

/// Per-service block of the externally guaranteed contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceReport {
    pub status: ServiceStatus,
    pub score: Option<f64>,
    pub data: Option<Value>,
    pub issues: Vec<Issue>,
    pub error: Option<ServiceError>,
    pub execution_time_ms: u64,
    pub retry: RetryState,
}

/// The contract-stable scan payload. Shape is identical whether the scan
/// is in flight, terminal, partially failed or served from cache: every
/// fixed service name is always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub scan_id: Uuid,
    pub url: String,
    pub status: ScanStatus,
    pub cached: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: Progress,
    pub services: BTreeMap<ServiceName, ServiceReport>,
}

/// Response DTO for the scan list endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ScanListEntry {
    pub scan_id: Uuid,
    pub url: String,
    pub status: ScanStatus,
    pub created_at: DateTime<Utc>,
    pub progress: Progress,
}

/// Cache statistics exposed for operational monitoring.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
}
