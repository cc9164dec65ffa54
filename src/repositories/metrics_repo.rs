use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{ScanStatus, ServiceName, ServiceStatus},
};

/// One completed scan, as recorded for operational monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct ScanMetric {
    pub scan_id: Uuid,
    pub url: String,
    pub status: ScanStatus,
    pub duration_ms: u64,
    pub services_total: usize,
    pub services_failed: usize,
    pub recorded_at: DateTime<Utc>,
}

/// One settled service execution attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceMetric {
    pub scan_id: Uuid,
    pub service: ServiceName,
    pub status: ServiceStatus,
    pub duration_ms: u64,
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait MetricsRepository: Send + Sync {
    async fn insert_scan_metric(&self, metric: ScanMetric) -> Result<(), ApiError>;
    async fn insert_service_metric(&self, metric: ServiceMetric) -> Result<(), ApiError>;
    async fn scan_metrics(&self) -> Result<Vec<ScanMetric>, ApiError>;
    async fn service_metrics(&self) -> Result<Vec<ServiceMetric>, ApiError>;
}

pub struct InMemoryMetricsRepository {
    scans: RwLock<Vec<ScanMetric>>,
    services: RwLock<Vec<ServiceMetric>>,
}

impl InMemoryMetricsRepository {
    pub fn new() -> Self {
        Self {
            scans: RwLock::new(Vec::new()),
            services: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryMetricsRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsRepository for InMemoryMetricsRepository {
    async fn insert_scan_metric(&self, metric: ScanMetric) -> Result<(), ApiError> {
        self.scans.write().await.push(metric);
        Ok(())
    }

    async fn insert_service_metric(&self, metric: ServiceMetric) -> Result<(), ApiError> {
        self.services.write().await.push(metric);
        Ok(())
    }

    async fn scan_metrics(&self) -> Result<Vec<ScanMetric>, ApiError> {
        Ok(self.scans.read().await.clone())
    }

    async fn service_metrics(&self) -> Result<Vec<ServiceMetric>, ApiError> {
        Ok(self.services.read().await.clone())
    }
}
