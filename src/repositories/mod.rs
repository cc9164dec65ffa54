pub mod metrics_repo;
pub mod scan_repo;

pub use metrics_repo::{
    InMemoryMetricsRepository, MetricsRepository, ScanMetric, ServiceMetric,
};
pub use scan_repo::{InMemoryScanRepository, ScanMutation, ScanRepository};
