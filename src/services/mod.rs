pub mod analyzers;
pub mod cache;
pub mod executor;
pub mod lifecycle;
pub mod normalizer;
pub mod rate_limit;
pub mod registry;
pub mod retry;
pub mod scan_service;
pub mod telemetry;
pub mod timeout;

pub use cache::ScanCache;
pub use executor::ScanExecutor;
pub use lifecycle::{ScanLifecycle, ServiceTransition};
pub use rate_limit::{RateAction, RateLimitService};
pub use registry::{Analyzer, AnalyzerConfig, ServiceOutcome, ServiceRegistry};
pub use retry::RetryManager;
pub use scan_service::ScanService;
pub use telemetry::ScanTelemetry;
