use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::{
    config::Settings,
    error::ApiError,
    middleware::IpRateLimiter,
    repositories::{
        InMemoryMetricsRepository, InMemoryScanRepository, MetricsRepository, ScanRepository,
    },
    services::{
        analyzers, RateLimitService, ScanCache, ScanExecutor, ScanLifecycle, ScanService,
        ScanTelemetry, ServiceRegistry,
    },
};

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub scan_service: Arc<ScanService>,
    pub cache: Arc<ScanCache>,
    pub scan_repository: Arc<dyn ScanRepository>,
    pub metrics_repository: Arc<dyn MetricsRepository>,
}

impl AppState {
    /// State wired with the built-in analyzers. Must be called from within
    /// a Tokio runtime: the telemetry consumer is spawned here.
    pub fn new(config: Settings) -> Result<Self, ApiError> {
        let registry = analyzers::default_registry()?;
        Ok(Self::with_registry(config, registry))
    }

    /// State with a caller-provided analyzer registry, used by tests and
    /// by deployments that bring their own analysis functions.
    pub fn with_registry(config: Settings, registry: ServiceRegistry) -> Self {
        let config = Arc::new(config);

        let scan_repository: Arc<dyn ScanRepository> = Arc::new(InMemoryScanRepository::new());
        let metrics_repository: Arc<dyn MetricsRepository> =
            Arc::new(InMemoryMetricsRepository::new());

        let lifecycle = Arc::new(ScanLifecycle::new(
            Arc::clone(&scan_repository),
            Arc::clone(&config),
        ));
        let telemetry = ScanTelemetry::spawn(Arc::clone(&metrics_repository));
        let executor = ScanExecutor::new(
            Arc::new(registry),
            Arc::clone(&lifecycle),
            telemetry,
            Arc::clone(&config),
        );
        let cache = Arc::new(ScanCache::new(Arc::clone(&config)));
        let rate_limiter = Arc::new(RateLimitService::new(Arc::clone(&config)));

        let scan_service = Arc::new(ScanService::new(
            lifecycle,
            executor,
            Arc::clone(&cache),
            rate_limiter,
            Arc::clone(&config),
        ));

        Self {
            config,
            scan_service,
            cache,
            scan_repository,
            metrics_repository,
        }
    }
}

/// Builds the full application router with middleware layers applied.
pub fn build_router(app_state: AppState) -> Router {
    let cors_layer = middleware::create_cors_layer(app_state.config.cors_allow_origins.clone());

    let mut app = Router::new()
        .route("/api/health", get(handlers::health_check))
        .route("/api/health/simple", get(handlers::health_check_simple))
        .route("/api/scans", post(handlers::scan_handlers::create_scan))
        .route("/api/scans", get(handlers::scan_handlers::list_scans))
        .route("/api/scans/:id", get(handlers::scan_handlers::get_scan))
        .route(
            "/api/scans/:id/progress",
            get(handlers::scan_handlers::get_scan_progress),
        )
        .route(
            "/api/scans/:id/results",
            get(handlers::scan_handlers::get_scan_results),
        )
        .route(
            "/api/scans/:id/retry",
            post(handlers::scan_handlers::retry_scan),
        )
        .route(
            "/api/scans/:id/cancel",
            post(handlers::scan_handlers::cancel_scan),
        )
        .route("/api/cache/stats", get(handlers::get_cache_stats))
        .route("/api/cache/cleanup", post(handlers::cleanup_cache));

    if app_state.config.rate_limit_enabled {
        let ip_limiter = Arc::new(IpRateLimiter::new(&app_state.config));
        app = app.layer(axum::middleware::from_fn_with_state(
            ip_limiter,
            middleware::ip_rate_limit_middleware,
        ));
    }

    app.with_state(app_state)
        .layer(axum::middleware::from_fn(
            middleware::request_logging_middleware,
        ))
        .layer(middleware::create_logging_layer())
        .layer(cors_layer)
}
