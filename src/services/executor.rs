use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::{
    config::Settings,
    error::ApiError,
    models::{
        error_codes, ScanContext, ServiceError, ServiceName, ServiceStatus,
    },
    repositories::{ScanMetric, ServiceMetric},
    services::{
        lifecycle::{ScanLifecycle, ServiceTransition},
        registry::{validate_outcome, AnalyzerConfig, ServiceRegistry},
        telemetry::ScanTelemetry,
        timeout,
    },
};

/// Runs the registered analysis functions for a scan concurrently. Each
/// launch is isolated: an error, panic or timeout in one service never
/// cancels or delays its siblings; every outcome is folded into the
/// lifecycle through the same transition path.
pub struct ScanExecutor {
    registry: Arc<ServiceRegistry>,
    lifecycle: Arc<ScanLifecycle>,
    telemetry: ScanTelemetry,
    settings: Arc<Settings>,
}

impl ScanExecutor {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        lifecycle: Arc<ScanLifecycle>,
        telemetry: ScanTelemetry,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            registry,
            lifecycle,
            telemetry,
            settings,
        }
    }

    /// Starts the scan and dispatches every requested service, bounded by
    /// the global scan deadline. Past the deadline the scan finalizes
    /// with whatever services settled instead of hanging.
    pub async fn execute_all(&self, scan_id: Uuid) -> Result<ScanContext, ApiError> {
        let ctx = self.lifecycle.start_scan(&scan_id).await?;
        let services = ctx.requested.clone();

        self.run_bounded(scan_id, services, false).await;
        self.finish(scan_id).await
    }

    /// Re-dispatches only the given failed services. Eligibility has been
    /// validated by the caller; the lifecycle still enforces the
    /// failed -> running transition per slot.
    pub async fn execute_retry(
        &self,
        scan_id: Uuid,
        services: Vec<ServiceName>,
    ) -> Result<ScanContext, ApiError> {
        self.run_bounded(scan_id, services, true).await;
        self.finish(scan_id).await
    }

    async fn run_bounded(&self, scan_id: Uuid, services: Vec<ServiceName>, retry: bool) {
        let deadline = Duration::from_secs_f64(self.settings.scan_timeout_seconds);
        let bounded = timeout::with_deadline(
            deadline,
            "scan",
            self.run_services(scan_id, services, retry),
        )
        .await;

        if bounded.is_err() {
            // Fails only if another path already made the scan terminal.
            if let Err(e) = self.lifecycle.finalize_deadline(&scan_id).await {
                tracing::debug!(scan_id = %scan_id, error = %e, "deadline finalization skipped");
            }
        }
    }

    async fn run_services(&self, scan_id: Uuid, services: Vec<ServiceName>, retry: bool) {
        let mut handles = Vec::with_capacity(services.len());

        for service in services {
            let transition = if retry {
                ServiceTransition::Retried
            } else {
                ServiceTransition::Started
            };
            if let Err(e) = self
                .lifecycle
                .update_service_status(&scan_id, service, transition)
                .await
            {
                tracing::warn!(
                    scan_id = %scan_id,
                    service = %service,
                    error = %e,
                    "skipping service dispatch"
                );
                continue;
            }

            let executor = self.clone();
            let handle = tokio::spawn(async move {
                executor.run_one(scan_id, service).await;
            });
            handles.push((service, handle));
        }

        // allSettled semantics: collect every outcome independently.
        for (service, handle) in handles {
            if let Err(join_err) = handle.await {
                if join_err.is_panic() {
                    tracing::error!(
                        scan_id = %scan_id,
                        service = %service,
                        "analyzer task panicked"
                    );
                    self.settle_failure(
                        scan_id,
                        service,
                        ServiceError::new(
                            error_codes::SERVICE_PANIC,
                            "analysis task panicked",
                            true,
                        ),
                        0,
                    )
                    .await;
                }
            }
        }
    }

    /// Executes one analyzer under the per-service timeout and folds the
    /// outcome back through the lifecycle.
    async fn run_one(&self, scan_id: Uuid, service: ServiceName) {
        let ctx = match self.lifecycle.get_scan(&scan_id).await {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::error!(scan_id = %scan_id, error = %e, "scan vanished mid-dispatch");
                return;
            }
        };

        let Some(analyzer) = self.registry.get(service) else {
            self.settle_failure(
                scan_id,
                service,
                ServiceError::new(
                    error_codes::SERVICE_NOT_REGISTERED,
                    format!("no analyzer registered for '{}'", service),
                    false,
                ),
                0,
            )
            .await;
            return;
        };

        let config = AnalyzerConfig {
            plan: ctx.plan,
            options: json!({}),
        };
        let per_service = Duration::from_secs_f64(self.settings.service_timeout_seconds);
        let started = Instant::now();

        let outcome = tokio::time::timeout(per_service, analyzer.analyze(&ctx.url, &config)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let transition = match outcome {
            Err(_) => ServiceTransition::Failed {
                error: ServiceError::new(
                    error_codes::SERVICE_TIMEOUT,
                    format!("'{}' exceeded {:?}", service, per_service),
                    true,
                ),
                elapsed_ms,
            },
            Ok(Err(e)) => ServiceTransition::Failed {
                error: ServiceError::new(error_codes::SERVICE_ERROR, e.to_string(), true),
                elapsed_ms,
            },
            Ok(Ok(outcome)) => match validate_outcome(&outcome) {
                Err(violation) => ServiceTransition::Failed {
                    error: ServiceError::new(error_codes::CONTRACT_VIOLATION, violation, true),
                    elapsed_ms,
                },
                Ok(()) => ServiceTransition::Succeeded {
                    outcome,
                    elapsed_ms,
                },
            },
        };

        match self
            .lifecycle
            .update_service_status(&scan_id, service, transition)
            .await
        {
            Ok(updated) => {
                if let Some(slot) = updated.services.get(&service) {
                    self.telemetry.record_service(ServiceMetric {
                        scan_id,
                        service,
                        status: slot.status,
                        duration_ms: elapsed_ms,
                        attempts: slot.retry.attempts,
                        recorded_at: Utc::now(),
                    });
                }
            }
            Err(e) => {
                // The slot settled elsewhere (cancellation, deadline);
                // this result arrives late and is discarded.
                tracing::debug!(
                    scan_id = %scan_id,
                    service = %service,
                    error = %e,
                    "discarding late service result"
                );
            }
        }
    }

    async fn settle_failure(
        &self,
        scan_id: Uuid,
        service: ServiceName,
        error: ServiceError,
        elapsed_ms: u64,
    ) {
        let result = self
            .lifecycle
            .update_service_status(
                &scan_id,
                service,
                ServiceTransition::Failed { error, elapsed_ms },
            )
            .await;
        if let Err(e) = result {
            tracing::debug!(
                scan_id = %scan_id,
                service = %service,
                error = %e,
                "discarding late failure"
            );
        }
    }

    async fn finish(&self, scan_id: Uuid) -> Result<ScanContext, ApiError> {
        let ctx = self.lifecycle.get_scan(&scan_id).await?;

        let duration_ms = match (ctx.started_at, ctx.completed_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as u64,
            _ => 0,
        };
        let services_failed = ctx
            .requested
            .iter()
            .filter(|name| {
                ctx.services
                    .get(name)
                    .map(|r| r.status == ServiceStatus::Failed)
                    .unwrap_or(false)
            })
            .count();

        self.telemetry.record_scan(ScanMetric {
            scan_id,
            url: ctx.url.clone(),
            status: ctx.status,
            duration_ms,
            services_total: ctx.requested.len(),
            services_failed,
            recorded_at: Utc::now(),
        });

        tracing::info!(
            scan_id = %scan_id,
            status = ?ctx.status,
            services_failed,
            duration_ms,
            "scan settled"
        );
        Ok(ctx)
    }
}

impl Clone for ScanExecutor {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            lifecycle: Arc::clone(&self.lifecycle),
            telemetry: self.telemetry.clone(),
            settings: Arc::clone(&self.settings),
        }
    }
}
