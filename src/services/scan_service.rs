use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    config::Settings,
    error::ApiError,
    models::{
        PlanTier, Progress, RetryRequest, RetryResponse, ScanListEntry, ScanReport,
        ScanCreateRequest, ScanStatus, ServiceName,
    },
    services::{
        cache::{normalize_url, ScanCache},
        executor::ScanExecutor,
        lifecycle::ScanLifecycle,
        normalizer::build_report,
        rate_limit::{RateAction, RateLimitService},
        retry::RetryManager,
    },
};

/// Facade over the orchestration core. Handlers talk to this and nothing
/// below it: it validates input, applies rate and quota policy, consults
/// the cache and supervises background scan execution.
pub struct ScanService {
    lifecycle: Arc<ScanLifecycle>,
    executor: ScanExecutor,
    cache: Arc<ScanCache>,
    rate_limiter: Arc<RateLimitService>,
    settings: Arc<Settings>,
    scan_permits: Arc<Semaphore>,
    active: Arc<DashMap<Uuid, JoinHandle<()>>>,
}

impl ScanService {
    pub fn new(
        lifecycle: Arc<ScanLifecycle>,
        executor: ScanExecutor,
        cache: Arc<ScanCache>,
        rate_limiter: Arc<RateLimitService>,
        settings: Arc<Settings>,
    ) -> Self {
        let scan_permits = Arc::new(Semaphore::new(settings.max_concurrent_scans as usize));
        Self {
            lifecycle,
            executor,
            cache,
            rate_limiter,
            settings,
            scan_permits,
            active: Arc::new(DashMap::new()),
        }
    }

    /// Creates a scan, or answers from cache when a fresh-enough result
    /// exists for the same normalized URL, service set and tier. The
    /// returned report is a pending snapshot; execution continues in the
    /// background.
    pub async fn create_scan(
        &self,
        identity: &str,
        user_agent: Option<&str>,
        tier: PlanTier,
        request: ScanCreateRequest,
    ) -> Result<ScanReport, ApiError> {
        let plan = self.settings.plans.get(tier);
        let decision =
            self.rate_limiter
                .check(identity, RateAction::ScanCreate, plan, user_agent)?;
        if let Some(delay) = decision.backoff {
            tokio::time::sleep(delay).await;
        }

        let url = normalize_url(&request.url)?;
        let services = self.resolve_services(request.services.as_deref(), tier)?;

        if request.force {
            self.cache.invalidate(&url, &services)?;
        } else if let Some(hit) = self.cache.get_cached_scan(&url, &services, tier)? {
            tracing::info!(url = %url, tier = %tier, "serving scan from cache");
            return Ok(hit);
        }

        let ctx = self
            .lifecycle
            .initialize_scan(url, tier, services)
            .await?;
        tracing::info!(scan_id = %ctx.scan_id, url = %ctx.url, tier = %tier, "scan created");

        self.supervise(ctx.scan_id, identity.to_string(), false, Vec::new());
        Ok(build_report(&ctx, false))
    }

    pub async fn get_report(&self, scan_id: &Uuid) -> Result<ScanReport, ApiError> {
        let ctx = self.lifecycle.get_scan(scan_id).await?;
        Ok(build_report(&ctx, false))
    }

    pub async fn get_progress(&self, scan_id: &Uuid) -> Result<Progress, ApiError> {
        self.lifecycle.get_progress(scan_id).await
    }

    /// Results endpoint variant: only answers once the scan is terminal.
    pub async fn get_results(&self, scan_id: &Uuid) -> Result<ScanReport, ApiError> {
        let ctx = self.lifecycle.get_scan(scan_id).await?;
        if !ctx.status.is_terminal() {
            return Err(ApiError::validation(format!(
                "scan {} is still {:?}; poll progress until it settles",
                scan_id, ctx.status
            )));
        }
        Ok(build_report(&ctx, false))
    }

    /// Retries failed services of a settled scan, bounded by the plan's
    /// retry ceiling. `All` with nothing eligible is a valid no-op answer,
    /// not an error; naming an ineligible service is a caller mistake.
    pub async fn retry_scan(
        &self,
        identity: &str,
        user_agent: Option<&str>,
        scan_id: &Uuid,
        request: RetryRequest,
    ) -> Result<RetryResponse, ApiError> {
        let ctx = self.lifecycle.get_scan(scan_id).await?;
        let plan = self.settings.plans.get(ctx.plan);

        let decision = self
            .rate_limiter
            .check(identity, RateAction::Retry, plan, user_agent)?;
        if let Some(delay) = decision.backoff {
            tokio::time::sleep(delay).await;
        }

        if !ctx.status.is_terminal() {
            return Err(ApiError::invalid_transition(format!(
                "scan {} is still {:?}; retry applies to settled scans",
                scan_id, ctx.status
            )));
        }

        let eligible = RetryManager::eligible_services(&ctx, plan);
        let targets = match request {
            RetryRequest::All => {
                if eligible.is_empty() {
                    return Ok(RetryResponse {
                        scan_id: *scan_id,
                        retried: Vec::new(),
                        nothing_to_retry: true,
                    });
                }
                eligible
            }
            RetryRequest::Named { services } => {
                if services.is_empty() {
                    return Err(ApiError::validation(
                        "named retry requires at least one service".to_string(),
                    ));
                }
                let named = parse_service_names(&services)?;
                for name in &named {
                    if !ctx.is_requested(*name) {
                        return Err(ApiError::UnknownService(format!(
                            "service '{}' is not part of scan {}",
                            name, scan_id
                        )));
                    }
                    if !eligible.contains(name) {
                        return Err(ApiError::ServiceNotRetryable(format!(
                            "service '{}' is not retryable",
                            name
                        )));
                    }
                }
                named
            }
        };

        // The cached snapshot no longer reflects what this scan will hold.
        self.cache.invalidate(&ctx.url, &ctx.requested)?;

        tracing::info!(scan_id = %scan_id, services = ?targets, "retry dispatched");
        self.supervise(*scan_id, identity.to_string(), true, targets.clone());

        Ok(RetryResponse {
            scan_id: *scan_id,
            retried: targets,
            nothing_to_retry: false,
        })
    }

    /// Aborts the supervising task if one is running and settles the scan
    /// as cancelled. Already-settled services keep their results.
    pub async fn cancel_scan(&self, scan_id: &Uuid) -> Result<ScanReport, ApiError> {
        if let Some((_, handle)) = self.active.remove(scan_id) {
            handle.abort();
        }
        let ctx = self.lifecycle.cancel_scan(scan_id).await?;
        Ok(build_report(&ctx, false))
    }

    pub async fn list_scans(&self) -> Result<Vec<ScanListEntry>, ApiError> {
        let scans = self.lifecycle.list_scans().await?;
        Ok(scans
            .iter()
            .map(|ctx| ScanListEntry {
                scan_id: ctx.scan_id,
                url: ctx.url.clone(),
                status: ctx.status,
                created_at: ctx.created_at,
                progress: ctx.progress(),
            })
            .collect())
    }

    /// Resolves requested service names against the caller's plan. Omitted
    /// means everything the plan allows.
    fn resolve_services(
        &self,
        requested: Option<&[String]>,
        tier: PlanTier,
    ) -> Result<Vec<ServiceName>, ApiError> {
        let plan = self.settings.plans.get(tier);
        let Some(names) = requested else {
            return Ok(plan.allowed_services.clone());
        };
        if names.is_empty() {
            return Err(ApiError::validation(
                "services must be omitted or non-empty".to_string(),
            ));
        }

        let mut resolved = parse_service_names(names)?;
        resolved.sort_unstable();
        resolved.dedup();

        for name in &resolved {
            if !plan.allowed_services.contains(name) {
                return Err(ApiError::validation(format!(
                    "service '{}' is not available on the {} plan",
                    name, tier
                )));
            }
        }
        Ok(resolved)
    }

    /// Spawns the background supervisor for a fresh run or a retry and
    /// tracks its handle so cancellation can abort it. Execution slots are
    /// bounded; excess scans queue on the semaphore.
    fn supervise(&self, scan_id: Uuid, identity: String, retry: bool, targets: Vec<ServiceName>) {
        let executor = self.executor.clone();
        let cache = Arc::clone(&self.cache);
        let rate_limiter = Arc::clone(&self.rate_limiter);
        let permits = Arc::clone(&self.scan_permits);
        let active = Arc::clone(&self.active);

        let handle = tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                // Closed only on shutdown.
                Err(_) => return,
            };

            let outcome = if retry {
                executor.execute_retry(scan_id, targets).await
            } else {
                executor.execute_all(scan_id).await
            };

            match outcome {
                Ok(ctx) => {
                    rate_limiter.record_outcome(&identity, ctx.status == ScanStatus::Completed);
                    if ctx.status == ScanStatus::Completed {
                        let report = build_report(&ctx, false);
                        if let Err(e) =
                            cache.cache_scan_result(&report, &ctx.requested, ctx.plan)
                        {
                            tracing::warn!(scan_id = %scan_id, error = %e, "failed to cache scan");
                        }
                    }
                }
                Err(e) => {
                    rate_limiter.record_outcome(&identity, false);
                    tracing::error!(scan_id = %scan_id, error = %e, "scan supervisor failed");
                }
            }

            active.remove(&scan_id);
        });

        self.active.insert(scan_id, handle);
    }
}

fn parse_service_names(names: &[String]) -> Result<Vec<ServiceName>, ApiError> {
    names
        .iter()
        .map(|raw| {
            raw.parse::<ServiceName>()
                .map_err(|_| ApiError::UnknownService(format!("unknown service '{}'", raw)))
        })
        .collect()
}
