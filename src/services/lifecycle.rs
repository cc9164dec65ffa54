use std::sync::Arc;
use uuid::Uuid;

use crate::{
    config::Settings,
    error::ApiError,
    models::{
        error_codes, Progress, ScanContext, ServiceError, ServiceName, ServiceStatus, PlanTier,
    },
    repositories::ScanRepository,
    services::registry::ServiceOutcome,
};

/// A validated per-service transition. `Retried` is the only way back out
/// of a terminal per-service state.
pub enum ServiceTransition {
    /// pending -> running, first dispatch.
    Started,
    /// failed -> running, bounded re-entry; increments the attempt counter.
    Retried,
    /// running -> success.
    Succeeded { outcome: ServiceOutcome, elapsed_ms: u64 },
    /// running -> failed.
    Failed { error: ServiceError, elapsed_ms: u64 },
}

/// The scan state machine. Owns the scan store through the repository
/// seam; every state change goes through here and the overall status is
/// always recomputed from the service map, never set directly.
pub struct ScanLifecycle {
    repo: Arc<dyn ScanRepository>,
    settings: Arc<Settings>,
}

impl ScanLifecycle {
    pub fn new(repo: Arc<dyn ScanRepository>, settings: Arc<Settings>) -> Self {
        Self { repo, settings }
    }

    /// Allocates a new scan in `Pending` with every enumerated service
    /// defaulted to a pending slot, and persists it.
    pub async fn initialize_scan(
        &self,
        url: String,
        plan: PlanTier,
        requested: Vec<ServiceName>,
    ) -> Result<ScanContext, ApiError> {
        let ctx = ScanContext::new(url, plan, requested);
        self.repo.create(ctx).await
    }

    /// `Pending -> Running`; records `started_at`.
    pub async fn start_scan(&self, scan_id: &Uuid) -> Result<ScanContext, ApiError> {
        self.repo
            .update(
                scan_id,
                Box::new(|ctx| {
                    if ctx.status != crate::models::ScanStatus::Pending {
                        return Err(ApiError::invalid_transition(format!(
                            "cannot start scan in state {:?}",
                            ctx.status
                        )));
                    }
                    ctx.started_at = Some(chrono::Utc::now());
                    ctx.recompute_status();
                    Ok(())
                }),
            )
            .await
    }

    /// Applies one per-service transition and recomputes the overall
    /// status and progress from the full service map.
    pub async fn update_service_status(
        &self,
        scan_id: &Uuid,
        service: ServiceName,
        transition: ServiceTransition,
    ) -> Result<ScanContext, ApiError> {
        let settings = Arc::clone(&self.settings);
        self.repo
            .update(
                scan_id,
                Box::new(move |ctx| {
                    if !ctx.is_requested(service) {
                        return Err(ApiError::UnknownService(format!(
                            "service '{}' is not part of scan {}",
                            service, ctx.scan_id
                        )));
                    }
                    let retry_limit = settings.plans.get(ctx.plan).retry_limit;
                    let slot = ctx
                        .services
                        .get_mut(&service)
                        .expect("every fixed service has a slot");

                    match transition {
                        ServiceTransition::Started => {
                            if slot.status != ServiceStatus::Pending {
                                return Err(ApiError::invalid_transition(format!(
                                    "service '{}' cannot start from {:?}",
                                    service, slot.status
                                )));
                            }
                            slot.status = ServiceStatus::Running;
                        }
                        ServiceTransition::Retried => {
                            if slot.status != ServiceStatus::Failed {
                                return Err(ApiError::invalid_transition(format!(
                                    "service '{}' cannot be retried from {:?}",
                                    service, slot.status
                                )));
                            }
                            slot.status = ServiceStatus::Running;
                            slot.retry.attempts += 1;
                            slot.retry.can_retry = false;
                            slot.error = None;
                            slot.score = None;
                            slot.data = None;
                            slot.issues.clear();
                        }
                        ServiceTransition::Succeeded {
                            outcome,
                            elapsed_ms,
                        } => {
                            if slot.status != ServiceStatus::Running {
                                return Err(ApiError::invalid_transition(format!(
                                    "service '{}' cannot succeed from {:?}",
                                    service, slot.status
                                )));
                            }
                            slot.status = ServiceStatus::Success;
                            slot.score = outcome.score;
                            slot.data = outcome.data;
                            slot.issues = outcome.issues;
                            slot.error = None;
                            slot.execution_time_ms = elapsed_ms;
                            slot.retry.can_retry = false;
                        }
                        ServiceTransition::Failed { error, elapsed_ms } => {
                            if slot.status != ServiceStatus::Running {
                                return Err(ApiError::invalid_transition(format!(
                                    "service '{}' cannot fail from {:?}",
                                    service, slot.status
                                )));
                            }
                            slot.status = ServiceStatus::Failed;
                            slot.retry.can_retry =
                                error.retryable && slot.retry.attempts < retry_limit;
                            slot.error = Some(error);
                            slot.execution_time_ms = elapsed_ms;
                        }
                    }

                    ctx.recompute_status();
                    Ok(())
                }),
            )
            .await
    }

    /// Caller-initiated cancellation: every unfinished requested service is
    /// failed with a non-retryable cancellation error, which drives the
    /// recomputed overall status terminal.
    pub async fn cancel_scan(&self, scan_id: &Uuid) -> Result<ScanContext, ApiError> {
        let ctx = self
            .finalize_unfinished(
                scan_id,
                ServiceError::new(error_codes::SCAN_CANCELLED, "scan was cancelled", false),
            )
            .await?;
        tracing::info!(scan_id = %scan_id, status = ?ctx.status, "scan cancelled");
        Ok(ctx)
    }

    /// Global-deadline finalization: unfinished services are failed with a
    /// retryable timeout error and the scan settles with whatever
    /// completed so far.
    pub async fn finalize_deadline(&self, scan_id: &Uuid) -> Result<ScanContext, ApiError> {
        let ctx = self
            .finalize_unfinished(
                scan_id,
                ServiceError::new(
                    error_codes::SCAN_TIMEOUT,
                    "scan exceeded its global deadline",
                    true,
                ),
            )
            .await?;
        tracing::warn!(scan_id = %scan_id, status = ?ctx.status, "scan hit global deadline");
        Ok(ctx)
    }

    async fn finalize_unfinished(
        &self,
        scan_id: &Uuid,
        error: ServiceError,
    ) -> Result<ScanContext, ApiError> {
        let settings = Arc::clone(&self.settings);
        self.repo
            .update(
                scan_id,
                Box::new(move |ctx| {
                    if ctx.status.is_terminal() {
                        return Err(ApiError::invalid_transition(format!(
                            "scan {} is already terminal",
                            ctx.scan_id
                        )));
                    }
                    let retry_limit = settings.plans.get(ctx.plan).retry_limit;
                    let requested = ctx.requested.clone();
                    for name in requested {
                        let slot = ctx
                            .services
                            .get_mut(&name)
                            .expect("every fixed service has a slot");
                        if !slot.status.is_terminal() {
                            slot.status = ServiceStatus::Failed;
                            slot.retry.can_retry =
                                error.retryable && slot.retry.attempts < retry_limit;
                            slot.error = Some(error.clone());
                        }
                    }
                    ctx.recompute_status();
                    Ok(())
                }),
            )
            .await
    }

    pub async fn get_scan(&self, scan_id: &Uuid) -> Result<ScanContext, ApiError> {
        self.repo
            .get(scan_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Scan {} not found", scan_id)))
    }

    pub async fn get_progress(&self, scan_id: &Uuid) -> Result<Progress, ApiError> {
        Ok(self.get_scan(scan_id).await?.progress())
    }

    pub async fn list_scans(&self) -> Result<Vec<ScanContext>, ApiError> {
        self.repo.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScanStatus;
    use crate::repositories::InMemoryScanRepository;

    fn lifecycle() -> ScanLifecycle {
        let settings = Arc::new(Settings::new_with_env_file(false).unwrap());
        ScanLifecycle::new(Arc::new(InMemoryScanRepository::new()), settings)
    }

    fn outcome(score: f64) -> ServiceOutcome {
        ServiceOutcome {
            score: Some(score),
            data: None,
            issues: Vec::new(),
        }
    }

    fn failure(retryable: bool) -> ServiceError {
        ServiceError::new(error_codes::SERVICE_ERROR, "analyzer blew up", retryable)
    }

    async fn started_scan(lc: &ScanLifecycle, services: Vec<ServiceName>) -> Uuid {
        let ctx = lc
            .initialize_scan("https://example.com".to_string(), PlanTier::Pro, services)
            .await
            .unwrap();
        lc.start_scan(&ctx.scan_id).await.unwrap();
        ctx.scan_id
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid() {
        let lc = lifecycle();
        let id = started_scan(&lc, vec![ServiceName::Schema]).await;
        let result = lc.start_scan(&id).await;
        assert!(matches!(result, Err(ApiError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_full_success_path() {
        let lc = lifecycle();
        let id = started_scan(&lc, vec![ServiceName::Schema, ServiceName::Backlinks]).await;

        for service in [ServiceName::Schema, ServiceName::Backlinks] {
            lc.update_service_status(&id, service, ServiceTransition::Started)
                .await
                .unwrap();
            lc.update_service_status(
                &id,
                service,
                ServiceTransition::Succeeded {
                    outcome: outcome(88.0),
                    elapsed_ms: 10,
                },
            )
            .await
            .unwrap();
        }

        let ctx = lc.get_scan(&id).await.unwrap();
        assert_eq!(ctx.status, ScanStatus::Completed);
        assert_eq!(ctx.progress().percentage, 100);
    }

    #[tokio::test]
    async fn test_service_outside_scan_is_unknown() {
        let lc = lifecycle();
        let id = started_scan(&lc, vec![ServiceName::Schema]).await;

        let result = lc
            .update_service_status(&id, ServiceName::Backlinks, ServiceTransition::Started)
            .await;
        assert!(matches!(result, Err(ApiError::UnknownService(_))));
    }

    #[tokio::test]
    async fn test_success_without_running_is_invalid() {
        let lc = lifecycle();
        let id = started_scan(&lc, vec![ServiceName::Schema]).await;

        let result = lc
            .update_service_status(
                &id,
                ServiceName::Schema,
                ServiceTransition::Succeeded {
                    outcome: outcome(10.0),
                    elapsed_ms: 1,
                },
            )
            .await;
        assert!(matches!(result, Err(ApiError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_retry_increments_attempts_and_spares_siblings() {
        let lc = lifecycle();
        let id = started_scan(&lc, vec![ServiceName::Schema, ServiceName::Backlinks]).await;

        lc.update_service_status(&id, ServiceName::Schema, ServiceTransition::Started)
            .await
            .unwrap();
        lc.update_service_status(
            &id,
            ServiceName::Schema,
            ServiceTransition::Succeeded {
                outcome: outcome(91.0),
                elapsed_ms: 5,
            },
        )
        .await
        .unwrap();

        lc.update_service_status(&id, ServiceName::Backlinks, ServiceTransition::Started)
            .await
            .unwrap();
        lc.update_service_status(
            &id,
            ServiceName::Backlinks,
            ServiceTransition::Failed {
                error: failure(true),
                elapsed_ms: 7,
            },
        )
        .await
        .unwrap();

        let ctx = lc
            .update_service_status(&id, ServiceName::Backlinks, ServiceTransition::Retried)
            .await
            .unwrap();

        let retried = &ctx.services[&ServiceName::Backlinks];
        assert_eq!(retried.status, ServiceStatus::Running);
        assert_eq!(retried.retry.attempts, 1);
        assert!(retried.error.is_none());

        let sibling = &ctx.services[&ServiceName::Schema];
        assert_eq!(sibling.status, ServiceStatus::Success);
        assert_eq!(sibling.retry.attempts, 0);
        assert_eq!(sibling.score, Some(91.0));
    }

    #[tokio::test]
    async fn test_retry_of_successful_service_is_invalid() {
        let lc = lifecycle();
        let id = started_scan(&lc, vec![ServiceName::Schema]).await;

        lc.update_service_status(&id, ServiceName::Schema, ServiceTransition::Started)
            .await
            .unwrap();
        lc.update_service_status(
            &id,
            ServiceName::Schema,
            ServiceTransition::Succeeded {
                outcome: outcome(70.0),
                elapsed_ms: 2,
            },
        )
        .await
        .unwrap();

        let result = lc
            .update_service_status(&id, ServiceName::Schema, ServiceTransition::Retried)
            .await;
        assert!(matches!(result, Err(ApiError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_non_retryable_failure_clears_can_retry() {
        let lc = lifecycle();
        let id = started_scan(&lc, vec![ServiceName::Schema]).await;

        lc.update_service_status(&id, ServiceName::Schema, ServiceTransition::Started)
            .await
            .unwrap();
        let ctx = lc
            .update_service_status(
                &id,
                ServiceName::Schema,
                ServiceTransition::Failed {
                    error: failure(false),
                    elapsed_ms: 3,
                },
            )
            .await
            .unwrap();

        assert!(!ctx.services[&ServiceName::Schema].retry.can_retry);
        assert_eq!(ctx.status, ScanStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancel_settles_unfinished_services() {
        let lc = lifecycle();
        let id = started_scan(&lc, vec![ServiceName::Schema, ServiceName::Backlinks]).await;

        lc.update_service_status(&id, ServiceName::Schema, ServiceTransition::Started)
            .await
            .unwrap();
        lc.update_service_status(
            &id,
            ServiceName::Schema,
            ServiceTransition::Succeeded {
                outcome: outcome(60.0),
                elapsed_ms: 4,
            },
        )
        .await
        .unwrap();

        let ctx = lc.cancel_scan(&id).await.unwrap();
        assert_eq!(ctx.status, ScanStatus::Partial);
        let cancelled = &ctx.services[&ServiceName::Backlinks];
        assert_eq!(cancelled.status, ServiceStatus::Failed);
        assert_eq!(
            cancelled.error.as_ref().unwrap().code,
            error_codes::SCAN_CANCELLED
        );
        assert!(!cancelled.retry.can_retry);

        // Cancelling a terminal scan is rejected without corrupting state.
        let again = lc.cancel_scan(&id).await;
        assert!(matches!(again, Err(ApiError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_deadline_finalization_is_retryable() {
        let lc = lifecycle();
        let id = started_scan(&lc, vec![ServiceName::Schema]).await;

        lc.update_service_status(&id, ServiceName::Schema, ServiceTransition::Started)
            .await
            .unwrap();

        let ctx = lc.finalize_deadline(&id).await.unwrap();
        assert_eq!(ctx.status, ScanStatus::Failed);
        let slot = &ctx.services[&ServiceName::Schema];
        assert_eq!(slot.error.as_ref().unwrap().code, error_codes::SCAN_TIMEOUT);
        assert!(slot.retry.can_retry);
    }

    #[tokio::test]
    async fn test_late_settle_after_finalization_is_rejected() {
        let lc = lifecycle();
        let id = started_scan(&lc, vec![ServiceName::Schema]).await;

        lc.update_service_status(&id, ServiceName::Schema, ServiceTransition::Started)
            .await
            .unwrap();
        lc.finalize_deadline(&id).await.unwrap();

        // The analyzer eventually comes back; its write is discarded.
        let result = lc
            .update_service_status(
                &id,
                ServiceName::Schema,
                ServiceTransition::Succeeded {
                    outcome: outcome(99.0),
                    elapsed_ms: 5_000,
                },
            )
            .await;
        assert!(matches!(result, Err(ApiError::InvalidTransition(_))));

        let ctx = lc.get_scan(&id).await.unwrap();
        assert_eq!(ctx.status, ScanStatus::Failed);
    }
}
