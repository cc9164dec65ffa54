use crate::models::{PlanConfig, ScanContext, ServiceName, ServiceResult, ServiceStatus};

/// Decides retry eligibility against plan-configured limits. Stateless:
/// attempt counters live on the service slots themselves.
pub struct RetryManager;

impl RetryManager {
    /// A failed service is eligible while its error is retryable and its
    /// attempt counter is below the plan ceiling.
    pub fn is_eligible(result: &ServiceResult, plan: &PlanConfig) -> bool {
        result.status == ServiceStatus::Failed
            && result
                .error
                .as_ref()
                .map(|e| e.retryable)
                .unwrap_or(false)
            && result.retry.attempts < plan.retry_limit
    }

    /// The subset of this scan's failed services that may be retried.
    pub fn eligible_services(ctx: &ScanContext, plan: &PlanConfig) -> Vec<ServiceName> {
        ctx.requested
            .iter()
            .copied()
            .filter(|name| {
                ctx.services
                    .get(name)
                    .map(|result| Self::is_eligible(result, plan))
                    .unwrap_or(false)
            })
            .collect()
    }
}
