use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::{PlanTier, ServiceName};

/// Overall scan status. Terminal states are `Completed`, `Partial` and
/// `Failed`; they are always derived from the per-service map, never set
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Partial,
    Failed,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Completed | ScanStatus::Partial | ScanStatus::Failed
        )
    }
}

/// Status of one service within a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl ServiceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceStatus::Success | ServiceStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// One finding produced by an analysis service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
    pub recommendation: String,
}

/// Machine-readable failure attached to a failed service result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl ServiceError {
    pub fn new(code: &str, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            retryable,
        }
    }
}

/// Error codes folded into failed service results. Kept distinct so
/// operators can tell a flaky dependency from a broken integration.
pub mod error_codes {
    pub const SERVICE_ERROR: &str = "SERVICE_ERROR";
    pub const SERVICE_TIMEOUT: &str = "SERVICE_TIMEOUT";
    pub const SERVICE_PANIC: &str = "SERVICE_PANIC";
    pub const CONTRACT_VIOLATION: &str = "CONTRACT_VIOLATION";
    pub const SERVICE_NOT_REGISTERED: &str = "SERVICE_NOT_REGISTERED";
    pub const SCAN_CANCELLED: &str = "SCAN_CANCELLED";
    pub const SCAN_TIMEOUT: &str = "SCAN_TIMEOUT";
}

/// Attempt tracking for one service slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryState {
    pub attempts: u32,
    pub can_retry: bool,
}

/// Result slot for one (scan, service) pair. Created in `pending` when the
/// scan context is created, so callers never see a missing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceResult {
    pub status: ServiceStatus,
    pub score: Option<f64>,
    pub data: Option<Value>,
    pub issues: Vec<Issue>,
    pub error: Option<ServiceError>,
    pub execution_time_ms: u64,
    pub retry: RetryState,
}

impl ServiceResult {
    pub fn pending() -> Self {
        Self {
            status: ServiceStatus::Pending,
            score: None,
            data: None,
            issues: Vec::new(),
            error: None,
            execution_time_ms: 0,
            retry: RetryState::default(),
        }
    }
}

/// Progress snapshot derived from the service map. A failed service counts
/// as completed so a scan is never stuck waiting on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed_services: usize,
    pub total_services: usize,
    pub percentage: u8,
}

/// The canonical representation of one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanContext {
    pub scan_id: Uuid,
    pub url: String,
    pub plan: PlanTier,
    pub status: ScanStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Services this scan actually dispatches. Subset of the fixed set,
    /// bounded by the caller's plan.
    pub requested: Vec<ServiceName>,
    /// Every member of the fixed set is present; services outside
    /// `requested` stay pending.
    pub services: BTreeMap<ServiceName, ServiceResult>,
}

impl ScanContext {
    /// Pure allocation: a new context in `Pending` with every enumerated
    /// service defaulted to a pending slot. No I/O.
    pub fn new(url: String, plan: PlanTier, requested: Vec<ServiceName>) -> Self {
        let services = ServiceName::ALL
            .iter()
            .map(|name| (*name, ServiceResult::pending()))
            .collect();

        Self {
            scan_id: Uuid::new_v4(),
            url,
            plan,
            status: ScanStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            requested,
            services,
        }
    }

    pub fn is_requested(&self, name: ServiceName) -> bool {
        self.requested.contains(&name)
    }

    /// Progress over the requested service set.
    pub fn progress(&self) -> Progress {
        let total = self.requested.len();
        let completed = self
            .requested
            .iter()
            .filter(|name| {
                self.services
                    .get(name)
                    .map(|r| r.status.is_terminal())
                    .unwrap_or(false)
            })
            .count();

        let percentage = if total == 0 {
            0
        } else {
            ((completed * 100) / total) as u8
        };

        Progress {
            completed_services: completed,
            total_services: total,
            percentage,
        }
    }

    /// Recompute the overall status from the service map. This is the
    /// single source of truth for `status`; nothing else sets it.
    pub fn recompute_status(&mut self) {
        let results: Vec<&ServiceResult> = self
            .requested
            .iter()
            .filter_map(|name| self.services.get(name))
            .collect();

        let all_terminal = !results.is_empty() && results.iter().all(|r| r.status.is_terminal());

        self.status = if all_terminal {
            let succeeded = results
                .iter()
                .filter(|r| r.status == ServiceStatus::Success)
                .count();
            let derived = if succeeded == results.len() {
                ScanStatus::Completed
            } else if succeeded == 0 {
                ScanStatus::Failed
            } else {
                ScanStatus::Partial
            };
            if self.completed_at.is_none() {
                self.completed_at = Some(Utc::now());
            }
            derived
        } else if self.started_at.is_some() {
            ScanStatus::Running
        } else {
            ScanStatus::Pending
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_service_context() -> ScanContext {
        ScanContext::new(
            "https://example.com".to_string(),
            PlanTier::Pro,
            vec![ServiceName::Accessibility, ServiceName::Backlinks],
        )
    }

    fn settle(ctx: &mut ScanContext, name: ServiceName, status: ServiceStatus) {
        let slot = ctx.services.get_mut(&name).unwrap();
        slot.status = status;
        if status == ServiceStatus::Failed {
            slot.error = Some(ServiceError::new(
                error_codes::SERVICE_ERROR,
                "boom",
                true,
            ));
        }
        ctx.recompute_status();
    }

    #[test]
    fn test_new_context_has_every_service_slot() {
        let ctx = two_service_context();
        assert_eq!(ctx.status, ScanStatus::Pending);
        assert_eq!(ctx.services.len(), ServiceName::ALL.len());
        for slot in ctx.services.values() {
            assert_eq!(slot.status, ServiceStatus::Pending);
            assert!(slot.issues.is_empty());
        }
    }

    #[test]
    fn test_all_success_yields_completed() {
        let mut ctx = two_service_context();
        ctx.started_at = Some(Utc::now());
        settle(&mut ctx, ServiceName::Accessibility, ServiceStatus::Success);
        assert_eq!(ctx.status, ScanStatus::Running);
        settle(&mut ctx, ServiceName::Backlinks, ServiceStatus::Success);
        assert_eq!(ctx.status, ScanStatus::Completed);
        assert!(ctx.completed_at.is_some());
        assert_eq!(ctx.progress().percentage, 100);
    }

    #[test]
    fn test_mixed_outcome_yields_partial() {
        let mut ctx = two_service_context();
        ctx.started_at = Some(Utc::now());
        settle(&mut ctx, ServiceName::Accessibility, ServiceStatus::Success);
        settle(&mut ctx, ServiceName::Backlinks, ServiceStatus::Failed);
        assert_eq!(ctx.status, ScanStatus::Partial);
    }

    #[test]
    fn test_all_failed_yields_failed_at_full_progress() {
        let mut ctx = two_service_context();
        ctx.started_at = Some(Utc::now());
        settle(&mut ctx, ServiceName::Accessibility, ServiceStatus::Failed);
        settle(&mut ctx, ServiceName::Backlinks, ServiceStatus::Failed);
        assert_eq!(ctx.status, ScanStatus::Failed);
        // Failed services still count as completed for progress purposes.
        assert_eq!(ctx.progress().percentage, 100);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut ctx = ScanContext::new(
            "https://example.com".to_string(),
            PlanTier::Pro,
            ServiceName::ALL.to_vec(),
        );
        ctx.started_at = Some(Utc::now());

        let mut last = ctx.progress().percentage;
        for (i, name) in ServiceName::ALL.iter().enumerate() {
            let status = if i % 2 == 0 {
                ServiceStatus::Success
            } else {
                ServiceStatus::Failed
            };
            settle(&mut ctx, *name, status);
            let now = ctx.progress().percentage;
            assert!(now >= last, "progress decreased from {} to {}", last, now);
            last = now;
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn test_percentage_uses_floor() {
        let mut ctx = ScanContext::new(
            "https://example.com".to_string(),
            PlanTier::Pro,
            vec![
                ServiceName::Accessibility,
                ServiceName::Backlinks,
                ServiceName::Schema,
            ],
        );
        ctx.started_at = Some(Utc::now());
        settle(&mut ctx, ServiceName::Accessibility, ServiceStatus::Success);
        assert_eq!(ctx.progress().percentage, 33);
    }

    #[test]
    fn test_status_is_pure_function_of_services() {
        let mut ctx = two_service_context();
        ctx.started_at = Some(Utc::now());

        // Whatever the status field held before, recompute derives it
        // from the map alone.
        ctx.status = ScanStatus::Completed;
        ctx.recompute_status();
        assert_eq!(ctx.status, ScanStatus::Running);

        settle(&mut ctx, ServiceName::Accessibility, ServiceStatus::Success);
        settle(&mut ctx, ServiceName::Backlinks, ServiceStatus::Success);
        ctx.status = ScanStatus::Failed;
        ctx.recompute_status();
        assert_eq!(ctx.status, ScanStatus::Completed);
    }
}
