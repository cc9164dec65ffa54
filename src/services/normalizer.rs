use std::collections::BTreeMap;

use crate::models::{ScanContext, ScanReport, ServiceName, ServiceReport};

/// Maps internal lifecycle state into the externally guaranteed contract.
/// Every fixed service name is present whether or not it ever ran, so the
/// shape is identical in flight, terminal or served from cache.
pub fn build_report(ctx: &ScanContext, cached: bool) -> ScanReport {
    let services: BTreeMap<ServiceName, ServiceReport> = ServiceName::ALL
        .iter()
        .map(|name| {
            let slot = ctx
                .services
                .get(name)
                .cloned()
                .unwrap_or_else(crate::models::ServiceResult::pending);
            (
                *name,
                ServiceReport {
                    status: slot.status,
                    score: slot.score,
                    data: slot.data,
                    issues: slot.issues,
                    error: slot.error,
                    execution_time_ms: slot.execution_time_ms,
                    retry: slot.retry,
                },
            )
        })
        .collect();

    ScanReport {
        scan_id: ctx.scan_id,
        url: ctx.url.clone(),
        status: ctx.status,
        cached,
        started_at: ctx.started_at,
        completed_at: ctx.completed_at,
        progress: ctx.progress(),
        services,
    }
}
