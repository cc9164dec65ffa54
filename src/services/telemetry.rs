use std::sync::Arc;
use tokio::sync::mpsc;

use crate::repositories::{MetricsRepository, ScanMetric, ServiceMetric};

enum TelemetryEvent {
    Scan(ScanMetric),
    Service(ServiceMetric),
}

/// Best-effort metrics side channel. Events are handed to a detached
/// consumer task over an unbounded queue; the main execution path never
/// waits on the sink and a sink failure never affects scan outcome.
#[derive(Clone)]
pub struct ScanTelemetry {
    tx: mpsc::UnboundedSender<TelemetryEvent>,
}

impl ScanTelemetry {
    /// Spawns the consumer task and returns the sending half.
    pub fn spawn(metrics: Arc<dyn MetricsRepository>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let result = match event {
                    TelemetryEvent::Scan(metric) => metrics.insert_scan_metric(metric).await,
                    TelemetryEvent::Service(metric) => {
                        metrics.insert_service_metric(metric).await
                    }
                };
                if let Err(e) = result {
                    // Fail-open: telemetry loss is logged and discarded.
                    tracing::warn!(error = %e, "failed to record scan metric");
                }
            }
        });

        Self { tx }
    }

    pub fn record_scan(&self, metric: ScanMetric) {
        let _ = self.tx.send(TelemetryEvent::Scan(metric));
    }

    pub fn record_service(&self, metric: ServiceMetric) {
        let _ = self.tx.send(TelemetryEvent::Service(metric));
    }
}
