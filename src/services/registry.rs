use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::ApiError,
    models::{Issue, PlanTier, ServiceName},
};

/// Per-invocation configuration passed to an analyzer.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub plan: PlanTier,
    pub options: Value,
}

/// What an analysis function is expected to return on success.
#[derive(Debug, Clone)]
pub struct ServiceOutcome {
    /// 0-100 when present.
    pub score: Option<f64>,
    pub data: Option<Value>,
    pub issues: Vec<Issue>,
}

/// One independent, stateless analysis check. Implementations live outside
/// the orchestration core; the core only relies on this contract.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, url: &str, config: &AnalyzerConfig)
        -> anyhow::Result<ServiceOutcome>;
}

/// Validates an analyzer's success payload against the expected shape.
/// A violation is reported as a distinct failure rather than propagated
/// as success.
pub fn validate_outcome(outcome: &ServiceOutcome) -> Result<(), String> {
    if let Some(score) = outcome.score {
        if !(0.0..=100.0).contains(&score) || !score.is_finite() {
            return Err(format!("score {} is outside the 0-100 range", score));
        }
    }
    Ok(())
}

/// Fixed mapping from service name to analysis function. Unknown names are
/// unrepresentable (`ServiceName` is a closed enum); duplicates are
/// rejected at registration time.
pub struct ServiceRegistry {
    analyzers: HashMap<ServiceName, Arc<dyn Analyzer>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            analyzers: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        name: ServiceName,
        analyzer: Arc<dyn Analyzer>,
    ) -> Result<(), ApiError> {
        if self.analyzers.contains_key(&name) {
            return Err(ApiError::validation(format!(
                "analyzer for service '{}' is already registered",
                name
            )));
        }
        self.analyzers.insert(name, analyzer);
        Ok(())
    }

    pub fn get(&self, name: ServiceName) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.get(&name).cloned()
    }

    pub fn registered(&self) -> Vec<ServiceName> {
        let mut names: Vec<ServiceName> = self.analyzers.keys().copied().collect();
        names.sort();
        names
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
