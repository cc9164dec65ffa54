use serde::{Deserialize, Deserializer};

use crate::models::PlanTable;

/// Custom deserializer for comma-separated strings
fn deserialize_comma_separated<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        Ok(Vec::new())
    } else {
        Ok(s.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }
}

/// Application settings with environment variable support.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    // Server
    pub bind_port: u16,

    // Logging
    pub log_level: String,
    pub log_format: String,

    // Security
    #[serde(deserialize_with = "deserialize_comma_separated")]
    pub cors_allow_origins: Vec<String>,

    // Transport rate limiting (outer guard, applied per client IP)
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window_seconds: u32,

    // Scan execution
    /// Per-service execution ceiling.
    pub service_timeout_seconds: f64,
    /// Global ceiling for one scan; past it the scan finalizes with
    /// whatever services settled.
    pub scan_timeout_seconds: f64,
    pub max_concurrent_scans: u32,

    // Suspicious-caller heuristics
    pub suspicious_failure_ratio: f64,
    pub suspicious_min_requests: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,

    /// Per-tier quotas, retry ceilings, cache TTLs and allowed services.
    /// Owned by configuration, never mutated by the orchestration core.
    #[serde(skip, default)]
    pub plans: PlanTable,
}

impl Settings {
    /// Create new settings instance from environment variables and .env file
    pub fn new() -> Result<Self, config::ConfigError> {
        Self::new_with_env_file(true)
    }

    /// Create new settings instance with optional .env file loading
    pub fn new_with_env_file(load_env_file: bool) -> Result<Self, config::ConfigError> {
        if load_env_file {
            let _ = dotenvy::dotenv();
        }

        let settings: Settings = config::Config::builder()
            .set_default("bind_port", 8000)?
            .set_default("log_level", "info")?
            .set_default("log_format", "plain")?
            .set_default("cors_allow_origins", "*")?
            .set_default("rate_limit_enabled", true)?
            .set_default("rate_limit_requests", 100)?
            .set_default("rate_limit_window_seconds", 60)?
            .set_default("service_timeout_seconds", 30.0)?
            .set_default("scan_timeout_seconds", 120.0)?
            .set_default("max_concurrent_scans", 10)?
            .set_default("suspicious_failure_ratio", 0.7)?
            .set_default("suspicious_min_requests", 10)?
            .set_default("backoff_base_ms", 250)?
            .set_default("backoff_max_ms", 8_000)?
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.service_timeout_seconds <= 0.0 {
            return Err(config::ConfigError::Message(
                "service_timeout_seconds must be positive".to_string(),
            ));
        }
        if self.scan_timeout_seconds < self.service_timeout_seconds {
            return Err(config::ConfigError::Message(
                "scan_timeout_seconds must not be below service_timeout_seconds".to_string(),
            ));
        }
        if self.max_concurrent_scans == 0 {
            return Err(config::ConfigError::Message(
                "max_concurrent_scans must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.suspicious_failure_ratio) {
            return Err(config::ConfigError::Message(
                "suspicious_failure_ratio must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}
