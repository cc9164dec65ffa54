use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::{config::Settings, error::ApiError, models::PlanConfig};

/// Request kinds tracked independently per caller identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateAction {
    ScanCreate,
    Retry,
}

/// Outcome of a rate check for an allowed request. Suspicious identities
/// get a growing backoff delay instead of a hard block; the caller is
/// expected to await it before proceeding.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub remaining: u32,
    pub backoff: Option<Duration>,
}

#[derive(Debug, Default)]
struct SuspicionState {
    requests: u32,
    failures: u32,
    bot_agent: bool,
    strikes: u32,
}

const BOT_AGENT_MARKERS: [&str; 5] = ["bot", "curl", "wget", "python-requests", "scrapy"];

/// Sliding-window request limiter keyed by caller identity and action
/// type, with a daily scan quota per plan and suspicious-caller backoff.
pub struct RateLimitService {
    buckets: DashMap<(String, RateAction), Vec<DateTime<Utc>>>,
    suspicion: DashMap<String, SuspicionState>,
    settings: Arc<Settings>,
}

impl RateLimitService {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            buckets: DashMap::new(),
            suspicion: DashMap::new(),
            settings,
        }
    }

    /// Checks the burst window and, for scan creation, the daily plan
    /// quota. Records the request when allowed.
    pub fn check(
        &self,
        identity: &str,
        action: RateAction,
        plan: &PlanConfig,
        user_agent: Option<&str>,
    ) -> Result<RateDecision, ApiError> {
        if let Some(ua) = user_agent {
            self.note_user_agent(identity, ua);
        }

        let burst_window = ChronoDuration::seconds(self.settings.rate_limit_window_seconds as i64);
        let burst_count = self.count_window(identity, action, burst_window);
        if burst_count >= self.settings.rate_limit_requests {
            return Err(ApiError::rate_limit(format!(
                "{} requests in the last {}s from {}",
                burst_count, self.settings.rate_limit_window_seconds, identity
            )));
        }
        let mut remaining = self.settings.rate_limit_requests - burst_count - 1;

        if action == RateAction::ScanCreate {
            let daily = self.count_window(identity, action, ChronoDuration::days(1));
            if daily >= plan.daily_scans {
                return Err(ApiError::QuotaExceeded(format!(
                    "daily scan quota of {} reached",
                    plan.daily_scans
                )));
            }
            remaining = remaining.min(plan.daily_scans - daily - 1);
        }

        self.record_hit(identity, action);

        Ok(RateDecision {
            remaining,
            backoff: self.backoff_for(identity),
        })
    }

    /// Feeds the suspicion heuristics with a scan outcome.
    pub fn record_outcome(&self, identity: &str, success: bool) {
        let mut state = self.suspicion.entry(identity.to_string()).or_default();
        state.requests += 1;
        if !success {
            state.failures += 1;
        }
    }

    fn note_user_agent(&self, identity: &str, user_agent: &str) {
        let ua = user_agent.to_lowercase();
        if BOT_AGENT_MARKERS.iter().any(|marker| ua.contains(marker)) {
            let mut state = self.suspicion.entry(identity.to_string()).or_default();
            state.bot_agent = true;
        }
    }

    fn count_window(&self, identity: &str, action: RateAction, window: ChronoDuration) -> u32 {
        let cutoff = Utc::now() - window;
        self.buckets
            .get(&(identity.to_string(), action))
            .map(|hits| hits.iter().filter(|t| **t > cutoff).count() as u32)
            .unwrap_or(0)
    }

    fn record_hit(&self, identity: &str, action: RateAction) {
        let mut hits = self
            .buckets
            .entry((identity.to_string(), action))
            .or_default();
        // Drop anything older than the longest window we ever look at.
        let cutoff = Utc::now() - ChronoDuration::days(1);
        hits.retain(|t| *t > cutoff);
        hits.push(Utc::now());
    }

    /// Doubling delay per strike for suspicious identities, capped by
    /// configuration.
    fn backoff_for(&self, identity: &str) -> Option<Duration> {
        let mut state = self.suspicion.get_mut(identity)?;
        let enough_history = state.requests >= self.settings.suspicious_min_requests;
        let failure_heavy = enough_history
            && state.failures as f64 / state.requests as f64
                >= self.settings.suspicious_failure_ratio;

        if !(failure_heavy || state.bot_agent) {
            return None;
        }

        state.strikes += 1;
        let exponent = state.strikes.saturating_sub(1).min(16);
        let delay_ms = self
            .settings
            .backoff_base_ms
            .saturating_mul(1u64 << exponent)
            .min(self.settings.backoff_max_ms);

        tracing::warn!(
            identity = %identity,
            strikes = state.strikes,
            delay_ms,
            "applying backoff to suspicious caller"
        );
        Some(Duration::from_millis(delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PlanTier, ServiceName};

    fn settings() -> Arc<Settings> {
        let mut settings = Settings::new_with_env_file(false).unwrap();
        settings.rate_limit_requests = 3;
        settings.rate_limit_window_seconds = 60;
        settings.suspicious_min_requests = 4;
        settings.suspicious_failure_ratio = 0.5;
        settings.backoff_base_ms = 100;
        settings.backoff_max_ms = 400;
        Arc::new(settings)
    }

    fn plan(daily: u32) -> PlanConfig {
        PlanConfig {
            daily_scans: daily,
            retry_limit: 1,
            cache_ttl_secs: 60,
            allowed_services: ServiceName::ALL.to_vec(),
        }
    }

    #[test]
    fn test_burst_window_is_enforced_per_identity() {
        let limiter = RateLimitService::new(settings());
        let plan = plan(100);

        for _ in 0..3 {
            limiter
                .check("10.0.0.1", RateAction::ScanCreate, &plan, None)
                .unwrap();
        }
        let blocked = limiter.check("10.0.0.1", RateAction::ScanCreate, &plan, None);
        assert!(matches!(blocked, Err(ApiError::RateLimit(_))));

        // A different identity is unaffected.
        assert!(limiter
            .check("10.0.0.2", RateAction::ScanCreate, &plan, None)
            .is_ok());
    }

    #[test]
    fn test_remaining_counts_down() {
        let limiter = RateLimitService::new(settings());
        let plan = plan(100);

        let first = limiter
            .check("10.0.0.1", RateAction::Retry, &plan, None)
            .unwrap();
        let second = limiter
            .check("10.0.0.1", RateAction::Retry, &plan, None)
            .unwrap();
        assert_eq!(first.remaining, 2);
        assert_eq!(second.remaining, 1);
    }

    #[test]
    fn test_daily_quota_beats_burst_window() {
        let limiter = RateLimitService::new(settings());
        let plan = plan(1);

        limiter
            .check("10.0.0.1", RateAction::ScanCreate, &plan, None)
            .unwrap();
        let blocked = limiter.check("10.0.0.1", RateAction::ScanCreate, &plan, None);
        assert!(matches!(blocked, Err(ApiError::QuotaExceeded(_))));
    }

    #[test]
    fn test_actions_are_tracked_independently() {
        let limiter = RateLimitService::new(settings());
        let plan = plan(100);

        for _ in 0..3 {
            limiter
                .check("10.0.0.1", RateAction::Retry, &plan, None)
                .unwrap();
        }
        // Retry bucket is full but scan creation still passes.
        assert!(limiter
            .check("10.0.0.1", RateAction::ScanCreate, &plan, None)
            .is_ok());
    }

    #[test]
    fn test_bot_agent_gets_growing_backoff() {
        let limiter = RateLimitService::new(settings());
        let plan = plan(100);

        let first = limiter
            .check("10.0.0.9", RateAction::ScanCreate, &plan, Some("curl/8.0"))
            .unwrap();
        let second = limiter
            .check("10.0.0.9", RateAction::ScanCreate, &plan, Some("curl/8.0"))
            .unwrap();

        let first_delay = first.backoff.expect("bot agent should back off");
        let second_delay = second.backoff.expect("bot agent should back off");
        assert!(second_delay > first_delay);
        assert!(second_delay <= Duration::from_millis(400));
    }

    #[test]
    fn test_failure_heavy_identity_becomes_suspicious() {
        let limiter = RateLimitService::new(settings());
        let plan = plan(100);

        for _ in 0..4 {
            limiter.record_outcome("10.0.0.7", false);
        }
        let decision = limiter
            .check("10.0.0.7", RateAction::ScanCreate, &plan, Some("Mozilla/5.0"))
            .unwrap();
        assert!(decision.backoff.is_some());
    }

    #[test]
    fn test_clean_caller_has_no_backoff() {
        let limiter = RateLimitService::new(settings());
        let plan = plan(100);

        limiter.record_outcome("10.0.0.3", true);
        let decision = limiter
            .check("10.0.0.3", RateAction::ScanCreate, &plan, Some("Mozilla/5.0"))
            .unwrap();
        assert!(decision.backoff.is_none());
    }
}
