use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use url::Url;

use crate::{
    config::Settings,
    error::ApiError,
    models::{CacheStats, PlanTier, ScanReport, ServiceName},
};

#[derive(Debug, Clone)]
struct CacheEntry {
    report: ScanReport,
    expires_at: DateTime<Utc>,
}

/// Caches completed scan reports keyed by normalized URL, sorted service
/// set and plan tier. Lower tiers get shorter TTLs, so the same URL may be
/// cached differently depending on who asked.
pub struct ScanCache {
    entries: DashMap<String, CacheEntry>,
    settings: Arc<Settings>,
}

/// Normalizes a URL for stable comparison: lowercased scheme and host,
/// default ports stripped, a single trailing slash stripped (root path
/// kept). Two inputs that normalize identically produce the same key.
pub fn normalize_url(raw: &str) -> Result<String, ApiError> {
    let parsed = Url::parse(raw)
        .map_err(|e| ApiError::validation(format!("malformed URL '{}': {}", raw, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::validation(format!(
            "unsupported URL scheme '{}'",
            parsed.scheme()
        )));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| ApiError::validation(format!("URL '{}' has no host", raw)))?
        .to_lowercase();

    // Url::parse already drops a port matching the scheme default.
    let port = match parsed.port() {
        Some(p) => format!(":{}", p),
        None => String::new(),
    };

    let mut path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        path.pop();
    }

    let query = parsed
        .query()
        .map(|q| format!("?{}", q))
        .unwrap_or_default();

    Ok(format!(
        "{}://{}{}{}{}",
        parsed.scheme(),
        host,
        port,
        path,
        query
    ))
}

/// Stable cache key: service names are sorted before hashing so selection
/// order never affects the key.
pub fn generate_cache_key(
    normalized_url: &str,
    services: &[ServiceName],
    tier: PlanTier,
) -> String {
    let mut names: Vec<&str> = services.iter().map(|s| s.as_str()).collect();
    names.sort_unstable();
    names.dedup();

    let mut hasher = Sha256::new();
    hasher.update(normalized_url.as_bytes());
    hasher.update(b"|");
    hasher.update(names.join(",").as_bytes());
    hasher.update(b"|");
    hasher.update(tier.to_string().as_bytes());

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

impl ScanCache {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            entries: DashMap::new(),
            settings,
        }
    }

    /// Returns the cached report only if an entry exists, has not expired
    /// and was stored for exactly this service set and tier; otherwise a
    /// miss. Never a partial or stale hit.
    pub fn get_cached_scan(
        &self,
        url: &str,
        services: &[ServiceName],
        tier: PlanTier,
    ) -> Result<Option<ScanReport>, ApiError> {
        let normalized = normalize_url(url)?;
        let key = generate_cache_key(&normalized, services, tier);

        let hit = self.entries.get(&key).and_then(|entry| {
            if Utc::now() < entry.expires_at {
                let mut report = entry.report.clone();
                report.cached = true;
                Some(report)
            } else {
                None
            }
        });

        Ok(hit)
    }

    /// Stores a terminal scan snapshot with an expiry from the plan's TTL.
    /// A zero TTL tier is never stored. Re-writing the same key is
    /// harmless.
    pub fn cache_scan_result(
        &self,
        report: &ScanReport,
        services: &[ServiceName],
        tier: PlanTier,
    ) -> Result<(), ApiError> {
        let ttl = self.settings.plans.get(tier).cache_ttl_secs;
        if ttl <= 0 {
            tracing::debug!(tier = %tier, "tier has no cache TTL, skipping store");
            return Ok(());
        }

        let normalized = normalize_url(&report.url)?;
        let key = generate_cache_key(&normalized, services, tier);
        self.entries.insert(
            key,
            CacheEntry {
                report: report.clone(),
                expires_at: Utc::now() + Duration::seconds(ttl),
            },
        );
        Ok(())
    }

    /// Explicit removal across all tiers, used when a caller forces a
    /// fresh scan.
    pub fn invalidate(&self, url: &str, services: &[ServiceName]) -> Result<(), ApiError> {
        let normalized = normalize_url(url)?;
        for tier in [PlanTier::Guest, PlanTier::Free, PlanTier::Pro] {
            let key = generate_cache_key(&normalized, services, tier);
            self.entries.remove(&key);
        }
        Ok(())
    }

    /// Sweep removing entries past expiry. Lookups already check expiry,
    /// so this only reclaims memory.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before - self.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let total = self.entries.len();
        let valid = self
            .entries
            .iter()
            .filter(|entry| now < entry.expires_at)
            .count();

        CacheStats {
            total_entries: total,
            valid_entries: valid,
            expired_entries: total - valid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Progress, ScanStatus};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn settings() -> Arc<Settings> {
        Arc::new(Settings::new_with_env_file(false).unwrap())
    }

    fn report_for(url: &str) -> ScanReport {
        ScanReport {
            scan_id: Uuid::new_v4(),
            url: url.to_string(),
            status: ScanStatus::Completed,
            cached: false,
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
            progress: Progress {
                completed_services: 2,
                total_services: 2,
                percentage: 100,
            },
            services: BTreeMap::new(),
        }
    }

    const TWO: [ServiceName; 2] = [ServiceName::Accessibility, ServiceName::Schema];

    #[test]
    fn test_normalize_is_case_and_slash_insensitive() {
        assert_eq!(
            normalize_url("https://EXAMPLE.com/").unwrap(),
            normalize_url("https://example.com").unwrap()
        );
    }

    #[test]
    fn test_normalize_strips_default_port_only() {
        assert_eq!(
            normalize_url("https://example.com:443/page").unwrap(),
            "https://example.com/page"
        );
        assert_eq!(
            normalize_url("http://example.com:80/page").unwrap(),
            "http://example.com/page"
        );
        assert_eq!(
            normalize_url("https://example.com:8443/page").unwrap(),
            "https://example.com:8443/page"
        );
    }

    #[test]
    fn test_normalize_strips_single_trailing_slash_not_root() {
        assert_eq!(
            normalize_url("https://example.com/docs/").unwrap(),
            "https://example.com/docs"
        );
        assert_eq!(
            normalize_url("https://example.com/").unwrap(),
            "https://example.com/"
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_url("not a url").is_err());
        assert!(normalize_url("ftp://example.com").is_err());
    }

    #[test]
    fn test_cache_key_is_order_independent() {
        let url = "https://example.com";
        let forward = generate_cache_key(
            url,
            &[ServiceName::Accessibility, ServiceName::Backlinks],
            PlanTier::Pro,
        );
        let reverse = generate_cache_key(
            url,
            &[ServiceName::Backlinks, ServiceName::Accessibility],
            PlanTier::Pro,
        );
        assert_eq!(forward, reverse);
    }

    #[test]
    fn test_cache_key_varies_by_tier_and_set() {
        let url = "https://example.com";
        let pro = generate_cache_key(url, &TWO, PlanTier::Pro);
        let free = generate_cache_key(url, &TWO, PlanTier::Free);
        let smaller = generate_cache_key(url, &TWO[..1], PlanTier::Pro);
        assert_ne!(pro, free);
        assert_ne!(pro, smaller);
    }

    #[test]
    fn test_store_and_hit_within_ttl() {
        let cache = ScanCache::new(settings());
        let report = report_for("https://example.com/page");

        cache
            .cache_scan_result(&report, &TWO, PlanTier::Pro)
            .unwrap();

        // Differently-written but identically-normalizing URL still hits.
        let hit = cache
            .get_cached_scan("https://EXAMPLE.com/page/", &TWO, PlanTier::Pro)
            .unwrap()
            .expect("expected cache hit");
        assert!(hit.cached);
        assert_eq!(hit.scan_id, report.scan_id);
    }

    #[test]
    fn test_zero_ttl_tier_never_hits() {
        let cache = ScanCache::new(settings());
        let report = report_for("https://example.com");

        cache
            .cache_scan_result(&report, &TWO, PlanTier::Guest)
            .unwrap();

        let hit = cache
            .get_cached_scan("https://example.com", &TWO, PlanTier::Guest)
            .unwrap();
        assert!(hit.is_none());
    }

    #[test]
    fn test_invalidate_removes_entry() {
        let cache = ScanCache::new(settings());
        let report = report_for("https://example.com");

        cache
            .cache_scan_result(&report, &TWO, PlanTier::Pro)
            .unwrap();
        cache.invalidate("https://example.com", &TWO).unwrap();

        let hit = cache
            .get_cached_scan("https://example.com", &TWO, PlanTier::Pro)
            .unwrap();
        assert!(hit.is_none());
    }

    #[test]
    fn test_stats_and_cleanup() {
        let cache = ScanCache::new(settings());
        let report = report_for("https://example.com");
        cache
            .cache_scan_result(&report, &TWO, PlanTier::Pro)
            .unwrap();

        let stats = cache.stats();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.valid_entries, 1);
        assert_eq!(stats.expired_entries, 0);

        // Force the entry past expiry and sweep it.
        for mut entry in cache.entries.iter_mut() {
            entry.expires_at = Utc::now() - Duration::seconds(1);
        }
        assert_eq!(cache.stats().expired_entries, 1);
        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.stats().total_entries, 0);
    }
}
