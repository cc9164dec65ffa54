//! Built-in analyzers used by the default server wiring. These work from
//! URL structure alone and never touch the network; production deployments
//! register their own [`Analyzer`] implementations instead.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use url::Url;

use crate::{
    error::ApiError,
    models::{Issue, ServiceName, Severity},
    services::registry::{Analyzer, AnalyzerConfig, ServiceOutcome, ServiceRegistry},
};

fn parse(url: &str) -> anyhow::Result<Url> {
    Url::parse(url).map_err(|e| anyhow::anyhow!("unparseable URL '{}': {}", url, e))
}

fn issue(severity: Severity, message: &str, recommendation: &str) -> Issue {
    Issue {
        severity,
        message: message.to_string(),
        recommendation: recommendation.to_string(),
    }
}

/// Transport and path shape checks standing in for a full accessibility
/// audit.
struct AccessibilityAnalyzer;

#[async_trait]
impl Analyzer for AccessibilityAnalyzer {
    async fn analyze(&self, url: &str, _config: &AnalyzerConfig) -> anyhow::Result<ServiceOutcome> {
        let parsed = parse(url)?;
        let mut score: f64 = 100.0;
        let mut issues = Vec::new();

        if parsed.scheme() != "https" {
            score -= 30.0;
            issues.push(issue(
                Severity::Critical,
                "page is not served over HTTPS",
                "serve all pages over HTTPS",
            ));
        }
        if parsed.fragment().is_some() {
            score -= 10.0;
            issues.push(issue(
                Severity::Info,
                "URL carries a fragment",
                "link to the canonical URL without a fragment",
            ));
        }

        Ok(ServiceOutcome {
            score: Some(score.max(0.0)),
            data: Some(json!({ "scheme": parsed.scheme() })),
            issues,
        })
    }
}

/// Penalizes deep, noisy paths that tend to correlate with hard-to-read
/// pages.
struct ReadabilityAnalyzer;

#[async_trait]
impl Analyzer for ReadabilityAnalyzer {
    async fn analyze(&self, url: &str, _config: &AnalyzerConfig) -> anyhow::Result<ServiceOutcome> {
        let parsed = parse(url)?;
        let depth = parsed
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).count())
            .unwrap_or(0);

        let mut score = 100.0 - (depth.saturating_sub(3) as f64 * 10.0);
        let mut issues = Vec::new();
        if depth > 5 {
            score -= 10.0;
            issues.push(issue(
                Severity::Warning,
                "URL path is deeply nested",
                "flatten the URL hierarchy where possible",
            ));
        }

        Ok(ServiceOutcome {
            score: Some(score.clamp(0.0, 100.0)),
            data: Some(json!({ "path_depth": depth })),
            issues,
        })
    }
}

/// Flags URL patterns that commonly duplicate content: tracking query
/// parameters, session markers, mixed-case paths.
struct DuplicateContentAnalyzer;

#[async_trait]
impl Analyzer for DuplicateContentAnalyzer {
    async fn analyze(&self, url: &str, _config: &AnalyzerConfig) -> anyhow::Result<ServiceOutcome> {
        let parsed = parse(url)?;
        let mut score: f64 = 100.0;
        let mut issues = Vec::new();

        let tracking: Vec<String> = parsed
            .query_pairs()
            .map(|(k, _)| k.to_string())
            .filter(|k| k.starts_with("utm_") || k == "sessionid" || k == "fbclid")
            .collect();
        if !tracking.is_empty() {
            score -= 25.0;
            issues.push(issue(
                Severity::Warning,
                "URL carries tracking parameters",
                "canonicalize URLs without tracking parameters",
            ));
        }
        if parsed.path() != parsed.path().to_lowercase() {
            score -= 15.0;
            issues.push(issue(
                Severity::Info,
                "URL path mixes upper and lower case",
                "serve a single lowercase canonical path",
            ));
        }

        Ok(ServiceOutcome {
            score: Some(score.max(0.0)),
            data: Some(json!({ "tracking_params": tracking })),
            issues,
        })
    }
}

/// Scores link-friendliness of the host and path shape.
struct BacklinksAnalyzer;

#[async_trait]
impl Analyzer for BacklinksAnalyzer {
    async fn analyze(&self, url: &str, _config: &AnalyzerConfig) -> anyhow::Result<ServiceOutcome> {
        let parsed = parse(url)?;
        let host = parsed.host_str().unwrap_or_default();
        let mut score: f64 = 80.0;
        let mut issues = Vec::new();

        if host.starts_with("www.") {
            score += 5.0;
        }
        if host.matches('-').count() > 2 {
            score -= 20.0;
            issues.push(issue(
                Severity::Warning,
                "hyphen-heavy domains attract fewer organic links",
                "prefer a short brandable domain",
            ));
        }
        if parsed.path().len() > 80 {
            score -= 10.0;
            issues.push(issue(
                Severity::Info,
                "URL is long and unlikely to be linked verbatim",
                "shorten the URL",
            ));
        }

        Ok(ServiceOutcome {
            score: Some(score.clamp(0.0, 100.0)),
            data: Some(json!({ "host": host })),
            issues,
        })
    }
}

/// Checks whether the URL shape suggests structured-data-friendly pages.
struct SchemaAnalyzer;

#[async_trait]
impl Analyzer for SchemaAnalyzer {
    async fn analyze(&self, url: &str, _config: &AnalyzerConfig) -> anyhow::Result<ServiceOutcome> {
        let parsed = parse(url)?;
        let path = parsed.path().to_lowercase();
        let structured_hint = ["product", "article", "recipe", "event", "faq"]
            .iter()
            .any(|kind| path.contains(kind));

        let mut issues = Vec::new();
        if !structured_hint {
            issues.push(issue(
                Severity::Info,
                "no structured-data page type recognized from the URL",
                "add schema.org markup appropriate for the page type",
            ));
        }

        Ok(ServiceOutcome {
            score: Some(if structured_hint { 90.0 } else { 70.0 }),
            data: Some(json!({ "structured_hint": structured_hint })),
            issues,
        })
    }
}

/// Detects language markers in the URL and rewards explicit locale paths.
struct MultiLanguageAnalyzer;

#[async_trait]
impl Analyzer for MultiLanguageAnalyzer {
    async fn analyze(&self, url: &str, _config: &AnalyzerConfig) -> anyhow::Result<ServiceOutcome> {
        let parsed = parse(url)?;
        let first_segment = parsed
            .path_segments()
            .and_then(|mut s| s.next().map(|p| p.to_string()))
            .unwrap_or_default();
        let locale_path = first_segment.len() == 2
            || (first_segment.len() == 5 && first_segment.as_bytes().get(2) == Some(&b'-'));

        let mut issues = Vec::new();
        if !locale_path {
            issues.push(issue(
                Severity::Info,
                "no locale segment in the URL path",
                "use /en/, /de/ style locale prefixes for translated pages",
            ));
        }

        Ok(ServiceOutcome {
            score: Some(if locale_path { 95.0 } else { 75.0 }),
            data: Some(json!({ "locale_segment": locale_path.then_some(first_segment) })),
            issues,
        })
    }
}

/// Keyword extraction from the URL slug, standing in for position data.
struct RankTrackingAnalyzer;

#[async_trait]
impl Analyzer for RankTrackingAnalyzer {
    async fn analyze(&self, url: &str, _config: &AnalyzerConfig) -> anyhow::Result<ServiceOutcome> {
        let parsed = parse(url)?;
        let keywords: Vec<String> = parsed
            .path_segments()
            .map(|segments| {
                segments
                    .flat_map(|s| s.split('-'))
                    .filter(|w| w.len() > 3)
                    .map(|w| w.to_lowercase())
                    .collect()
            })
            .unwrap_or_default();

        let mut issues = Vec::new();
        if keywords.is_empty() {
            issues.push(issue(
                Severity::Warning,
                "URL slug carries no trackable keywords",
                "use descriptive hyphenated slugs",
            ));
        }

        Ok(ServiceOutcome {
            score: Some((60.0 + keywords.len() as f64 * 5.0).min(100.0)),
            data: Some(json!({ "keywords": keywords })),
            issues,
        })
    }
}

/// Registry with every built-in analyzer registered, one per fixed service
/// name.
pub fn default_registry() -> Result<ServiceRegistry, ApiError> {
    let mut registry = ServiceRegistry::new();
    registry.register(ServiceName::Accessibility, Arc::new(AccessibilityAnalyzer))?;
    registry.register(ServiceName::Readability, Arc::new(ReadabilityAnalyzer))?;
    registry.register(
        ServiceName::DuplicateContent,
        Arc::new(DuplicateContentAnalyzer),
    )?;
    registry.register(ServiceName::Backlinks, Arc::new(BacklinksAnalyzer))?;
    registry.register(ServiceName::Schema, Arc::new(SchemaAnalyzer))?;
    registry.register(ServiceName::MultiLanguage, Arc::new(MultiLanguageAnalyzer))?;
    registry.register(ServiceName::RankTracking, Arc::new(RankTrackingAnalyzer))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlanTier;
    use crate::services::registry::validate_outcome;

    fn config() -> AnalyzerConfig {
        AnalyzerConfig {
            plan: PlanTier::Pro,
            options: json!({}),
        }
    }

    #[tokio::test]
    async fn test_every_fixed_service_has_a_default_analyzer() {
        let registry = default_registry().unwrap();
        assert_eq!(registry.registered(), ServiceName::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_default_analyzers_honor_the_outcome_contract() {
        let registry = default_registry().unwrap();
        for name in ServiceName::ALL {
            let analyzer = registry.get(name).unwrap();
            let outcome = analyzer
                .analyze("https://example.com/blog/rust-async-guide", &config())
                .await
                .unwrap();
            assert!(validate_outcome(&outcome).is_ok(), "{} violated", name);
        }
    }

    #[tokio::test]
    async fn test_http_url_loses_accessibility_points() {
        let analyzer = AccessibilityAnalyzer;
        let secure = analyzer
            .analyze("https://example.com", &config())
            .await
            .unwrap();
        let insecure = analyzer
            .analyze("http://example.com", &config())
            .await
            .unwrap();
        assert!(secure.score > insecure.score);
        assert!(!insecure.issues.is_empty());
    }

    #[tokio::test]
    async fn test_scores_stay_in_range_under_stacked_penalties() {
        let accessibility = AccessibilityAnalyzer
            .analyze("http://example.com/page#frag", &config())
            .await
            .unwrap();
        assert!((0.0..=100.0).contains(&accessibility.score.unwrap()));

        let backlinks = BacklinksAnalyzer
            .analyze(
                "http://a-very-hyphen-heavy-host.example/this/is/one/remarkably/long/path/that/keeps/going/well/past/eighty/characters",
                &config(),
            )
            .await
            .unwrap();
        assert!((0.0..=100.0).contains(&backlinks.score.unwrap()));
    }

    #[tokio::test]
    async fn test_tracking_params_flag_duplicate_content() {
        let analyzer = DuplicateContentAnalyzer;
        let outcome = analyzer
            .analyze("https://example.com/page?utm_source=mail", &config())
            .await
            .unwrap();
        assert!(outcome.score < Some(100.0));
        assert!(!outcome.issues.is_empty());
    }

    #[tokio::test]
    async fn test_locale_prefix_is_recognized() {
        let analyzer = MultiLanguageAnalyzer;
        let with_locale = analyzer
            .analyze("https://example.com/en/about", &config())
            .await
            .unwrap();
        let without = analyzer
            .analyze("https://example.com/about", &config())
            .await
            .unwrap();
        assert!(with_locale.score > without.score);
    }
}
