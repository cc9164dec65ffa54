use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of analysis services a scan can run.
///
/// Dispatch is keyed on this enum rather than on raw strings so that an
/// unknown service name can never reach the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceName {
    Accessibility,
    Readability,
    DuplicateContent,
    Backlinks,
    Schema,
    MultiLanguage,
    RankTracking,
}

impl ServiceName {
    /// Every service in the fixed set, in canonical order.
    pub const ALL: [ServiceName; 7] = [
        ServiceName::Accessibility,
        ServiceName::Readability,
        ServiceName::DuplicateContent,
        ServiceName::Backlinks,
        ServiceName::Schema,
        ServiceName::MultiLanguage,
        ServiceName::RankTracking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::Accessibility => "accessibility",
            ServiceName::Readability => "readability",
            ServiceName::DuplicateContent => "duplicate_content",
            ServiceName::Backlinks => "backlinks",
            ServiceName::Schema => "schema",
            ServiceName::MultiLanguage => "multi_language",
            ServiceName::RankTracking => "rank_tracking",
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accessibility" => Ok(ServiceName::Accessibility),
            "readability" => Ok(ServiceName::Readability),
            "duplicate_content" => Ok(ServiceName::DuplicateContent),
            "backlinks" => Ok(ServiceName::Backlinks),
            "schema" => Ok(ServiceName::Schema),
            "multi_language" => Ok(ServiceName::MultiLanguage),
            "rank_tracking" => Ok(ServiceName::RankTracking),
            other => Err(format!("unknown service name '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_names() {
        for name in ServiceName::ALL {
            let parsed: ServiceName = name.as_str().parse().unwrap();
            assert_eq!(parsed, name);
        }
    }

    #[test]
    fn test_unknown_name_rejected() {
        let result = "lighthouse".parse::<ServiceName>();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("lighthouse"));
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&ServiceName::DuplicateContent).unwrap();
        assert_eq!(json, "\"duplicate_content\"");
    }
}
