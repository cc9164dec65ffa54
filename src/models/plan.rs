use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::ServiceName;

/// Subscription level of the caller. Governs quotas, retry ceilings,
/// cache TTLs and the service subset a scan may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Guest,
    Free,
    Pro,
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanTier::Guest => "guest",
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
        };
        f.write_str(s)
    }
}

impl FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(PlanTier::Guest),
            "free" => Ok(PlanTier::Free),
            "pro" => Ok(PlanTier::Pro),
            other => Err(format!("unknown plan tier '{}'", other)),
        }
    }
}

/// Static per-tier limits. Read-only at scan time; owned by configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    pub daily_scans: u32,
    pub retry_limit: u32,
    /// Cache TTL in seconds. Zero means results for this tier are never
    /// served from cache.
    pub cache_ttl_secs: i64,
    pub allowed_services: Vec<ServiceName>,
}

/// The full plan table, one entry per tier.
#[derive(Debug, Clone)]
pub struct PlanTable {
    guest: PlanConfig,
    free: PlanConfig,
    pro: PlanConfig,
}

impl PlanTable {
    pub fn get(&self, tier: PlanTier) -> &PlanConfig {
        match tier {
            PlanTier::Guest => &self.guest,
            PlanTier::Free => &self.free,
            PlanTier::Pro => &self.pro,
        }
    }
}

impl Default for PlanTable {
    fn default() -> Self {
        Self {
            guest: PlanConfig {
                daily_scans: 5,
                retry_limit: 0,
                cache_ttl_secs: 0,
                allowed_services: vec![
                    ServiceName::Accessibility,
                    ServiceName::Readability,
                    ServiceName::Schema,
                ],
            },
            free: PlanConfig {
                daily_scans: 25,
                retry_limit: 1,
                cache_ttl_secs: 3_600,
                allowed_services: vec![
                    ServiceName::Accessibility,
                    ServiceName::Readability,
                    ServiceName::DuplicateContent,
                    ServiceName::Schema,
                    ServiceName::MultiLanguage,
                ],
            },
            pro: PlanConfig {
                daily_scans: 500,
                retry_limit: 3,
                cache_ttl_secs: 86_400,
                allowed_services: ServiceName::ALL.to_vec(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parsing() {
        assert_eq!("pro".parse::<PlanTier>().unwrap(), PlanTier::Pro);
        assert!("platinum".parse::<PlanTier>().is_err());
    }

    #[test]
    fn test_guest_tier_has_no_cache() {
        let table = PlanTable::default();
        assert_eq!(table.get(PlanTier::Guest).cache_ttl_secs, 0);
    }

    #[test]
    fn test_pro_tier_allows_every_service() {
        let table = PlanTable::default();
        assert_eq!(
            table.get(PlanTier::Pro).allowed_services.len(),
            ServiceName::ALL.len()
        );
    }
}
