//! Cache partitions and their freshness rules.
//!
//! Each upstream source has its own update cadence, so each partition carries
//! a fixed TTL. Callers pick the partition; the TTL follows.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

/// Closed set of cache partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    /// PubChem compound records, 7 days
    Pubchem,
    /// RxNorm concept records, 30 days
    Rxnorm,
    /// DailyMed label records, 24 hours
    Dailymed,
    /// Merged hazard assessments, 1 hour
    Assessment,
    /// NIOSH hazardous drug list, 365 days
    Niosh,
}

impl CacheType {
    pub const ALL: [CacheType; 5] = [
        CacheType::Pubchem,
        CacheType::Rxnorm,
        CacheType::Dailymed,
        CacheType::Assessment,
        CacheType::Niosh,
    ];

    pub fn ttl(&self) -> Duration {
        match self {
            Self::Pubchem => Duration::from_secs(7 * DAY),
            Self::Rxnorm => Duration::from_secs(30 * DAY),
            Self::Dailymed => Duration::from_secs(DAY),
            Self::Assessment => Duration::from_secs(HOUR),
            Self::Niosh => Duration::from_secs(365 * DAY),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pubchem => "pubchem",
            Self::Rxnorm => "rxnorm",
            Self::Dailymed => "dailymed",
            Self::Assessment => "assessment",
            Self::Niosh => "niosh",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Partition with the shortest TTL, the first to give up under quota pressure.
    pub fn shortest_ttl() -> Self {
        Self::ALL
            .into_iter()
            .min_by_key(|t| t.ttl())
            .unwrap_or(Self::Assessment)
    }
}

impl std::fmt::Display for CacheType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for `get_or_fetch`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Skip the cached value and always call the fetcher
    pub force_refresh: bool,
    /// Source label stored with the entry
    pub source: Option<String>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttls() {
        assert_eq!(CacheType::Pubchem.ttl(), Duration::from_secs(7 * 86_400));
        assert_eq!(CacheType::Rxnorm.ttl(), Duration::from_secs(30 * 86_400));
        assert_eq!(CacheType::Dailymed.ttl(), Duration::from_secs(86_400));
        assert_eq!(CacheType::Assessment.ttl(), Duration::from_secs(3_600));
        assert_eq!(CacheType::Niosh.ttl(), Duration::from_secs(365 * 86_400));
    }

    #[test]
    fn test_shortest_ttl_is_assessment() {
        assert_eq!(CacheType::shortest_ttl(), CacheType::Assessment);
    }

    #[test]
    fn test_parse_roundtrip() {
        for t in CacheType::ALL {
            assert_eq!(CacheType::parse(t.as_str()), Some(t));
        }
        assert_eq!(CacheType::parse("chembl"), None);
    }

    #[test]
    fn test_fetch_options_builder() {
        let opts = FetchOptions::new().force_refresh().with_source("pubchem");
        assert!(opts.force_refresh);
        assert_eq!(opts.source.as_deref(), Some("pubchem"));
    }
}
