//! Cache statistics snapshot.

use super::cache_type::CacheType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point-in-time view of the cache. Derived on demand, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries currently in cache.
    pub total_items: usize,
    /// Approximate size of keys and payloads in bytes.
    pub size_in_bytes: usize,
    /// Entry count per partition.
    pub items_by_type: BTreeMap<CacheType, usize>,
    /// Number of lookups that returned a fresh value.
    pub hits: u64,
    /// Number of lookups that missed or found an expired value.
    pub misses: u64,
    /// Number of evictions due to capacity.
    pub evictions: u64,
    /// Number of persistence cycles that were abandoned.
    pub persistence_failures: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0) over all lookups.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn items_of(&self, cache_type: CacheType) -> usize {
        self.items_by_type.get(&cache_type).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_items_of_missing_partition() {
        let mut stats = CacheStats::default();
        stats.items_by_type.insert(CacheType::Niosh, 2);
        assert_eq!(stats.items_of(CacheType::Niosh), 2);
        assert_eq!(stats.items_of(CacheType::Rxnorm), 0);
    }
}
