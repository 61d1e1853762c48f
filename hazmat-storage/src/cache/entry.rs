//! Stored cache entries.

use super::cache_type::CacheType;
use chrono::{DateTime, Utc};
use hazmat_core::elapsed_between;
use serde::{Deserialize, Serialize};

/// Eviction credit per hit, in milliseconds (one hour).
const HIT_CREDIT_MS: i64 = 60 * 60 * 1000;

/// A cached value with its freshness metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub cache_type: CacheType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub hits: u64,
}

impl CacheEntry {
    pub fn new(
        data: serde_json::Value,
        cache_type: CacheType,
        source: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            data,
            timestamp: now,
            cache_type,
            source,
            hits: 0,
        }
    }

    /// Whether this entry has outlived its partition TTL at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        elapsed_between(self.timestamp, now) > self.cache_type.ttl()
    }

    /// Eviction score: insertion time plus one hour per hit. Lowest goes first.
    pub fn eviction_score(&self) -> i64 {
        let hits = i64::try_from(self.hits).unwrap_or(i64::MAX);
        self.timestamp
            .timestamp_millis()
            .saturating_add(hits.saturating_mul(HIT_CREDIT_MS))
    }

    /// Rough in-memory footprint used by `CacheStats::size_in_bytes`.
    pub fn approximate_size(&self, key: &str) -> usize {
        let data_len = serde_json::to_string(&self.data)
            .map(|s| s.len())
            .unwrap_or(0);
        key.len() + data_len + self.source.as_ref().map_or(0, String::len)
    }
}
