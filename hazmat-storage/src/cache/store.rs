//! Type-partitioned TTL cache.
//!
//! One mutex guards the entry map, eviction, the expiry sweep and the
//! persistence writer. The guard is never held across an `.await`: fetchers
//! run with the lock released and results are written back afterwards.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use hazmat_core::{system_clock, CacheError, CacheSettings, HazmatResult, SharedClock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::cache_type::{CacheType, FetchOptions};
use super::entry::CacheEntry;
use super::key::CacheKey;
use super::snapshot::SnapshotStore;
use super::stats::CacheStats;

/// Configuration for the TTL cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum number of entries before eviction kicks in.
    pub max_entries: usize,
    /// Fixed key the snapshot is stored under.
    pub storage_key: String,
    /// How often the background sweeper purges expired entries.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            storage_key: "hazmat_cache".to_string(),
            sweep_interval: Duration::from_secs(3600),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max.max(1);
        self
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self::new()
            .with_max_entries(settings.max_entries)
            .with_storage_key(settings.storage_key.clone())
            .with_sweep_interval(settings.sweep_interval())
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
    persistence_failures: u64,
}

enum Lookup {
    Fresh(serde_json::Value),
    Stale(serde_json::Value),
    Miss,
}

/// In-memory TTL cache with optional durable snapshots.
///
/// # Example
///
/// ```ignore
/// let cache = TtlCache::new(CacheConfig::default(), system_clock());
/// let record: HazardAssessment = cache
///     .get_or_fetch("50-18-0", CacheType::Niosh, FetchOptions::new(), || async {
///         niosh.lookup("50-18-0").await
///     })
///     .await?;
/// ```
pub struct TtlCache {
    state: Mutex<CacheState>,
    store: Option<Arc<dyn SnapshotStore>>,
    clock: SharedClock,
    config: CacheConfig,
}

impl std::fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("config", &self.config)
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl TtlCache {
    /// Create a memory-only cache.
    pub fn new(config: CacheConfig, clock: SharedClock) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            store: None,
            clock,
            config,
        }
    }

    /// Memory-only cache with default config and system time.
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default(), system_clock())
    }

    /// Create a cache backed by `store`, rehydrating any saved snapshot.
    ///
    /// Records with an unknown partition, a malformed shape or an expired
    /// timestamp are dropped during rehydration.
    pub fn with_persistence(
        config: CacheConfig,
        clock: SharedClock,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        let now = clock.now();
        let entries = rehydrate(store.as_ref(), &config.storage_key, now);
        let mut state = CacheState {
            entries,
            ..Default::default()
        };
        while state.entries.len() > config.max_entries {
            evict_one(&mut state);
        }
        Self {
            state: Mutex::new(state),
            store: Some(store),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, CacheState>, CacheError> {
        self.state.lock().map_err(|_| CacheError::LockPoisoned)
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Get a fresh value, or `None` on miss or expiry.
    ///
    /// An expired entry is deleted on read. A hit increments the entry's hit
    /// counter, which protects it from eviction.
    pub fn get<T: DeserializeOwned>(&self, key: &str, cache_type: CacheType) -> Option<T> {
        match self.lookup(key, cache_type, true) {
            Lookup::Fresh(value) => decode(key, value),
            Lookup::Stale(_) | Lookup::Miss => None,
        }
    }

    /// Whether an unexpired entry exists. Does not count as a lookup.
    pub fn contains(&self, key: &str, cache_type: CacheType) -> bool {
        let full = CacheKey::new(cache_type, key).encode();
        let now = self.clock.now();
        self.lock()
            .map(|state| {
                state
                    .entries
                    .get(&full)
                    .is_some_and(|entry| !entry.is_expired_at(now))
            })
            .unwrap_or(false)
    }

    fn lookup(&self, key: &str, cache_type: CacheType, remove_expired: bool) -> Lookup {
        let full = CacheKey::new(cache_type, key).encode();
        let now = self.clock.now();
        let mut state = match self.lock() {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "cache unavailable, treating lookup as miss");
                return Lookup::Miss;
            }
        };

        let expired = match state.entries.get(&full) {
            None => {
                state.misses += 1;
                return Lookup::Miss;
            }
            Some(entry) => entry.is_expired_at(now),
        };

        if expired {
            state.misses += 1;
            let stale = if remove_expired {
                state.entries.remove(&full).map(|entry| entry.data)
            } else {
                state.entries.get(&full).map(|entry| entry.data.clone())
            };
            return stale.map_or(Lookup::Miss, Lookup::Stale);
        }

        state.hits += 1;
        match state.entries.get_mut(&full) {
            Some(entry) => {
                entry.hits += 1;
                Lookup::Fresh(entry.data.clone())
            }
            None => Lookup::Miss,
        }
    }

    /// Raw stored value regardless of expiry. Does not count as a lookup.
    fn peek(&self, key: &str, cache_type: CacheType) -> Option<serde_json::Value> {
        let full = CacheKey::new(cache_type, key).encode();
        self.lock()
            .ok()
            .and_then(|state| state.entries.get(&full).map(|entry| entry.data.clone()))
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Insert or overwrite an entry, then persist a snapshot.
    ///
    /// When inserting a new key at capacity, the entry with the lowest
    /// eviction score is removed first. Persistence failures never fail the
    /// write; memory stays authoritative. A snapshot over quota is retried
    /// without the assessment partition, which is then only held in memory.
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
        cache_type: CacheType,
        source: Option<&str>,
    ) -> HazmatResult<()> {
        let data = serde_json::to_value(data).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        let full = CacheKey::new(cache_type, key).encode();
        let now = self.clock.now();

        let mut state = self.lock()?;
        if !state.entries.contains_key(&full) {
            while state.entries.len() >= self.config.max_entries {
                if !evict_one(&mut state) {
                    break;
                }
            }
        }
        state.entries.insert(
            full,
            CacheEntry::new(data, cache_type, source.map(str::to_string), now),
        );
        self.persist(&mut state, now);
        Ok(())
    }

    /// Remove all entries, or only those of one partition. Returns the count removed.
    pub fn clear(&self, cache_type: Option<CacheType>) -> HazmatResult<usize> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        let removed = match cache_type {
            Some(t) => remove_partition(&mut state, t),
            None => {
                let n = state.entries.len();
                state.entries.clear();
                n
            }
        };
        debug!(removed, cache_type = ?cache_type, "cache cleared");
        self.persist(&mut state, now);
        Ok(removed)
    }

    /// Remove every expired entry. Returns the count removed.
    pub fn purge_expired(&self) -> HazmatResult<usize> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - state.entries.len();
        if removed > 0 {
            self.persist(&mut state, now);
        }
        Ok(removed)
    }

    // ========================================================================
    // READ-THROUGH
    // ========================================================================

    /// Return the cached value, or call `fetcher` and cache its result.
    ///
    /// With `force_refresh` the cached value is skipped. If the fetcher fails
    /// and any stored value exists for the key (expired or not), that value
    /// is returned instead of the error.
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        key: &str,
        cache_type: CacheType,
        opts: FetchOptions,
        fetcher: F,
    ) -> HazmatResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = HazmatResult<T>>,
    {
        let fallback = if opts.force_refresh {
            self.peek(key, cache_type)
        } else {
            match self.lookup(key, cache_type, false) {
                Lookup::Fresh(value) => {
                    if let Some(hit) = decode(key, value.clone()) {
                        return Ok(hit);
                    }
                    Some(value)
                }
                Lookup::Stale(value) => Some(value),
                Lookup::Miss => None,
            }
        };

        match fetcher().await {
            Ok(value) => {
                if let Err(e) = self.set(key, &value, cache_type, opts.source.as_deref()) {
                    warn!(key, cache_type = %cache_type, error = %e, "failed to cache fetched value");
                }
                Ok(value)
            }
            Err(err) => match fallback.and_then(|value| decode::<T>(key, value)) {
                Some(stale) => {
                    warn!(
                        key,
                        cache_type = %cache_type,
                        error = %err,
                        "fetch failed, serving stale cache entry"
                    );
                    Ok(stale)
                }
                None => Err(err),
            },
        }
    }

    /// Look up many keys, fetching all misses in one batched call.
    ///
    /// A failed batch fetch is not an error: the cached hits are returned.
    pub async fn batch_get<T, S, F, Fut>(
        &self,
        keys: &[S],
        cache_type: CacheType,
        fetcher: F,
    ) -> HashMap<String, T>
    where
        T: Serialize + DeserializeOwned,
        S: AsRef<str>,
        F: FnOnce(Vec<String>) -> Fut,
        Fut: Future<Output = HazmatResult<HashMap<String, T>>>,
    {
        let mut results = HashMap::with_capacity(keys.len());
        let mut misses = Vec::new();

        for key in keys {
            let key = key.as_ref();
            match self.get::<T>(key, cache_type) {
                Some(value) => {
                    results.insert(key.to_string(), value);
                }
                None => misses.push(key.to_string()),
            }
        }

        if misses.is_empty() {
            return results;
        }

        let requested = misses.len();
        match fetcher(misses).await {
            Ok(fetched) => {
                for (key, value) in fetched {
                    if let Err(e) = self.set(&key, &value, cache_type, None) {
                        warn!(key = %key, error = %e, "failed to cache batch value");
                    }
                    results.insert(key, value);
                }
            }
            Err(e) => {
                warn!(
                    cache_type = %cache_type,
                    requested,
                    error = %e,
                    "batch fetch failed, returning cached hits only"
                );
            }
        }
        results
    }

    // ========================================================================
    // STATS
    // ========================================================================

    pub fn stats(&self) -> CacheStats {
        let Ok(state) = self.lock() else {
            return CacheStats::default();
        };

        let mut items_by_type = BTreeMap::new();
        let mut size_in_bytes = 0;
        let mut oldest: Option<DateTime<Utc>> = None;
        let mut newest: Option<DateTime<Utc>> = None;

        for (key, entry) in &state.entries {
            *items_by_type.entry(entry.cache_type).or_insert(0) += 1;
            size_in_bytes += entry.approximate_size(key);
            oldest = Some(oldest.map_or(entry.timestamp, |t| t.min(entry.timestamp)));
            newest = Some(newest.map_or(entry.timestamp, |t| t.max(entry.timestamp)));
        }

        CacheStats {
            total_items: state.entries.len(),
            size_in_bytes,
            items_by_type,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            persistence_failures: state.persistence_failures,
            oldest_entry: oldest,
            newest_entry: newest,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map(|state| state.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // PERSISTENCE
    // ========================================================================

    fn persist(&self, state: &mut CacheState, now: DateTime<Utc>) {
        let Some(store) = &self.store else {
            return;
        };

        let key = &self.config.storage_key;
        match write_snapshot(store.as_ref(), key, state, now, None) {
            Ok(()) => {}
            Err(CacheError::QuotaExceeded { bytes }) => {
                let shed = CacheType::shortest_ttl();
                warn!(bytes, shed = %shed, "snapshot quota exceeded, retrying without that partition");
                if let Err(e) = write_snapshot(store.as_ref(), key, state, now, Some(shed)) {
                    state.persistence_failures += 1;
                    warn!(error = %e, "snapshot retry failed, persistence skipped this cycle");
                }
            }
            Err(e) => {
                state.persistence_failures += 1;
                warn!(error = %e, "snapshot write failed, persistence skipped this cycle");
            }
        }
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: serde_json::Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            debug!(key, error = %e, "cached value does not match requested type");
            None
        }
    }
}

/// Remove the entry with the lowest eviction score. Ties break on key.
fn evict_one(state: &mut CacheState) -> bool {
    let victim = state
        .entries
        .iter()
        .min_by(|(ka, a), (kb, b)| {
            a.eviction_score()
                .cmp(&b.eviction_score())
                .then_with(|| ka.cmp(kb))
        })
        .map(|(key, _)| key.clone());

    match victim {
        Some(key) => {
            state.entries.remove(&key);
            state.evictions += 1;
            debug!(key = %key, "evicted cache entry");
            true
        }
        None => false,
    }
}

fn remove_partition(state: &mut CacheState, cache_type: CacheType) -> usize {
    let before = state.entries.len();
    state.entries.retain(|_, entry| entry.cache_type != cache_type);
    before - state.entries.len()
}

fn write_snapshot(
    store: &dyn SnapshotStore,
    storage_key: &str,
    state: &CacheState,
    now: DateTime<Utc>,
    skip: Option<CacheType>,
) -> Result<(), CacheError> {
    let live: BTreeMap<&String, &CacheEntry> = state
        .entries
        .iter()
        .filter(|(_, entry)| !entry.is_expired_at(now))
        .filter(|(_, entry)| Some(entry.cache_type) != skip)
        .collect();
    let bytes = serde_json::to_vec(&live).map_err(|e| CacheError::Serialization {
        reason: e.to_string(),
    })?;
    store.save(storage_key, &bytes)
}

fn rehydrate(
    store: &dyn SnapshotStore,
    storage_key: &str,
    now: DateTime<Utc>,
) -> HashMap<String, CacheEntry> {
    let bytes = match store.load(storage_key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return HashMap::new(),
        Err(e) => {
            warn!(error = %e, "failed to load cache snapshot, starting empty");
            return HashMap::new();
        }
    };

    let raw: serde_json::Map<String, serde_json::Value> = match serde_json::from_slice(&bytes) {
        Ok(map) => map,
        Err(e) => {
            warn!(error = %e, "cache snapshot is not a JSON object, starting empty");
            return HashMap::new();
        }
    };

    let mut entries = HashMap::with_capacity(raw.len());
    let mut dropped = 0usize;
    let mut expired = 0usize;

    for (key, value) in raw {
        let Some(parsed) = CacheKey::decode(&key) else {
            dropped += 1;
            continue;
        };
        let entry: CacheEntry = match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(_) => {
                dropped += 1;
                continue;
            }
        };
        if entry.cache_type != parsed.cache_type() {
            dropped += 1;
            continue;
        }
        if entry.is_expired_at(now) {
            expired += 1;
            continue;
        }
        entries.insert(key, entry);
    }

    debug!(loaded = entries.len(), dropped, expired, "cache snapshot rehydrated");
    entries
}

// ============================================================================
// TESTS
// ============================================================================
