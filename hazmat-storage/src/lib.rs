//! hazmat Storage - TTL cache for hazard data
//!
//! Source records are expensive and rate-limited, so everything fetched is
//! cached with source-specific freshness and survives restarts through a
//! pluggable snapshot store (memory, JSON file, or LMDB).

pub mod cache;

use std::path::Path;
use std::sync::Arc;

use hazmat_core::{CacheSettings, HazmatResult, SharedClock};

pub use cache::{
    spawn_sweeper, sweep_task, CacheConfig, CacheEntry, CacheKey, CacheStats, CacheType,
    FetchOptions, FileSnapshotStore, LmdbSnapshotStore, LmdbStoreError, MemorySnapshotStore,
    SnapshotStore, SweepMetrics, SweepSnapshot, TtlCache,
};

/// Default LMDB map size in megabytes.
pub const DEFAULT_LMDB_MAP_SIZE_MB: usize = 64;

/// Build a cache from settings.
///
/// With no `persistence_path` the cache is memory-only. A path ending in
/// `.json` (or an existing plain file) is used as the JSON snapshot file
/// itself; any other path is opened as an LMDB environment directory.
pub fn open_cache(settings: &CacheSettings, clock: SharedClock) -> HazmatResult<TtlCache> {
    let config = CacheConfig::from(settings);
    let Some(path) = settings.persistence_path.as_deref() else {
        return Ok(TtlCache::new(config, clock));
    };
    let store = open_store(path)?;
    Ok(TtlCache::with_persistence(config, clock, store))
}

fn open_store(path: &Path) -> HazmatResult<Arc<dyn SnapshotStore>> {
    let is_json = path.extension().is_some_and(|ext| ext == "json") || path.is_file();
    if is_json {
        return Ok(Arc::new(FileSnapshotStore::at_file(path)));
    }
    Ok(Arc::new(LmdbSnapshotStore::new(path, DEFAULT_LMDB_MAP_SIZE_MB)?))
}
