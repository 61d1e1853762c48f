//! Durable snapshot storage.
//!
//! The cache persists itself as one serialized blob under a fixed key. Stores
//! only move bytes; they know nothing about entries or TTLs.

use hazmat_core::CacheError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// `ENOSPC` on Linux and macOS.
const ENOSPC: i32 = 28;

/// Byte-level key/value storage for cache snapshots.
///
/// Implementations report a full store as [`CacheError::QuotaExceeded`] so
/// the cache can shed its shortest-lived partition and retry.
pub trait SnapshotStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError>;
}

// ============================================================================
// MEMORY
// ============================================================================

/// In-process store with an optional byte quota per key.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    quota_bytes: Option<usize>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Seed a raw blob, bypassing the quota.
    pub fn insert_raw(&self, key: &str, bytes: Vec<u8>) {
        if let Ok(mut blobs) = self.blobs.lock() {
            blobs.insert(key.to_string(), bytes);
        }
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let blobs = self.blobs.lock().map_err(|_| CacheError::LockPoisoned)?;
        Ok(blobs.get(key).cloned())
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        if let Some(quota) = self.quota_bytes {
            if bytes.len() > quota {
                return Err(CacheError::QuotaExceeded { bytes: bytes.len() });
            }
        }
        let mut blobs = self.blobs.lock().map_err(|_| CacheError::LockPoisoned)?;
        blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

// ============================================================================
// FILE
// ============================================================================

/// One JSON file per key inside a directory, or a single pinned file.
///
/// Writes go to a temporary sibling and are renamed into place, so a crash
/// mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
    file: Option<PathBuf>,
    quota_bytes: Option<usize>,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file: None,
            quota_bytes: None,
        }
    }

    /// Store every key in `path` itself.
    ///
    /// Meant for a cache holding one snapshot; distinct keys would overwrite
    /// each other.
    pub fn at_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            dir,
            file: Some(path),
            quota_bytes: None,
        }
    }

    pub fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        match &self.file {
            Some(file) => file.clone(),
            None => self.dir.join(format!("{}.json", key)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn io_error(bytes: usize, e: std::io::Error) -> CacheError {
    if e.raw_os_error() == Some(ENOSPC) {
        CacheError::QuotaExceeded { bytes }
    } else {
        CacheError::Persistence {
            reason: e.to_string(),
        }
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::Persistence {
                reason: e.to_string(),
            }),
        }
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        if let Some(quota) = self.quota_bytes {
            if bytes.len() > quota {
                return Err(CacheError::QuotaExceeded { bytes: bytes.len() });
            }
        }
        std::fs::create_dir_all(&self.dir).map_err(|e| io_error(bytes.len(), e))?;
        let target = self.path_for(key);
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.json", key));
        let tmp = self.dir.join(format!(".{}.tmp", file_name));
        std::fs::write(&tmp, bytes).map_err(|e| io_error(bytes.len(), e))?;
        std::fs::rename(&tmp, &target).map_err(|e| io_error(bytes.len(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemorySnapshotStore::new();
        assert_eq!(store.load("k").unwrap(), None);
        store.save("k", b"abc").unwrap();
        assert_eq!(store.load("k").unwrap(), Some(b"abc".to_vec()));
    }

    #[test]
    fn test_memory_store_quota() {
        let store = MemorySnapshotStore::with_quota(4);
        assert!(store.save("k", b"1234").is_ok());
        assert_eq!(
            store.save("k", b"12345"),
            Err(CacheError::QuotaExceeded { bytes: 5 })
        );
        // previous blob survives a rejected write
        assert_eq!(store.load("k").unwrap(), Some(b"1234".to_vec()));
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("nested"));
        assert_eq!(store.load("hazmat_cache").unwrap(), None);
        store.save("hazmat_cache", br#"{"a":1}"#).unwrap();
        assert_eq!(
            store.load("hazmat_cache").unwrap(),
            Some(br#"{"a":1}"#.to_vec())
        );
        assert!(store.path_for("hazmat_cache").exists());
    }

    #[test]
    fn test_file_store_pinned_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("cache.json");
        let store = FileSnapshotStore::at_file(&path);
        assert_eq!(store.dir(), dir.path().join("state"));
        store.save("hazmat_cache", b"[]").unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("state").join("hazmat_cache.json").exists());
        assert_eq!(store.load("hazmat_cache").unwrap(), Some(b"[]".to_vec()));
    }

    #[test]
    fn test_file_store_quota() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path()).with_quota(2);
        assert!(matches!(
            store.save("k", b"123"),
            Err(CacheError::QuotaExceeded { bytes: 3 })
        ));
    }
}
