//! LMDB-backed snapshot store.
//!
//! Uses the heed crate (Rust bindings for LMDB). The map size is the quota:
//! a write that does not fit fails with `MDB_MAP_FULL`, which is reported as
//! [`CacheError::QuotaExceeded`] so the cache can shed entries and retry.

use std::path::Path;

use hazmat_core::CacheError;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use super::snapshot::SnapshotStore;

/// Error type for opening the LMDB environment.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for hazmat_core::HazmatError {
    fn from(e: LmdbStoreError) -> Self {
        hazmat_core::HazmatError::Cache(CacheError::Persistence {
            reason: e.to_string(),
        })
    }
}

/// Snapshot store in a single unnamed LMDB database.
pub struct LmdbSnapshotStore {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl std::fmt::Debug for LmdbSnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbSnapshotStore")
            .field("path", &self.env.path())
            .finish()
    }
}

impl LmdbSnapshotStore {
    /// Open (or create) the store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Map size in megabytes, which bounds the snapshot size
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(Self { env, db })
    }
}

fn map_heed_error(bytes: usize, e: heed::Error) -> CacheError {
    match e {
        heed::Error::Mdb(heed::MdbError::MapFull) => CacheError::QuotaExceeded { bytes },
        other => CacheError::Persistence {
            reason: other.to_string(),
        },
    }
}

impl SnapshotStore for LmdbSnapshotStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let rtxn = self.env.read_txn().map_err(|e| map_heed_error(0, e))?;
        let value = self
            .db
            .get(&rtxn, key.as_bytes())
            .map_err(|e| map_heed_error(0, e))?;
        Ok(value.map(<[u8]>::to_vec))
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| map_heed_error(bytes.len(), e))?;
        self.db
            .put(&mut wtxn, key.as_bytes(), bytes)
            .map_err(|e| map_heed_error(bytes.len(), e))?;
        wtxn.commit().map_err(|e| map_heed_error(bytes.len(), e))
    }
}
