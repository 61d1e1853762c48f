//! Hazard source abstractions.
//!
//! A [`HazardSource`] is one opaque upstream (a chemical database, a NIOSH
//! list, a label service) that turns an identifier into a typed
//! [`HazardAssessment`]. Wire formats stay behind the trait.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use hazmat_core::{
    normalize_identifier, ConfigError, HazardAssessment, HazmatResult, Ingredient, SourceError,
};
use hazmat_storage::CacheType;

/// One external hazard data source.
#[async_trait]
pub trait HazardSource: Send + Sync {
    /// Stable name used for breakers, statistics and provenance.
    fn name(&self) -> &str;

    /// Static trust weight in `[0.0, 1.0]`.
    fn confidence(&self) -> f64;

    /// Cache partition this source's records live in.
    fn cache_type(&self) -> CacheType;

    /// Fetch the record for `identifier` (CAS number or ingredient name).
    async fn fetch(&self, identifier: &str) -> HazmatResult<HazardAssessment>;
}

/// Resolves an ingredient to a hazard record. Consumed by the risk engine.
///
/// Implementations may return a conservative default record rather than an
/// error; the engine treats both the same way.
#[async_trait]
pub trait HazardLookup: Send + Sync {
    async fn lookup(&self, ingredient: &Ingredient) -> HazmatResult<HazardAssessment>;
}

// ============================================================================
// DATASET SOURCE
// ============================================================================

/// Source backed by a static set of records, typically loaded from JSON.
///
/// Records are indexed by normalized ingredient name and by CAS number.
#[derive(Debug, Clone)]
pub struct DatasetHazardSource {
    name: String,
    confidence: f64,
    cache_type: CacheType,
    records: HashMap<String, HazardAssessment>,
}

impl DatasetHazardSource {
    pub fn from_records(
        name: impl Into<String>,
        confidence: f64,
        records: impl IntoIterator<Item = HazardAssessment>,
    ) -> Self {
        let mut index = HashMap::new();
        for record in records {
            if let Some(cas) = record.cas_number.as_deref().filter(|c| !c.trim().is_empty()) {
                index.insert(normalize_identifier(cas), record.clone());
            }
            index.insert(normalize_identifier(&record.ingredient_name), record);
        }
        Self {
            name: name.into(),
            confidence,
            cache_type: CacheType::Pubchem,
            records: index,
        }
    }

    /// Load a JSON array of [`HazardAssessment`] records.
    pub fn from_path(
        name: impl Into<String>,
        confidence: f64,
        path: &Path,
    ) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            reason: format!("{}: {}", path.display(), e),
        })?;
        let records: Vec<HazardAssessment> =
            serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
                reason: format!("{}: {}", path.display(), e),
            })?;
        Ok(Self::from_records(name, confidence, records))
    }

    pub fn with_cache_type(mut self, cache_type: CacheType) -> Self {
        self.cache_type = cache_type;
        self
    }

    /// Number of distinct lookup keys.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl HazardSource for DatasetHazardSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn confidence(&self) -> f64 {
        self.confidence
    }

    fn cache_type(&self) -> CacheType {
        self.cache_type
    }

    async fn fetch(&self, identifier: &str) -> HazmatResult<HazardAssessment> {
        self.records
            .get(&normalize_identifier(identifier))
            .cloned()
            .ok_or_else(|| {
                SourceError::NotFound {
                    source_name: self.name.clone(),
                    identifier: identifier.to_string(),
                }
                .into()
            })
    }
}
