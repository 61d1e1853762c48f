//! Type-partitioned cache keys.
//!
//! `CacheKey`'s private constructor guarantees every stored key carries its
//! partition prefix and is lowercased, so `"PubChem:Aspirin"` and
//! `"pubchem:aspirin"` can never become two entries.

use super::cache_type::CacheType;

/// Separator between the partition and the caller's key.
const SEPARATOR: char = ':';

/// A cache key scoped to one [`CacheType`] partition.
///
/// # Format
///
/// `"<type>:<lowercased key>"`, e.g. `"niosh:methotrexate"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    inner: CacheKeyInner,
}

/// Private inner struct - prevents external construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct CacheKeyInner {
    cache_type: CacheType,
    key: String,
}

impl CacheKey {
    /// Create a key in the given partition. The caller's key is lowercased.
    pub fn new(cache_type: CacheType, key: &str) -> Self {
        Self {
            inner: CacheKeyInner {
                cache_type,
                key: key.to_lowercase(),
            },
        }
    }

    pub fn cache_type(&self) -> CacheType {
        self.inner.cache_type
    }

    /// The lowercased caller key without its partition prefix.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Encode to the stored string form.
    pub fn encode(&self) -> String {
        format!("{}{}{}", self.inner.cache_type.as_str(), SEPARATOR, self.inner.key)
    }

    /// Decode a stored key.
    ///
    /// Returns `None` when the prefix is missing or names an unknown
    /// partition, or when the key part is not already lowercase.
    pub fn decode(encoded: &str) -> Option<Self> {
        let (prefix, key) = encoded.split_once(SEPARATOR)?;
        let cache_type = CacheType::parse(prefix)?;
        if key != key.to_lowercase() {
            return None;
        }
        Some(Self {
            inner: CacheKeyInner {
                cache_type,
                key: key.to_string(),
            },
        })
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.inner.cache_type, SEPARATOR, self.inner.key)
    }
}
