//! Configuration types

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// TTL cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    pub max_entries: usize,
    pub sweep_interval_secs: u64,
    /// Fixed key the snapshot is stored under
    pub storage_key: String,
    /// Snapshot location; in-memory only when absent
    #[serde(default)]
    pub persistence_path: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            sweep_interval_secs: 3600,
            storage_key: "hazmat_cache".to_string(),
            persistence_path: None,
        }
    }
}

impl CacheSettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 60,
        }
    }
}

impl BreakerSettings {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

/// Fallback orchestration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FallbackSettings {
    pub min_success_rate: f64,
    /// Per-attempt timeout; unbounded when absent
    #[serde(default)]
    pub attempt_timeout_ms: Option<u64>,
    pub reliability_threshold: f64,
    pub reliability_min_calls: u64,
    pub recent_failure_window_secs: u64,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            min_success_rate: 0.5,
            attempt_timeout_ms: None,
            reliability_threshold: 0.8,
            reliability_min_calls: 10,
            recent_failure_window_secs: 300,
        }
    }
}

impl FallbackSettings {
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }

    pub fn recent_failure_window(&self) -> Duration {
        Duration::from_secs(self.recent_failure_window_secs)
    }
}

/// Classification engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskSettings {
    /// Batch quantity above which a large-batch precaution is added
    pub large_batch_threshold: f64,
    /// Confidence below which data is treated as uncertain
    pub low_confidence_threshold: f64,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            large_batch_threshold: 500.0,
            low_confidence_threshold: 0.5,
        }
    }
}

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HazmatConfig {
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub breaker: BreakerSettings,
    #[serde(default)]
    pub fallback: FallbackSettings,
    #[serde(default)]
    pub risk: RiskSettings,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl HazmatConfig {
    /// Load a TOML config file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// Apply environment overrides on top of this config.
    ///
    /// # Environment Variables
    /// - `HAZMAT_CACHE_MAX_ENTRIES`: Cache capacity (default: 1000)
    /// - `HAZMAT_CACHE_SWEEP_INTERVAL_SECS`: Expiry sweep interval (default: 3600)
    /// - `HAZMAT_CACHE_PATH`: Snapshot file or LMDB directory
    /// - `HAZMAT_CIRCUIT_FAILURE_THRESHOLD`: Failures before opening (default: 5)
    /// - `HAZMAT_CIRCUIT_RESET_TIMEOUT_SECS`: How long circuit stays open (default: 60)
    /// - `HAZMAT_FALLBACK_MIN_SUCCESS_RATE`: Parallel success threshold (default: 0.5)
    /// - `HAZMAT_FALLBACK_ATTEMPT_TIMEOUT_MS`: Per-attempt timeout
    /// - `HAZMAT_RISK_LARGE_BATCH_THRESHOLD`: Large batch note threshold (default: 500)
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse("HAZMAT_CACHE_MAX_ENTRIES") {
            self.cache.max_entries = v;
        }
        if let Some(v) = env_parse("HAZMAT_CACHE_SWEEP_INTERVAL_SECS") {
            self.cache.sweep_interval_secs = v;
        }
        if let Ok(path) = std::env::var("HAZMAT_CACHE_PATH") {
            self.cache.persistence_path = Some(PathBuf::from(path));
        }
        if let Some(v) = env_parse("HAZMAT_CIRCUIT_FAILURE_THRESHOLD") {
            self.breaker.failure_threshold = v;
        }
        if let Some(v) = env_parse("HAZMAT_CIRCUIT_RESET_TIMEOUT_SECS") {
            self.breaker.reset_timeout_secs = v;
        }
        if let Some(v) = env_parse("HAZMAT_FALLBACK_MIN_SUCCESS_RATE") {
            self.fallback.min_success_rate = v;
        }
        if let Some(v) = env_parse("HAZMAT_FALLBACK_ATTEMPT_TIMEOUT_MS") {
            self.fallback.attempt_timeout_ms = Some(v);
        }
        if let Some(v) = env_parse("HAZMAT_RISK_LARGE_BATCH_THRESHOLD") {
            self.risk.large_batch_threshold = v;
        }
        self
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_entries == 0 {
            return Err(invalid("cache.max_entries", "0", "must be > 0"));
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(invalid("cache.sweep_interval_secs", "0", "must be > 0"));
        }
        if self.cache.storage_key.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "cache.storage_key".to_string(),
            });
        }
        if self.breaker.failure_threshold == 0 {
            return Err(invalid("breaker.failure_threshold", "0", "must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.fallback.min_success_rate) {
            return Err(invalid(
                "fallback.min_success_rate",
                &self.fallback.min_success_rate.to_string(),
                "must be between 0.0 and 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.fallback.reliability_threshold) {
            return Err(invalid(
                "fallback.reliability_threshold",
                &self.fallback.reliability_threshold.to_string(),
                "must be between 0.0 and 1.0",
            ));
        }
        if self.fallback.attempt_timeout_ms == Some(0) {
            return Err(invalid("fallback.attempt_timeout_ms", "0", "must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.risk.low_confidence_threshold) {
            return Err(invalid(
                "risk.low_confidence_threshold",
                &self.risk.low_confidence_threshold.to_string(),
                "must be between 0.0 and 1.0",
            ));
        }
        if !self.risk.large_batch_threshold.is_finite() || self.risk.large_batch_threshold <= 0.0 {
            return Err(invalid(
                "risk.large_batch_threshold",
                &self.risk.large_batch_threshold.to_string(),
                "must be positive",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = HazmatConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.max_entries, 1000);
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.reset_timeout(), Duration::from_secs(60));
        assert_eq!(config.cache.sweep_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = HazmatConfig::from_toml_str(
            r#"
            [breaker]
            failure_threshold = 3
            reset_timeout_secs = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.cache.max_entries, 1000);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = HazmatConfig::from_toml_str("[cache]\nbogus = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_from_path_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[risk]\nlarge_batch_threshold = 250.0\nlow_confidence_threshold = 0.5").unwrap();
        let config = HazmatConfig::from_path(file.path()).unwrap();
        assert_eq!(config.risk.large_batch_threshold, 250.0);
    }

    #[test]
    fn test_validate_rejects_bad_rate() {
        let mut config = HazmatConfig::default();
        config.fallback.min_success_rate = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "fallback.min_success_rate"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = HazmatConfig::default();
        config.cache.max_entries = 0;
        assert!(config.validate().is_err());
    }
}
