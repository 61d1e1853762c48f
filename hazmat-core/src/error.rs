//! Error types for hazmat operations

use std::time::Duration;
use thiserror::Error;

/// Failures raised by an external hazard data source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Transient failure from {source_name}: {reason}")]
    Transient { source_name: String, reason: String },

    #[error("Request to {source_name} timed out after {timeout:?}")]
    Timeout {
        source_name: String,
        timeout: Duration,
    },

    #[error("Circuit open for {operation}, call rejected")]
    CircuitOpen { operation: String },

    #[error("Invalid record from {source_name}: {reason}")]
    InvalidRecord { source_name: String, reason: String },

    #[error("No record for {identifier} in {source_name}")]
    NotFound {
        source_name: String,
        identifier: String,
    },
}

/// Cache and persistence errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Persistence quota exceeded writing {bytes} bytes")]
    QuotaExceeded { bytes: usize },

    #[error("Persistence failed: {reason}")]
    Persistence { reason: String },

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Validation errors for caller-supplied input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Formulation {compound} has no ingredients")]
    EmptyFormulation { compound: String },

    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file: {reason}")]
    Io { reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },
}

/// Fallback orchestration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FallbackError {
    #[error("Insufficient data: {succeeded}/{total} sources succeeded ({percent}%)")]
    InsufficientData {
        succeeded: usize,
        total: usize,
        percent: u32,
    },

    #[error("All {attempted} sources failed for {context}")]
    Exhausted { context: String, attempted: usize },
}

/// Master error type for all hazmat errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HazmatError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fallback error: {0}")]
    Fallback(#[from] FallbackError),
}

impl HazmatError {
    /// Whether the orchestrator should move on to the next ranked source.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HazmatError::Source(
                SourceError::Transient { .. }
                    | SourceError::Timeout { .. }
                    | SourceError::CircuitOpen { .. }
                    | SourceError::NotFound { .. }
                    | SourceError::InvalidRecord { .. }
            )
        )
    }

    /// Whether this error is a fast-fail from an open circuit.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, HazmatError::Source(SourceError::CircuitOpen { .. }))
    }

    /// Convenience constructor for transient source failures.
    pub fn transient(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        HazmatError::Source(SourceError::Transient {
            source_name: source_name.into(),
            reason: reason.into(),
        })
    }
}

/// Result type alias for hazmat operations.
pub type HazmatResult<T> = Result<T, HazmatError>;

// =============================================================================
// TESTS
// =============================================================================
