//! Reliability primitive types.
//!
//! Pure data types shared by the breaker, the fallback orchestrator and the
//! classification engine. Orchestration lives in hazmat-reliability.

use serde::{Deserialize, Serialize};

// ============================================================================
// CIRCUIT STATE
// ============================================================================

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed = 0,
    /// Circuit is open, requests are rejected
    Open = 1,
    /// Reset timeout elapsed, a single probe request is allowed
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

// ============================================================================
// FALLBACK CONTEXT
// ============================================================================

/// What a fallback chain is trying to produce.
///
/// The context selects the conservative safe default returned when every
/// source fails.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackContext {
    HazardLookup { ingredient: String },
    PpeRecommendation { ingredient: String },
    NioshStatus { ingredient: String },
    Custom { label: String },
}

impl FallbackContext {
    pub fn hazard(ingredient: impl Into<String>) -> Self {
        Self::HazardLookup {
            ingredient: ingredient.into(),
        }
    }

    pub fn custom(label: impl Into<String>) -> Self {
        Self::Custom {
            label: label.into(),
        }
    }

    /// Ingredient the context refers to, if any.
    pub fn ingredient(&self) -> Option<&str> {
        match self {
            Self::HazardLookup { ingredient }
            | Self::PpeRecommendation { ingredient }
            | Self::NioshStatus { ingredient } => Some(ingredient),
            Self::Custom { .. } => None,
        }
    }
}

impl std::fmt::Display for FallbackContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HazardLookup { ingredient } => write!(f, "hazard lookup for {}", ingredient),
            Self::PpeRecommendation { ingredient } => {
                write!(f, "PPE recommendation for {}", ingredient)
            }
            Self::NioshStatus { ingredient } => write!(f, "NIOSH status for {}", ingredient),
            Self::Custom { label } => f.write_str(label),
        }
    }
}

/// Types that have a conservative value to fall back on.
///
/// Implementations must err toward over-caution: the default is what the
/// system reports when it knows nothing.
pub trait SafeDefault: Sized {
    fn safe_default(context: &FallbackContext) -> Self;
}

/// Confidence attached to a safe default.
pub const SAFE_DEFAULT_CONFIDENCE: f64 = 0.1;
