//! hazmat Core - Entity Types
//!
//! Pure data structures for hazardous-ingredient risk assessment. All other
//! crates depend on this. Behavior here is limited to validation, shape
//! checks and the conservative defaults that define "fail toward caution".

pub mod assessment;
pub mod clock;
pub mod config;
pub mod defaults;
pub mod error;
pub mod formulation;
pub mod hazard;
pub mod ppe;
pub mod reliability;

pub use assessment::{IngredientAssessment, RiskAssessment, RiskContribution, RiskLevel};
pub use clock::{elapsed_between, system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use config::{BreakerSettings, CacheSettings, FallbackSettings, HazmatConfig, RiskSettings};
pub use defaults::{conservative_hazard_assessment, manual_review_warning, CONSERVATIVE_DEFAULT_SOURCE};
pub use error::{
    CacheError, ConfigError, FallbackError, HazmatError, HazmatResult, SourceError,
    ValidationError,
};
pub use formulation::{CompoundFormulation, DosageForm, Ingredient};
pub use hazard::{
    DataQuality, GhsClassification, GhsHazardClass, HazardAssessment, NioshClassification,
    NioshTable, PhysicalForm, Solubility,
};
pub use ppe::{maximal_ppe, strongest_per_type, EngineeringControl, PpeRequirement, PpeType};
pub use reliability::{CircuitState, FallbackContext, SafeDefault, SAFE_DEFAULT_CONFIDENCE};

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Normalize a lookup identifier: trimmed and lowercased.
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier("  Methotrexate "), "methotrexate");
        assert_eq!(normalize_identifier("59-05-2"), "59-05-2");
    }
}
