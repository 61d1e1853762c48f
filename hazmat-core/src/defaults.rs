//! Conservative safe defaults.
//!
//! Every value here assumes the worst plausible case. They are returned when
//! hazard data cannot be obtained, so a lookup failure always over-protects.

use crate::hazard::{DataQuality, HazardAssessment, NioshClassification, PhysicalForm, Solubility};
use crate::ppe::{maximal_ppe, EngineeringControl, PpeRequirement};
use crate::reliability::{FallbackContext, SafeDefault, SAFE_DEFAULT_CONFIDENCE};
use chrono::Utc;

/// Source label recorded on conservative default records.
pub const CONSERVATIVE_DEFAULT_SOURCE: &str = "conservative-default";

/// Warning text attached when a conservative default stands in for real data.
pub fn manual_review_warning(subject: &str) -> String {
    format!(
        "Hazard data unavailable for {}; conservative defaults applied. Manual review required before compounding.",
        subject
    )
}

/// Worst-case hazard record for an ingredient whose data could not be fetched.
pub fn conservative_hazard_assessment(ingredient: &str) -> HazardAssessment {
    HazardAssessment {
        ingredient_name: ingredient.to_string(),
        cas_number: None,
        ghs_classifications: Vec::new(),
        niosh: Some(NioshClassification::unknown_assume_hazardous()),
        physical_form: PhysicalForm::Powder,
        solubility: Solubility::Unknown,
        ppe_recommendations: maximal_ppe(),
        engineering_controls: EngineeringControl::containment_grade(),
        data_quality: DataQuality {
            sources: vec![CONSERVATIVE_DEFAULT_SOURCE.to_string()],
            confidence: SAFE_DEFAULT_CONFIDENCE,
            last_updated: Utc::now(),
            warnings: vec![manual_review_warning(ingredient)],
            verification_required: true,
        },
    }
}

impl SafeDefault for HazardAssessment {
    fn safe_default(context: &FallbackContext) -> Self {
        let subject = context
            .ingredient()
            .map(str::to_string)
            .unwrap_or_else(|| context.to_string());
        conservative_hazard_assessment(&subject)
    }
}

impl SafeDefault for NioshClassification {
    fn safe_default(_context: &FallbackContext) -> Self {
        NioshClassification::unknown_assume_hazardous()
    }
}

impl SafeDefault for Vec<PpeRequirement> {
    fn safe_default(_context: &FallbackContext) -> Self {
        maximal_ppe()
    }
}

impl SafeDefault for Vec<EngineeringControl> {
    fn safe_default(_context: &FallbackContext) -> Self {
        EngineeringControl::containment_grade()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conservative_record_is_worst_case() {
        let record = conservative_hazard_assessment("unknownium");
        assert!(record.is_niosh_hazardous());
        assert!(record.is_carcinogenic());
        assert!(record.is_reproductive_toxicant());
        assert!(record.physical_form.is_powder());
        assert_eq!(record.ppe_recommendations.len(), 7);
        assert!(record.data_quality.verification_required);
        assert!(record.data_quality.confidence < 0.3);
        assert!(record.validate_shape().is_ok());
    }

    #[test]
    fn test_safe_default_uses_context_ingredient() {
        let ctx = FallbackContext::hazard("tamoxifen");
        let record = HazardAssessment::safe_default(&ctx);
        assert_eq!(record.ingredient_name, "tamoxifen");
        assert!(record.data_quality.warnings[0].contains("Manual review"));
    }
}
