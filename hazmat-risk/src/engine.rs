//! Risk classification engine.
//!
//! `assess_compound` validates the formulation, fans out one hazard lookup
//! per ingredient, joins them all, then classifies. A failed or malformed
//! lookup is replaced by the conservative default record so the caller
//! always receives a tier; only structurally invalid input is an error.

use std::sync::Arc;

use futures_util::future::join_all;
use hazmat_core::{
    conservative_hazard_assessment, system_clock, CompoundFormulation, HazardAssessment,
    HazmatResult, Ingredient, IngredientAssessment, RiskAssessment, RiskSettings, SharedClock,
    CONSERVATIVE_DEFAULT_SOURCE,
};
use hazmat_reliability::HazardLookup;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ppe::{aggregate_controls, aggregate_ppe};
use crate::precautions::additional_precautions;
use crate::rules::{
    classify, contribution, expiry_window, implied_level, ingredient_findings, review_required,
};

/// Classifies compound formulations against a hazard lookup.
pub struct RiskEngine {
    lookup: Arc<dyn HazardLookup>,
    settings: RiskSettings,
    clock: SharedClock,
}

impl RiskEngine {
    pub fn new(lookup: Arc<dyn HazardLookup>, settings: RiskSettings, clock: SharedClock) -> Self {
        Self {
            lookup,
            settings,
            clock,
        }
    }

    pub fn with_defaults(lookup: Arc<dyn HazardLookup>) -> Self {
        Self::new(lookup, RiskSettings::default(), system_clock())
    }

    pub fn settings(&self) -> &RiskSettings {
        &self.settings
    }

    /// Classify `compound` into a risk tier with its protective measures.
    ///
    /// Returns `Err` only when the formulation fails validation; no source is
    /// contacted in that case.
    pub async fn assess_compound(&self, compound: &CompoundFormulation) -> HazmatResult<RiskAssessment> {
        compound.validate()?;

        let records = join_all(
            compound
                .ingredients
                .iter()
                .map(|ingredient| self.hazard_for(ingredient)),
        )
        .await;

        let threshold = self.settings.low_confidence_threshold;
        let mut findings = Vec::new();
        let ingredients: Vec<IngredientAssessment> = compound
            .ingredients
            .iter()
            .zip(records)
            .map(|(ingredient, (hazard, substituted_default))| {
                let fired = ingredient_findings(ingredient, &hazard, threshold);
                let level = implied_level(&fired);
                findings.extend(fired);
                IngredientAssessment {
                    contribution_to_risk: contribution(&hazard, ingredient.percentage),
                    ingredient: ingredient.clone(),
                    hazard,
                    implied_level: level,
                    substituted_default,
                }
            })
            .collect();

        let (level, rationale) = classify(&ingredients, &findings);
        let required_ppe = aggregate_ppe(&ingredients, level);
        let engineering_controls = aggregate_controls(&ingredients, level);
        let additional_precautions =
            additional_precautions(compound, &ingredients, level, &self.settings);
        let review_required = review_required(&ingredients, threshold);

        let lowest_confidence = ingredients
            .iter()
            .map(|i| i.confidence())
            .fold(1.0_f64, f64::min);
        let assessed_at = self.clock.now();
        let expiry_date = assessed_at + expiry_window(lowest_confidence);

        info!(
            compound = %compound.name,
            level = level.as_str(),
            ingredients = ingredients.len(),
            substituted = ingredients.iter().filter(|i| i.substituted_default).count(),
            review_required,
            "compound assessed"
        );

        Ok(RiskAssessment {
            assessment_id: Uuid::now_v7(),
            compound_name: compound.name.clone(),
            dosage_form: compound.dosage_form,
            overall_risk_level: level,
            rationale,
            ingredients,
            required_ppe,
            engineering_controls,
            additional_precautions,
            review_required,
            assessed_at,
            expiry_date,
        })
    }

    /// Hazard record for one ingredient and whether it is a substitute.
    async fn hazard_for(&self, ingredient: &Ingredient) -> (HazardAssessment, bool) {
        match self.lookup.lookup(ingredient).await {
            Ok(record) => match record.validate_shape() {
                Ok(()) => {
                    let substituted = record
                        .data_quality
                        .sources
                        .iter()
                        .any(|s| s == CONSERVATIVE_DEFAULT_SOURCE);
                    if substituted {
                        warn!(ingredient = %ingredient.name, "conservative hazard record in use");
                    } else {
                        debug!(ingredient = %ingredient.name, confidence = record.confidence(), "hazard record resolved");
                    }
                    (record, substituted)
                }
                Err(reason) => {
                    warn!(ingredient = %ingredient.name, reason = %reason, "malformed hazard record, substituting conservative default");
                    (conservative_hazard_assessment(&ingredient.name), true)
                }
            },
            Err(error) => {
                warn!(ingredient = %ingredient.name, error = %error, "hazard lookup failed, substituting conservative default");
                (conservative_hazard_assessment(&ingredient.name), true)
            }
        }
    }
}

impl std::fmt::Debug for RiskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskEngine")
            .field("settings", &self.settings)
            .field("clock", &self.clock)
            .finish()
    }
}
