//! Classification rules.
//!
//! Level precedence, first match wins:
//! - **C**: NIOSH Table 1, reproductive toxicity, carcinogenicity, or a
//!   severe GHS classification (by code or by description keyword)
//! - **B**: NIOSH Table 2, powder handling, more than one independently
//!   hazardous ingredient, or confidence below the low-confidence threshold
//! - **A**: everything else
//!
//! NIOSH Table 3 lists drugs with reproductive effects only, so it is read as
//! reproductive toxicity.

use chrono::Duration as ChronoDuration;
use hazmat_core::{
    HazardAssessment, Ingredient, IngredientAssessment, NioshTable, PhysicalForm,
    RiskContribution, RiskLevel,
};

/// Share above which a hazardous ingredient contributes highly.
pub const HIGH_CONTRIBUTION_PERCENT: f64 = 10.0;
/// Share above which a hazardous ingredient contributes moderately.
pub const MEDIUM_CONTRIBUTION_PERCENT: f64 = 1.0;
/// Share above which a non-hazardous ingredient contributes moderately.
pub const BULK_CONTRIBUTION_PERCENT: f64 = 50.0;

/// A rule that fired, with the level it forces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub level: RiskLevel,
    pub reason: String,
}

impl Finding {
    fn new(level: RiskLevel, reason: impl Into<String>) -> Self {
        Self {
            level,
            reason: reason.into(),
        }
    }
}

/// Form as handled at the bench: the ingredient's override, else the record's.
pub fn effective_form(ingredient: &Ingredient, hazard: &HazardAssessment) -> PhysicalForm {
    ingredient.physical_form.unwrap_or(hazard.physical_form)
}

/// Every per-ingredient rule that fires for `hazard`.
pub fn ingredient_findings(
    ingredient: &Ingredient,
    hazard: &HazardAssessment,
    low_confidence_threshold: f64,
) -> Vec<Finding> {
    let name = &ingredient.name;
    let mut findings = Vec::new();

    match hazard.niosh_table() {
        Some(NioshTable::Table1) => {
            findings.push(Finding::new(RiskLevel::C, format!("{}: NIOSH Table 1", name)))
        }
        Some(NioshTable::Table2) => {
            findings.push(Finding::new(RiskLevel::B, format!("{}: NIOSH Table 2", name)))
        }
        Some(NioshTable::Table3) => findings.push(Finding::new(
            RiskLevel::C,
            format!("{}: NIOSH Table 3 reproductive hazard", name),
        )),
        None => {}
    }
    if hazard.is_reproductive_toxicant() {
        findings.push(Finding::new(
            RiskLevel::C,
            format!("{}: reproductive toxicity", name),
        ));
    }
    if hazard.is_carcinogenic() {
        findings.push(Finding::new(RiskLevel::C, format!("{}: carcinogenic", name)));
    }
    if let Some(ghs) = hazard.ghs_classifications.iter().find(|g| g.is_severe()) {
        findings.push(Finding::new(
            RiskLevel::C,
            format!("{}: severe GHS hazard {} ({})", name, ghs.code, ghs.description),
        ));
    }
    if effective_form(ingredient, hazard).is_powder() {
        findings.push(Finding::new(RiskLevel::B, format!("{}: handled as powder", name)));
    }
    if hazard.confidence() < low_confidence_threshold {
        findings.push(Finding::new(
            RiskLevel::B,
            format!(
                "{}: hazard data confidence {:.2} below {:.2}",
                name,
                hazard.confidence(),
                low_confidence_threshold
            ),
        ));
    }
    findings
}

/// Level this ingredient alone forces.
pub fn implied_level(findings: &[Finding]) -> RiskLevel {
    findings
        .iter()
        .map(|f| f.level)
        .max()
        .unwrap_or(RiskLevel::A)
}

/// How much `hazard` drives the compound's risk at `percentage` of the batch.
///
/// Table 1 drugs are always high. Hazardous ingredients scale with share;
/// non-hazardous ones never exceed medium.
pub fn contribution(hazard: &HazardAssessment, percentage: f64) -> RiskContribution {
    if hazard.niosh_table() == Some(NioshTable::Table1) {
        return RiskContribution::High;
    }
    if hazard.is_hazardous() {
        if percentage > HIGH_CONTRIBUTION_PERCENT {
            RiskContribution::High
        } else if percentage > MEDIUM_CONTRIBUTION_PERCENT {
            RiskContribution::Medium
        } else {
            RiskContribution::Low
        }
    } else if percentage > BULK_CONTRIBUTION_PERCENT {
        RiskContribution::Medium
    } else {
        RiskContribution::Low
    }
}

/// Overall level and rationale for a set of classified ingredients.
///
/// The level is the maximum of every ingredient's implied level and the
/// compound-wide rules, so it is never below any single ingredient.
pub fn classify(ingredients: &[IngredientAssessment], findings: &[Finding]) -> (RiskLevel, Vec<String>) {
    let mut level = ingredients
        .iter()
        .map(|i| i.implied_level)
        .max()
        .unwrap_or(RiskLevel::A);
    let mut rationale: Vec<String> = findings
        .iter()
        .filter(|f| f.level > RiskLevel::A)
        .map(|f| format!("{} -> {}", f.reason, f.level))
        .collect();

    let hazardous: Vec<&str> = ingredients
        .iter()
        .filter(|i| i.hazard.is_hazardous())
        .map(|i| i.ingredient.name.as_str())
        .collect();
    if hazardous.len() > 1 {
        level = level.max(RiskLevel::B);
        rationale.push(format!(
            "{} hazardous ingredients ({}) -> {}",
            hazardous.len(),
            hazardous.join(", "),
            RiskLevel::B
        ));
    }

    if rationale.is_empty() {
        rationale.push(format!("No hazard criteria met -> {}", RiskLevel::A));
    }
    (level, rationale)
}

/// Review is required for uncertain data, records flagged for verification,
/// or any high-contribution ingredient.
pub fn review_required(ingredients: &[IngredientAssessment], low_confidence_threshold: f64) -> bool {
    ingredients.iter().any(|i| {
        i.confidence() < low_confidence_threshold
            || i.hazard.data_quality.verification_required
            || i.contribution_to_risk == RiskContribution::High
    })
}

/// Validity window for an assessment given its lowest ingredient confidence.
pub fn expiry_window(lowest_confidence: f64) -> ChronoDuration {
    if lowest_confidence < 0.3 {
        ChronoDuration::days(30)
    } else if lowest_confidence < 0.7 {
        ChronoDuration::days(90)
    } else {
        ChronoDuration::days(365)
    }
}
