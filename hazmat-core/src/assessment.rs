//! Risk classification results.

use crate::formulation::{DosageForm, Ingredient};
use crate::hazard::HazardAssessment;
use crate::ppe::{EngineeringControl, PpeRequirement};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Compounding risk tier. Strictly ordered `A < B < C`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    A,
    B,
    C,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s.trim() {
            "A" | "a" => Some(Self::A),
            "B" | "b" => Some(Self::B),
            "C" | "c" => Some(Self::C),
            _ => None,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Level {}", self.as_str())
    }
}

/// How much one ingredient drives the compound's risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskContribution {
    Low,
    Medium,
    High,
}

/// Per-ingredient classification detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientAssessment {
    pub ingredient: Ingredient,
    pub hazard: HazardAssessment,
    pub contribution_to_risk: RiskContribution,
    /// Level this ingredient alone would force
    pub implied_level: RiskLevel,
    /// Lookup failed and the conservative default was substituted
    #[serde(default)]
    pub substituted_default: bool,
}

impl IngredientAssessment {
    pub fn confidence(&self) -> f64 {
        self.hazard.data_quality.confidence
    }
}

/// Complete classification of a compound preparation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub assessment_id: Uuid,
    pub compound_name: String,
    pub dosage_form: DosageForm,
    pub overall_risk_level: RiskLevel,
    /// Rules that fired to produce `overall_risk_level`
    pub rationale: Vec<String>,
    pub ingredients: Vec<IngredientAssessment>,
    pub required_ppe: Vec<PpeRequirement>,
    pub engineering_controls: Vec<EngineeringControl>,
    pub additional_precautions: Vec<String>,
    pub review_required: bool,
    pub assessed_at: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
}

impl RiskAssessment {
    /// Lowest ingredient confidence, or 0.0 when there are no ingredients.
    pub fn lowest_confidence(&self) -> f64 {
        self.ingredients
            .iter()
            .map(|i| i.confidence())
            .reduce(f64::min)
            .unwrap_or(0.0)
    }

    pub fn ppe_for(&self, ppe_type: crate::ppe::PpeType) -> Option<&PpeRequirement> {
        self.required_ppe.iter().find(|p| p.ppe_type == ppe_type)
    }

    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        at >= self.expiry_date
    }
}
