//! Normalized hazard data for a single ingredient.
//!
//! `HazardAssessment` is the unit exchanged between hazard data sources and
//! the classification engine. Categories are closed enums so the classification
//! rules match exhaustively; GHS free text is still scanned for severe keywords
//! because upstream records frequently carry a description without a usable
//! hazard code.

use crate::ppe::{EngineeringControl, PpeRequirement};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// ============================================================================
// GHS
// ============================================================================

/// GHS health/physical hazard class, derived from the H-statement code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GhsHazardClass {
    AcuteToxicity,
    SkinCorrosion,
    SkinSensitization,
    EyeDamage,
    RespiratorySensitization,
    GermCellMutagenicity,
    Carcinogenicity,
    ReproductiveToxicity,
    TargetOrganToxicity,
    AspirationHazard,
    Physical,
    Environmental,
    Other,
}

impl GhsHazardClass {
    /// Map an H-statement code (e.g. `H350`, `H360FD`) to its hazard class.
    pub fn from_h_code(code: &str) -> Self {
        let digits: String = code
            .trim()
            .trim_start_matches(['H', 'h'])
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        let Ok(n) = digits.parse::<u16>() else {
            return Self::Other;
        };
        match n {
            200..=299 => Self::Physical,
            300..=302 | 310..=312 | 330..=332 => Self::AcuteToxicity,
            304 => Self::AspirationHazard,
            314 | 315 => Self::SkinCorrosion,
            317 => Self::SkinSensitization,
            318 | 319 => Self::EyeDamage,
            334 => Self::RespiratorySensitization,
            340 | 341 => Self::GermCellMutagenicity,
            350 | 351 => Self::Carcinogenicity,
            360..=362 => Self::ReproductiveToxicity,
            370..=373 => Self::TargetOrganToxicity,
            400..=499 => Self::Environmental,
            _ => Self::Other,
        }
    }

    /// Classes that escalate a compound straight to Level C.
    pub fn is_severe(&self) -> bool {
        matches!(
            self,
            Self::GermCellMutagenicity | Self::Carcinogenicity | Self::ReproductiveToxicity
        )
    }
}

/// Severe-hazard keywords scanned in GHS descriptions.
///
/// Keyword matching is a heuristic: it catches "Fatal if swallowed" or
/// "May cause cancer" but also misses paraphrases and can match negations.
static SEVERE_GHS_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(fatal|cancer|carcinogen\w*|mutagen\w*|reproducti\w*|fertility|unborn child)\b")
        .expect("severe GHS keyword pattern is valid")
});

/// A single GHS classification attached to an ingredient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GhsClassification {
    /// H-statement code, e.g. `H350`
    pub code: String,
    /// Free-text hazard statement
    pub description: String,
    /// Hazard category, e.g. `1B`
    #[serde(default)]
    pub category: Option<String>,
}

impl GhsClassification {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            category: None,
        }
    }

    pub fn hazard_class(&self) -> GhsHazardClass {
        GhsHazardClass::from_h_code(&self.code)
    }

    /// Whether the description text contains a severe-hazard keyword.
    pub fn mentions_severe_hazard(&self) -> bool {
        SEVERE_GHS_TEXT.is_match(&self.description)
    }

    /// Severe by code or by description keyword.
    pub fn is_severe(&self) -> bool {
        self.hazard_class().is_severe() || self.mentions_severe_hazard()
    }
}

// ============================================================================
// NIOSH
// ============================================================================

/// NIOSH hazardous drug list table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NioshTable {
    /// Antineoplastics and drugs with MSHI requiring special handling
    #[serde(rename = "table1")]
    Table1,
    /// Non-antineoplastic hazardous drugs
    #[serde(rename = "table2")]
    Table2,
    /// Drugs with reproductive effects only
    #[serde(rename = "table3")]
    Table3,
}

impl NioshTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table1 => "table1",
            Self::Table2 => "table2",
            Self::Table3 => "table3",
        }
    }

    /// Handling severity; higher is worse. Table 1 ranks first and the
    /// reproductive-only Table 3 ranks above Table 2.
    pub fn severity(&self) -> u8 {
        match self {
            Self::Table1 => 3,
            Self::Table3 => 2,
            Self::Table2 => 1,
        }
    }

    /// The more severe of two tables.
    pub fn most_severe(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

/// NIOSH classification for an ingredient.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NioshClassification {
    pub table: Option<NioshTable>,
    #[serde(default)]
    pub carcinogenic: bool,
    #[serde(default)]
    pub reproductive_toxicity: bool,
    #[serde(default)]
    pub developmental_toxicity: bool,
    #[serde(default)]
    pub genotoxic: bool,
    /// Status unknown; treated as hazardous
    #[serde(default)]
    pub assumed_hazardous: bool,
}

impl NioshClassification {
    pub fn listed(table: NioshTable) -> Self {
        Self {
            table: Some(table),
            ..Self::default()
        }
    }

    /// Worst-case record used when the true status could not be established.
    pub fn unknown_assume_hazardous() -> Self {
        Self {
            table: Some(NioshTable::Table1),
            carcinogenic: true,
            reproductive_toxicity: true,
            developmental_toxicity: true,
            genotoxic: true,
            assumed_hazardous: true,
        }
    }

    pub fn is_hazardous(&self) -> bool {
        self.table.is_some()
            || self.assumed_hazardous
            || self.carcinogenic
            || self.reproductive_toxicity
            || self.developmental_toxicity
            || self.genotoxic
    }
}

// ============================================================================
// PHYSICAL PROPERTIES
// ============================================================================

/// Physical form of an ingredient as handled during compounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicalForm {
    Powder,
    Crystalline,
    Liquid,
    Solution,
    Cream,
    Ointment,
    Gel,
    Suspension,
    Tablet,
    Capsule,
    Solid,
    #[default]
    Unknown,
}

impl PhysicalForm {
    /// Forms that can become airborne during weighing or trituration.
    pub fn is_powder(&self) -> bool {
        matches!(self, Self::Powder | Self::Crystalline)
    }
}

/// Aqueous solubility bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Solubility {
    FreelySoluble,
    Soluble,
    SparinglySoluble,
    Insoluble,
    #[default]
    Unknown,
}

// ============================================================================
// DATA QUALITY
// ============================================================================

/// Provenance and trust metadata for a hazard record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub sources: Vec<String>,
    /// Trust weight in [0.0, 1.0]
    pub confidence: f64,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub verification_required: bool,
}

impl DataQuality {
    pub fn new(source: impl Into<String>, confidence: f64) -> Self {
        Self {
            sources: vec![source.into()],
            confidence,
            last_updated: Utc::now(),
            warnings: Vec::new(),
            verification_required: false,
        }
    }
}

// ============================================================================
// HAZARD ASSESSMENT
// ============================================================================

/// Normalized hazard profile of one ingredient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardAssessment {
    pub ingredient_name: String,
    #[serde(default)]
    pub cas_number: Option<String>,
    #[serde(default)]
    pub ghs_classifications: Vec<GhsClassification>,
    #[serde(default)]
    pub niosh: Option<NioshClassification>,
    #[serde(default)]
    pub physical_form: PhysicalForm,
    #[serde(default)]
    pub solubility: Solubility,
    #[serde(default)]
    pub ppe_recommendations: Vec<PpeRequirement>,
    #[serde(default)]
    pub engineering_controls: Vec<EngineeringControl>,
    pub data_quality: DataQuality,
}

impl HazardAssessment {
    /// Minimal record for an ingredient with no known hazards.
    pub fn new(ingredient_name: impl Into<String>, data_quality: DataQuality) -> Self {
        Self {
            ingredient_name: ingredient_name.into(),
            cas_number: None,
            ghs_classifications: Vec::new(),
            niosh: None,
            physical_form: PhysicalForm::Unknown,
            solubility: Solubility::Unknown,
            ppe_recommendations: Vec::new(),
            engineering_controls: Vec::new(),
            data_quality,
        }
    }

    pub fn confidence(&self) -> f64 {
        self.data_quality.confidence
    }

    pub fn niosh_table(&self) -> Option<NioshTable> {
        self.niosh.as_ref().and_then(|n| n.table)
    }

    pub fn is_niosh_hazardous(&self) -> bool {
        self.niosh.as_ref().is_some_and(|n| n.is_hazardous())
    }

    /// NIOSH-hazardous or carrying at least one GHS classification.
    pub fn is_hazardous(&self) -> bool {
        self.is_niosh_hazardous() || !self.ghs_classifications.is_empty()
    }

    pub fn is_carcinogenic(&self) -> bool {
        self.niosh.as_ref().is_some_and(|n| n.carcinogenic)
            || self
                .ghs_classifications
                .iter()
                .any(|g| g.hazard_class() == GhsHazardClass::Carcinogenicity)
    }

    pub fn is_reproductive_toxicant(&self) -> bool {
        self.niosh
            .as_ref()
            .is_some_and(|n| n.reproductive_toxicity || n.developmental_toxicity)
            || self
                .ghs_classifications
                .iter()
                .any(|g| g.hazard_class() == GhsHazardClass::ReproductiveToxicity)
    }

    pub fn has_severe_ghs(&self) -> bool {
        self.ghs_classifications.iter().any(|g| g.is_severe())
    }

    /// Shape check applied to records arriving from external sources.
    pub fn validate_shape(&self) -> Result<(), String> {
        if self.ingredient_name.trim().is_empty() {
            return Err("ingredient_name is empty".to_string());
        }
        let confidence = self.data_quality.confidence;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(format!("confidence {} outside [0, 1]", confidence));
        }
        if self.data_quality.sources.is_empty() {
            return Err("data_quality.sources is empty".to_string());
        }
        if let Some(bad) = self.ghs_classifications.iter().find(|g| g.code.trim().is_empty()) {
            return Err(format!("GHS classification without code: {}", bad.description));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_h_code_mapping() {
        assert_eq!(GhsHazardClass::from_h_code("H350"), GhsHazardClass::Carcinogenicity);
        assert_eq!(
            GhsHazardClass::from_h_code("H360FD"),
            GhsHazardClass::ReproductiveToxicity
        );
        assert_eq!(
            GhsHazardClass::from_h_code("h341"),
            GhsHazardClass::GermCellMutagenicity
        );
        assert_eq!(GhsHazardClass::from_h_code("H302"), GhsHazardClass::AcuteToxicity);
        assert_eq!(GhsHazardClass::from_h_code("H225"), GhsHazardClass::Physical);
        assert_eq!(GhsHazardClass::from_h_code("garbage"), GhsHazardClass::Other);
    }

    #[test]
    fn test_severe_keyword_heuristic() {
        let fatal = GhsClassification::new("H999", "Fatal if inhaled");
        assert!(fatal.mentions_severe_hazard());

        let cancer = GhsClassification::new("", "May cause cancer");
        assert!(cancer.is_severe());

        let irritant = GhsClassification::new("H315", "Causes skin irritation");
        assert!(!irritant.is_severe());
    }

    #[test]
    fn test_niosh_severity_order() {
        use NioshTable::*;
        assert_eq!(Table2.most_severe(Table3), Table3);
        assert_eq!(Table3.most_severe(Table2), Table3);
        assert_eq!(Table3.most_severe(Table1), Table1);
        assert_eq!(Table2.most_severe(Table2), Table2);
    }

    #[test]
    fn test_unknown_niosh_is_hazardous() {
        let unknown = NioshClassification::unknown_assume_hazardous();
        assert!(unknown.is_hazardous());
        assert_eq!(unknown.table, Some(NioshTable::Table1));
        assert!(!NioshClassification::default().is_hazardous());
    }

    #[test]
    fn test_validate_shape_rejects_bad_confidence() {
        let mut record = HazardAssessment::new("lidocaine", DataQuality::new("pubchem", 0.9));
        assert!(record.validate_shape().is_ok());

        record.data_quality.confidence = 1.5;
        assert!(record.validate_shape().is_err());

        record.data_quality.confidence = f64::NAN;
        assert!(record.validate_shape().is_err());
    }

    #[test]
    fn test_hazard_assessment_serde_defaults() {
        let json = serde_json::json!({
            "ingredient_name": "ketoprofen",
            "data_quality": {
                "sources": ["pubchem"],
                "confidence": 0.8,
                "last_updated": "2026-01-01T00:00:00Z"
            }
        });
        let parsed: HazardAssessment = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.physical_form, PhysicalForm::Unknown);
        assert!(parsed.ghs_classifications.is_empty());
        assert!(!parsed.is_hazardous());
    }
}
