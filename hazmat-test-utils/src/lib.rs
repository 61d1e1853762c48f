//! hazmat Test Utilities
//!
//! Centralized test infrastructure for the hazmat workspace:
//! - Scripted mock hazard sources and lookups
//! - Test fixtures for the classification scenarios
//! - Proptest generators for hazard records and formulations
//! - Custom assertions for risk assessments and fallback results

pub use hazmat_core::{
    conservative_hazard_assessment, CompoundFormulation, DataQuality, DosageForm,
    EngineeringControl, GhsClassification, HazardAssessment, HazmatError, HazmatResult,
    Ingredient, ManualClock, NioshClassification, NioshTable, PhysicalForm, PpeRequirement,
    PpeType, RiskAssessment, RiskLevel, SharedClock, Solubility, SourceError,
    CONSERVATIVE_DEFAULT_SOURCE,
};
pub use hazmat_reliability::{FallbackResult, HazardLookup, HazardSource};
pub use hazmat_storage::CacheType;

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

// ============================================================================
// MOCK SOURCES
// ============================================================================

/// Hazard source that replays scripted responses.
///
/// Queued responses are served in order. Once the queue is empty the
/// repeating record (if any) is returned, otherwise a transient error.
#[derive(Debug)]
pub struct MockHazardSource {
    name: String,
    confidence: f64,
    cache_type: CacheType,
    script: Mutex<VecDeque<HazmatResult<HazardAssessment>>>,
    repeat: Option<HazardAssessment>,
    calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl MockHazardSource {
    pub fn new(name: impl Into<String>, confidence: f64) -> Self {
        Self {
            name: name.into(),
            confidence,
            cache_type: CacheType::Pubchem,
            script: Mutex::new(VecDeque::new()),
            repeat: None,
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Source that returns `record` for every identifier.
    pub fn always(name: impl Into<String>, confidence: f64, record: HazardAssessment) -> Self {
        Self::new(name, confidence).repeating(record)
    }

    /// Source that fails every call.
    pub fn failing(name: impl Into<String>, confidence: f64) -> Self {
        Self::new(name, confidence)
    }

    pub fn repeating(mut self, record: HazardAssessment) -> Self {
        self.repeat = Some(record);
        self
    }

    pub fn with_cache_type(mut self, cache_type: CacheType) -> Self {
        self.cache_type = cache_type;
        self
    }

    pub fn then_ok(self, record: HazardAssessment) -> Self {
        self.push(Ok(record));
        self
    }

    pub fn then_err(self, error: HazmatError) -> Self {
        self.push(Err(error));
        self
    }

    fn push(&self, response: HazmatResult<HazardAssessment>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Identifiers requested so far, in call order.
    pub fn requested(&self) -> Vec<String> {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl HazardSource for MockHazardSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn confidence(&self) -> f64 {
        self.confidence
    }

    fn cache_type(&self) -> CacheType {
        self.cache_type
    }

    async fn fetch(&self, identifier: &str) -> HazmatResult<HazardAssessment> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(identifier.to_string());

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match (scripted, &self.repeat) {
            (Some(response), _) => response,
            (None, Some(record)) => Ok(record.clone()),
            (None, None) => Err(HazmatError::transient(&self.name, "503 Service Unavailable")),
        }
    }
}

/// In-memory lookup keyed by ingredient name.
///
/// Unknown ingredients fail with `SourceError::NotFound`.
#[derive(Debug, Default)]
pub struct MockHazardLookup {
    records: HashMap<String, HazmatResult<HazardAssessment>>,
    calls: AtomicUsize,
}

impl MockHazardLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, record: HazardAssessment) -> Self {
        self.records
            .insert(normalize(&record.ingredient_name), Ok(record));
        self
    }

    pub fn with_failure(mut self, ingredient: &str) -> Self {
        self.records.insert(
            normalize(ingredient),
            Err(HazmatError::transient("mock", "all sources down")),
        );
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn normalize(name: &str) -> String {
    hazmat_core::normalize_identifier(name)
}

#[async_trait]
impl HazardLookup for MockHazardLookup {
    async fn lookup(&self, ingredient: &Ingredient) -> HazmatResult<HazardAssessment> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.records.get(&normalize(&ingredient.name)) {
            Some(response) => response.clone(),
            None => Err(SourceError::NotFound {
                source_name: "mock".to_string(),
                identifier: ingredient.name.clone(),
            }
            .into()),
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for hazard records and formulations.

    use super::*;
    use proptest::prelude::*;

    /// Confidence in `[0.0, 1.0]`.
    pub fn arb_confidence() -> impl Strategy<Value = f64> {
        (0u32..=100).prop_map(|n| n as f64 / 100.0)
    }

    pub fn arb_physical_form() -> impl Strategy<Value = PhysicalForm> {
        prop_oneof![
            Just(PhysicalForm::Powder),
            Just(PhysicalForm::Crystalline),
            Just(PhysicalForm::Liquid),
            Just(PhysicalForm::Solution),
            Just(PhysicalForm::Cream),
            Just(PhysicalForm::Ointment),
            Just(PhysicalForm::Tablet),
            Just(PhysicalForm::Solid),
            Just(PhysicalForm::Unknown),
        ]
    }

    pub fn arb_niosh_table() -> impl Strategy<Value = NioshTable> {
        prop_oneof![
            Just(NioshTable::Table1),
            Just(NioshTable::Table2),
            Just(NioshTable::Table3),
        ]
    }

    pub fn arb_niosh() -> impl Strategy<Value = Option<NioshClassification>> {
        prop::option::of(
            (
                prop::option::of(arb_niosh_table()),
                any::<bool>(),
                any::<bool>(),
                any::<bool>(),
            )
                .prop_map(|(table, carcinogenic, reproductive_toxicity, genotoxic)| {
                    NioshClassification {
                        table,
                        carcinogenic,
                        reproductive_toxicity,
                        developmental_toxicity: false,
                        genotoxic,
                        assumed_hazardous: false,
                    }
                }),
        )
    }

    pub fn arb_ghs_classification() -> impl Strategy<Value = GhsClassification> {
        prop_oneof![
            Just(GhsClassification::new("H302", "Harmful if swallowed")),
            Just(GhsClassification::new("H315", "Causes skin irritation")),
            Just(GhsClassification::new("H319", "Causes serious eye irritation")),
            Just(GhsClassification::new("H317", "May cause an allergic skin reaction")),
            Just(GhsClassification::new("H350", "May cause cancer")),
            Just(GhsClassification::new("H360", "May damage fertility or the unborn child")),
            Just(GhsClassification::new("H300", "Fatal if swallowed")),
        ]
    }

    pub fn arb_ppe_requirement() -> impl Strategy<Value = PpeRequirement> {
        prop::sample::select(PpeType::ALL.to_vec()).prop_flat_map(|ppe_type| {
            prop::sample::select(ppe_type.hierarchy().to_vec())
                .prop_map(move |spec| PpeRequirement::new(ppe_type, spec))
        })
    }

    /// Hazard record for an ingredient called `name`.
    pub fn arb_hazard_assessment(name: String) -> impl Strategy<Value = HazardAssessment> {
        (
            prop::collection::vec(arb_ghs_classification(), 0..3),
            arb_niosh(),
            arb_physical_form(),
            arb_confidence(),
            prop::collection::vec(arb_ppe_requirement(), 0..4),
            any::<bool>(),
        )
            .prop_map(move |(ghs, niosh, form, confidence, ppe, verify)| {
                let mut quality = DataQuality::new("generated", confidence);
                quality.verification_required = verify;
                let mut record = HazardAssessment::new(name.clone(), quality);
                record.ghs_classifications = ghs;
                record.niosh = niosh;
                record.physical_form = form;
                record.ppe_recommendations = ppe;
                record
            })
    }

    pub fn arb_ingredient(name: String) -> impl Strategy<Value = Ingredient> {
        (0u32..=10_000).prop_map(move |basis| Ingredient::new(name.clone(), basis as f64 / 100.0))
    }

    /// Formulation of 1-5 ingredients named `ingredient-<n>` with a hazard
    /// record for each.
    pub fn arb_formulation_with_records(
    ) -> impl Strategy<Value = (CompoundFormulation, Vec<HazardAssessment>)> {
        (1usize..=5)
            .prop_flat_map(|n| {
                let ingredients: Vec<_> = (0..n)
                    .map(|i| arb_ingredient(format!("ingredient-{}", i)))
                    .collect();
                let records: Vec<_> = (0..n)
                    .map(|i| arb_hazard_assessment(format!("ingredient-{}", i)))
                    .collect();
                (ingredients, records, 1u32..2_000)
            })
            .prop_map(|(ingredients, records, batch)| {
                let mut formulation =
                    CompoundFormulation::new("generated compound", DosageForm::Cream, batch as f64);
                formulation.ingredients = ingredients;
                (formulation, records)
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records and formulations for the classification scenarios.

    use super::*;

    fn quality(source: &str, confidence: f64) -> DataQuality {
        DataQuality::new(source, confidence)
    }

    /// NIOSH Table 1 antineoplastic, reproductive toxicant.
    pub fn methotrexate() -> HazardAssessment {
        let mut record = HazardAssessment::new("Methotrexate", quality("niosh", 0.95));
        record.cas_number = Some("59-05-2".to_string());
        record.niosh = Some(NioshClassification {
            reproductive_toxicity: true,
            developmental_toxicity: true,
            ..NioshClassification::listed(NioshTable::Table1)
        });
        record.ghs_classifications = vec![
            GhsClassification::new("H301", "Toxic if swallowed"),
            GhsClassification::new("H360", "May damage fertility or the unborn child"),
        ];
        record.physical_form = PhysicalForm::Powder;
        record.ppe_recommendations = vec![
            PpeRequirement::new(PpeType::Gloves, "double-chemo-tested"),
            PpeRequirement::new(PpeType::Gown, "chemo-rated-gown"),
        ];
        record
    }

    /// NIOSH Table 2 drug handled as a solid.
    pub fn spironolactone() -> HazardAssessment {
        let mut record = HazardAssessment::new("Spironolactone", quality("niosh", 0.9));
        record.cas_number = Some("52-01-7".to_string());
        record.niosh = Some(NioshClassification::listed(NioshTable::Table2));
        record.physical_form = PhysicalForm::Tablet;
        record
    }

    /// Non-hazardous excipient at high confidence.
    pub fn clean_excipient(name: &str) -> HazardAssessment {
        let mut record = HazardAssessment::new(name, quality("pubchem", 0.95));
        record.physical_form = PhysicalForm::Cream;
        record.solubility = Solubility::Insoluble;
        record
    }

    /// Non-hazardous powder.
    pub fn powder_excipient(name: &str) -> HazardAssessment {
        let mut record = HazardAssessment::new(name, quality("pubchem", 0.9));
        record.physical_form = PhysicalForm::Powder;
        record
    }

    /// Skin irritant with a single GHS classification.
    pub fn irritant(name: &str) -> HazardAssessment {
        let mut record = HazardAssessment::new(name, quality("pubchem", 0.85));
        record.ghs_classifications = vec![GhsClassification::new("H315", "Causes skin irritation")];
        record.physical_form = PhysicalForm::Liquid;
        record
    }

    /// Non-hazardous record whose data is uncertain.
    pub fn low_confidence(name: &str, confidence: f64) -> HazardAssessment {
        let mut record = HazardAssessment::new(name, quality("dailymed", confidence));
        record.physical_form = PhysicalForm::Ointment;
        record
    }

    pub fn hydrocortisone_cream() -> CompoundFormulation {
        CompoundFormulation::new("Hydrocortisone 1% cream", DosageForm::Cream, 100.0)
            .with_ingredient(Ingredient::new("Hydrocortisone", 1.0))
            .with_ingredient(Ingredient::new("Cream base", 99.0))
    }

    pub fn methotrexate_capsules() -> CompoundFormulation {
        CompoundFormulation::new("Methotrexate 2.5 mg capsules", DosageForm::Capsule, 100.0)
            .with_ingredient(Ingredient::new("Methotrexate", 5.0).with_cas("59-05-2"))
            .with_ingredient(Ingredient::new("Microcrystalline cellulose", 95.0))
    }

    /// Single-ingredient formulation.
    pub fn single(name: &str, dosage_form: DosageForm) -> CompoundFormulation {
        CompoundFormulation::new(format!("{} preparation", name), dosage_form, 50.0)
            .with_ingredient(Ingredient::new(name, 100.0))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for hazmat-specific results.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &HazmatResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &HazmatResult<T>) {
        match result {
            Err(HazmatError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_level(assessment: &RiskAssessment, expected: RiskLevel) {
        assert_eq!(
            assessment.overall_risk_level, expected,
            "Expected {}, got {} (rationale: {:?})",
            expected, assessment.overall_risk_level, assessment.rationale
        );
    }

    #[track_caller]
    pub fn assert_level_at_least(assessment: &RiskAssessment, floor: RiskLevel) {
        assert!(
            assessment.overall_risk_level >= floor,
            "Expected at least {}, got {}",
            floor,
            assessment.overall_risk_level
        );
    }

    /// The assessment lists `ppe_type` at `specification` or stronger.
    #[track_caller]
    pub fn assert_ppe_at_least(assessment: &RiskAssessment, ppe_type: PpeType, specification: &str) {
        let floor = ppe_type.rank(specification);
        let Some(item) = assessment.ppe_for(ppe_type) else {
            panic!("No {} in required PPE: {:?}", ppe_type, assessment.required_ppe);
        };
        assert!(
            item.rank() >= floor,
            "{} is {}, expected at least {}",
            ppe_type,
            item.specification,
            specification
        );
    }

    /// The record is the worst-case conservative default.
    #[track_caller]
    pub fn assert_conservative(record: &HazardAssessment) {
        assert!(
            record
                .data_quality
                .sources
                .iter()
                .any(|s| s == CONSERVATIVE_DEFAULT_SOURCE),
            "Expected conservative default, got sources {:?}",
            record.data_quality.sources
        );
        assert!(record.data_quality.verification_required);
        assert_eq!(record.ppe_recommendations.len(), PpeType::ALL.len());
        assert!(!record.data_quality.warnings.is_empty());
    }

    #[track_caller]
    pub fn assert_fallback_failed<T: std::fmt::Debug>(result: &FallbackResult<T>) {
        assert!(!result.success, "Expected failed fallback, got {:?}", result);
        assert!(result.warning.is_some(), "Failed fallback must carry a warning");
    }
}

// ============================================================================
// TESTS
// ============================================================================
