//! Classification scenarios against scripted hazard data.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use hazmat_core::{Clock, HazmatConfig, RiskSettings};
use hazmat_reliability::{DatasetHazardSource, FallbackOrchestrator, HazardDataService};
use hazmat_risk::{expiry_window, level_minimum_ppe, RiskEngine};
use hazmat_storage::{CacheConfig, TtlCache};
use hazmat_test_utils::assertions::{
    assert_conservative, assert_level, assert_level_at_least, assert_ppe_at_least,
    assert_validation_error,
};
use hazmat_test_utils::generators::arb_formulation_with_records;
use hazmat_test_utils::{
    fixtures, CompoundFormulation, DosageForm, EngineeringControl, HazardLookup, Ingredient,
    ManualClock, MockHazardLookup, PhysicalForm, PpeType, RiskLevel,
};
use proptest::prelude::*;

fn engine_with(lookup: Arc<dyn HazardLookup>, clock: &ManualClock) -> RiskEngine {
    RiskEngine::new(lookup, RiskSettings::default(), Arc::new(clock.clone()))
}

fn engine(lookup: MockHazardLookup) -> (RiskEngine, ManualClock) {
    let clock = ManualClock::starting_now();
    (engine_with(Arc::new(lookup), &clock), clock)
}

#[tokio::test]
async fn table1_drug_is_level_c_with_containment() {
    let (engine, _) = engine(
        MockHazardLookup::new()
            .with_record(fixtures::methotrexate())
            .with_record(fixtures::powder_excipient("Microcrystalline cellulose")),
    );

    let assessment = engine
        .assess_compound(&fixtures::methotrexate_capsules())
        .await
        .unwrap();

    assert_level(&assessment, RiskLevel::C);
    assert!(assessment
        .rationale
        .iter()
        .any(|r| r.contains("Methotrexate: NIOSH Table 1")));
    assert_ppe_at_least(&assessment, PpeType::Gloves, "double-chemo-tested");
    assert_ppe_at_least(&assessment, PpeType::Gown, "chemo-rated-gown");
    assert_ppe_at_least(&assessment, PpeType::Respirator, "n95");
    assert!(assessment
        .engineering_controls
        .contains(&EngineeringControl::ContainmentPrimaryEngineeringControl));
    assert!(assessment
        .additional_precautions
        .iter()
        .any(|p| p.contains("pregnant")));
    // Table 1 contributes highly at any share
    assert!(assessment.review_required);
}

#[tokio::test]
async fn powder_excipient_is_level_b() {
    let (engine, _) = engine(MockHazardLookup::new().with_record(fixtures::powder_excipient("Zinc oxide")));

    let assessment = engine
        .assess_compound(&fixtures::single("Zinc oxide", DosageForm::Powder))
        .await
        .unwrap();

    assert_level(&assessment, RiskLevel::B);
    assert_ppe_at_least(&assessment, PpeType::Respirator, "n95");
    assert!(assessment
        .engineering_controls
        .contains(&EngineeringControl::VentilatedBalanceEnclosure));
    assert!(!assessment.review_required);
}

#[tokio::test]
async fn bench_form_override_makes_cream_ingredient_a_powder() {
    let (engine, _) = engine(MockHazardLookup::new().with_record(fixtures::clean_excipient("Talc")));
    let compound = CompoundFormulation::new("Talc dusting", DosageForm::Powder, 50.0)
        .with_ingredient(Ingredient::new("Talc", 100.0).with_form(PhysicalForm::Powder));

    let assessment = engine.assess_compound(&compound).await.unwrap();
    assert_level(&assessment, RiskLevel::B);
}

#[tokio::test]
async fn clean_high_confidence_compound_is_level_a() {
    let (engine, _) = engine(MockHazardLookup::new().with_record(fixtures::clean_excipient("Petrolatum")));

    let assessment = engine
        .assess_compound(&fixtures::single("Petrolatum", DosageForm::Ointment))
        .await
        .unwrap();

    assert_level(&assessment, RiskLevel::A);
    assert!(!assessment.review_required);
    assert_eq!(assessment.rationale.len(), 1);
    assert_eq!(
        assessment.ppe_for(PpeType::Gloves).unwrap().specification,
        "nitrile"
    );
    assert_eq!(
        assessment.expiry_date - assessment.assessed_at,
        ChronoDuration::days(365)
    );
}

#[tokio::test]
async fn two_irritants_escalate_to_level_b() {
    let (engine, _) = engine(
        MockHazardLookup::new()
            .with_record(fixtures::irritant("Menthol"))
            .with_record(fixtures::irritant("Camphor")),
    );
    let compound = CompoundFormulation::new("Menthol camphor gel", DosageForm::Gel, 60.0)
        .with_ingredient(Ingredient::new("Menthol", 0.5))
        .with_ingredient(Ingredient::new("Camphor", 0.5));

    let assessment = engine.assess_compound(&compound).await.unwrap();
    assert_level(&assessment, RiskLevel::B);
    assert!(assessment
        .rationale
        .iter()
        .any(|r| r.starts_with("2 hazardous ingredients")));
    assert!(assessment
        .ingredients
        .iter()
        .all(|i| i.implied_level == RiskLevel::A));
}

#[tokio::test]
async fn low_confidence_data_is_at_least_b_and_flagged() {
    let (engine, _) = engine(
        MockHazardLookup::new().with_record(fixtures::low_confidence("Cold cream base", 0.4)),
    );

    let assessment = engine
        .assess_compound(&fixtures::single("Cold cream base", DosageForm::Cream))
        .await
        .unwrap();

    assert_level_at_least(&assessment, RiskLevel::B);
    assert!(assessment.review_required);
    assert!(assessment
        .additional_precautions
        .iter()
        .any(|p| p.contains("Cold cream base")));
    assert_eq!(
        assessment.expiry_date - assessment.assessed_at,
        ChronoDuration::days(90)
    );
}

#[tokio::test]
async fn very_low_confidence_expires_in_thirty_days() {
    let (engine, clock) = engine(
        MockHazardLookup::new()
            .with_record(fixtures::clean_excipient("Glycerin"))
            .with_record(fixtures::low_confidence("Unknown base", 0.2)),
    );
    let compound = CompoundFormulation::new("Glycerin blend", DosageForm::Solution, 100.0)
        .with_ingredient(Ingredient::new("Glycerin", 60.0))
        .with_ingredient(Ingredient::new("Unknown base", 40.0));

    let assessment = engine.assess_compound(&compound).await.unwrap();
    assert!((assessment.lowest_confidence() - 0.2).abs() < 1e-9);
    assert_eq!(assessment.assessed_at, clock.now());
    assert_eq!(assessment.expiry_date, clock.now() + ChronoDuration::days(30));
    assert!(!assessment.is_expired_at(clock.now() + ChronoDuration::days(29)));
    assert!(assessment.is_expired_at(clock.now() + ChronoDuration::days(31)));
}

#[tokio::test]
async fn failed_lookup_uses_conservative_record() {
    let lookup = MockHazardLookup::new()
        .with_record(fixtures::clean_excipient("Cream base"))
        .with_failure("Hydrocortisone");
    let (engine, _) = engine(lookup);

    let assessment = engine
        .assess_compound(&fixtures::hydrocortisone_cream())
        .await
        .unwrap();

    assert_level(&assessment, RiskLevel::C);
    assert!(assessment.review_required);
    let hydrocortisone = &assessment.ingredients[0];
    assert!(hydrocortisone.substituted_default);
    assert_conservative(&hydrocortisone.hazard);
    assert_eq!(assessment.required_ppe.len(), PpeType::ALL.len());
    for ppe_type in PpeType::ALL {
        assert_eq!(
            assessment.ppe_for(ppe_type).unwrap().specification,
            ppe_type.strongest()
        );
    }
    assert_eq!(
        assessment.expiry_date - assessment.assessed_at,
        ChronoDuration::days(30)
    );
}

#[tokio::test]
async fn empty_formulation_is_rejected_without_lookups() {
    let lookup = Arc::new(MockHazardLookup::new());
    let clock = ManualClock::starting_now();
    let engine = engine_with(lookup.clone(), &clock);

    let result = engine
        .assess_compound(&CompoundFormulation::new("Nothing", DosageForm::Cream, 10.0))
        .await;

    assert_validation_error(&result);
    assert_eq!(lookup.call_count(), 0);
}

#[tokio::test]
async fn service_backed_engine_resolves_by_cas_and_degrades_on_gaps() {
    let clock = ManualClock::starting_now();
    let dataset = DatasetHazardSource::from_records(
        "dataset",
        1.0,
        vec![
            fixtures::methotrexate(),
            fixtures::powder_excipient("Microcrystalline cellulose"),
        ],
    );
    let service = HazardDataService::new(
        Arc::new(TtlCache::new(CacheConfig::default(), Arc::new(clock.clone()))),
        Arc::new(FallbackOrchestrator::from_config(
            &HazmatConfig::default(),
            Arc::new(clock.clone()),
        )),
    )
    .with_source(Arc::new(dataset));
    let engine = engine_with(Arc::new(service), &clock);

    let assessment = engine
        .assess_compound(&fixtures::methotrexate_capsules())
        .await
        .unwrap();
    assert_level(&assessment, RiskLevel::C);
    assert!(assessment.ingredients.iter().all(|i| !i.substituted_default));
    assert_eq!(
        assessment.ingredients[0].hazard.cas_number.as_deref(),
        Some("59-05-2")
    );

    let with_gap = fixtures::methotrexate_capsules()
        .with_ingredient(Ingredient::new("Unlisted flavoring", 0.1));
    let assessment = engine.assess_compound(&with_gap).await.unwrap();
    let flavoring = &assessment.ingredients[2];
    assert!(flavoring.substituted_default);
    assert_conservative(&flavoring.hazard);
    assert!(assessment.review_required);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_level_dominates_every_ingredient((formulation, records) in arb_formulation_with_records()) {
        let lookup = records
            .into_iter()
            .fold(MockHazardLookup::new(), MockHazardLookup::with_record);
        let (engine, _) = engine(lookup);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        let assessment = runtime.block_on(engine.assess_compound(&formulation)).unwrap();

        for ingredient in &assessment.ingredients {
            prop_assert!(assessment.overall_risk_level >= ingredient.implied_level);
        }
        for minimum in level_minimum_ppe(assessment.overall_risk_level) {
            let chosen = assessment.ppe_for(minimum.ppe_type).unwrap();
            prop_assert!(chosen.rank() >= minimum.rank());
        }
        prop_assert_eq!(
            assessment.expiry_date - assessment.assessed_at,
            expiry_window(assessment.lowest_confidence())
        );
    }
}
