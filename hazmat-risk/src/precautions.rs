//! Additional precautions attached to an assessment.

use hazmat_core::{
    normalize_identifier, CompoundFormulation, DosageForm, IngredientAssessment, RiskLevel,
    RiskSettings,
};

/// Known problematic ingredient pairs, matched on normalized names.
const INCOMPATIBLE_PAIRS: &[(&str, &str, &str)] = &[
    (
        "benzoyl peroxide",
        "tretinoin",
        "benzoyl peroxide oxidizes tretinoin; prepare separately",
    ),
    (
        "salicylic acid",
        "zinc oxide",
        "forms zinc salicylate and hardens the base",
    ),
    (
        "sodium bicarbonate",
        "citric acid",
        "releases carbon dioxide on contact with moisture",
    ),
    (
        "potassium permanganate",
        "glycerin",
        "strong oxidizer with glycerin risks spontaneous ignition",
    ),
    (
        "silver nitrate",
        "sodium chloride",
        "precipitates silver chloride",
    ),
    (
        "hydrogen peroxide",
        "potassium permanganate",
        "violent oxidation",
    ),
];

/// Handling note for the final dosage form.
pub fn dosage_form_note(form: DosageForm) -> Option<&'static str> {
    match form {
        DosageForm::Powder | DosageForm::Capsule => Some(
            "Weigh, triturate and fill inside a ventilated enclosure to contain airborne particles",
        ),
        DosageForm::Tablet => Some("Do not crush or split tablets outside a containment device"),
        DosageForm::Cream | DosageForm::Ointment | DosageForm::Gel => Some(
            "Use a closed mixing system to limit aerosolization during levigation",
        ),
        DosageForm::Solution | DosageForm::Suspension => {
            Some("Guard against splashing; use luer-lock equipment for transfers")
        }
        DosageForm::Suppository | DosageForm::Lozenge => {
            Some("Melt bases in a covered vessel and avoid open heating of active ingredients")
        }
        DosageForm::Other => None,
    }
}

/// Incompatibility notes for every known pair present in `ingredients`.
pub fn incompatibilities(ingredients: &[IngredientAssessment]) -> Vec<String> {
    let names: Vec<String> = ingredients
        .iter()
        .map(|i| normalize_identifier(&i.ingredient.name))
        .collect();
    let present = |needle: &str| names.iter().any(|n| n.contains(needle));

    INCOMPATIBLE_PAIRS
        .iter()
        .filter(|(a, b, _)| present(*a) && present(*b))
        .map(|(a, b, note)| format!("Incompatibility: {} + {}: {}", a, b, note))
        .collect()
}

/// Every precaution for the compound, without duplicates.
pub fn additional_precautions(
    compound: &CompoundFormulation,
    ingredients: &[IngredientAssessment],
    level: RiskLevel,
    settings: &RiskSettings,
) -> Vec<String> {
    let mut notes: Vec<String> = Vec::new();
    let mut add = |note: String| {
        if !notes.contains(&note) {
            notes.push(note);
        }
    };

    if let Some(note) = dosage_form_note(compound.dosage_form) {
        add(note.to_string());
    }
    for note in incompatibilities(ingredients) {
        add(note);
    }

    let uncertain: Vec<&str> = ingredients
        .iter()
        .filter(|i| i.confidence() < settings.low_confidence_threshold)
        .map(|i| i.ingredient.name.as_str())
        .collect();
    if !uncertain.is_empty() {
        add(format!(
            "Low-confidence hazard data for: {}. Verify against a current SDS before compounding",
            uncertain.join(", ")
        ));
    }

    if compound.batch_quantity > settings.large_batch_threshold {
        add(format!(
            "Large batch ({} {}) exceeds {} {}; plan for additional containment and cleaning",
            compound.batch_quantity,
            compound.batch_unit,
            settings.large_batch_threshold,
            compound.batch_unit
        ));
    }

    if level == RiskLevel::C {
        add("Only personnel trained in hazardous drug handling may prepare this compound".to_string());
        add("Staff who are pregnant, planning pregnancy or breastfeeding must not prepare this compound".to_string());
        add("Record each preparation in the hazardous drug exposure log".to_string());
    }

    for warning in ingredients
        .iter()
        .flat_map(|i| i.hazard.data_quality.warnings.iter())
    {
        add(warning.clone());
    }

    notes
}
