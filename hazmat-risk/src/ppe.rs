//! PPE and engineering-control aggregation.

use std::collections::BTreeSet;

use hazmat_core::{
    strongest_per_type, EngineeringControl, IngredientAssessment, PpeRequirement, PpeType,
    RiskLevel,
};

use crate::rules::effective_form;

/// Minimum PPE every preparation at `level` requires.
pub fn level_minimum_ppe(level: RiskLevel) -> Vec<PpeRequirement> {
    use PpeType::*;
    let items: &[(PpeType, &str)] = match level {
        RiskLevel::A => &[(Gloves, "nitrile"), (Gown, "lab-coat"), (HairCover, "hair-cover")],
        RiskLevel::B => &[
            (Gloves, "double-nitrile"),
            (Gown, "disposable-gown"),
            (EyeProtection, "safety-glasses"),
            (HairCover, "hair-cover"),
            (ShoeCovers, "shoe-covers"),
        ],
        RiskLevel::C => &[
            (Gloves, "double-chemo-tested"),
            (Gown, "chemo-rated-gown"),
            (EyeProtection, "goggles"),
            (Respirator, "n95"),
            (HairCover, "hair-cover"),
            (ShoeCovers, "double-shoe-covers"),
            (SleeveCovers, "sleeve-covers"),
        ],
    };
    items
        .iter()
        .map(|(ppe_type, spec)| PpeRequirement::new(*ppe_type, *spec))
        .collect()
}

/// Minimum engineering controls at `level`.
pub fn level_minimum_controls(level: RiskLevel) -> Vec<EngineeringControl> {
    match level {
        RiskLevel::A => vec![EngineeringControl::GeneralVentilation],
        RiskLevel::B => vec![
            EngineeringControl::GeneralVentilation,
            EngineeringControl::VentilatedBalanceEnclosure,
        ],
        RiskLevel::C => vec![
            EngineeringControl::ContainmentPrimaryEngineeringControl,
            EngineeringControl::ContainmentSecondaryEngineeringControl,
        ],
    }
}

/// Strongest PPE per type across every ingredient record, the level
/// minimum, and a respirator when any ingredient is handled as powder.
pub fn aggregate_ppe(ingredients: &[IngredientAssessment], level: RiskLevel) -> Vec<PpeRequirement> {
    let mut items: Vec<PpeRequirement> = ingredients
        .iter()
        .flat_map(|i| i.hazard.ppe_recommendations.iter().cloned())
        .collect();
    items.extend(level_minimum_ppe(level));

    let powders: Vec<&str> = ingredients
        .iter()
        .filter(|i| effective_form(&i.ingredient, &i.hazard).is_powder())
        .map(|i| i.ingredient.name.as_str())
        .collect();
    if !powders.is_empty() {
        items.push(
            PpeRequirement::new(PpeType::Respirator, "n95")
                .with_notes(format!("Powder handling: {}", powders.join(", "))),
        );
    }

    strongest_per_type(items)
}

/// Union of recommended controls and the level minimum, least to most
/// containment.
pub fn aggregate_controls(
    ingredients: &[IngredientAssessment],
    level: RiskLevel,
) -> Vec<EngineeringControl> {
    let mut controls: BTreeSet<EngineeringControl> = ingredients
        .iter()
        .flat_map(|i| i.hazard.engineering_controls.iter().copied())
        .collect();
    controls.extend(level_minimum_controls(level));
    if ingredients
        .iter()
        .any(|i| effective_form(&i.ingredient, &i.hazard).is_powder())
        && level < RiskLevel::C
    {
        controls.insert(EngineeringControl::VentilatedBalanceEnclosure);
    }
    controls.into_iter().collect()
}
