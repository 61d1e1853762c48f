//! Protective equipment and engineering controls.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Category of personal protective equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PpeType {
    Gloves,
    Gown,
    EyeProtection,
    Respirator,
    HairCover,
    ShoeCovers,
    SleeveCovers,
}

impl PpeType {
    pub const ALL: [PpeType; 7] = [
        PpeType::Gloves,
        PpeType::Gown,
        PpeType::EyeProtection,
        PpeType::Respirator,
        PpeType::HairCover,
        PpeType::ShoeCovers,
        PpeType::SleeveCovers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gloves => "gloves",
            Self::Gown => "gown",
            Self::EyeProtection => "eye_protection",
            Self::Respirator => "respirator",
            Self::HairCover => "hair_cover",
            Self::ShoeCovers => "shoe_covers",
            Self::SleeveCovers => "sleeve_covers",
        }
    }

    /// Specifications for this type, weakest first.
    pub fn hierarchy(&self) -> &'static [&'static str] {
        match self {
            Self::Gloves => &["nitrile", "double-nitrile", "double-chemo-tested"],
            Self::Gown => &["lab-coat", "disposable-gown", "chemo-rated-gown"],
            Self::EyeProtection => &["safety-glasses", "goggles", "face-shield"],
            Self::Respirator => &["surgical-mask", "n95", "papr"],
            Self::HairCover => &["hair-cover"],
            Self::ShoeCovers => &["shoe-covers", "double-shoe-covers"],
            Self::SleeveCovers => &["sleeve-covers"],
        }
    }

    /// Position of `specification` in this type's hierarchy.
    ///
    /// Unknown specifications rank below every known one, so an unrecognized
    /// upstream value can never displace a known protective level.
    pub fn rank(&self, specification: &str) -> Option<usize> {
        let normalized = specification.trim().to_ascii_lowercase();
        self.hierarchy().iter().position(|s| *s == normalized)
    }

    /// Strongest specification of this type.
    pub fn strongest(&self) -> &'static str {
        self.hierarchy().last().copied().unwrap_or("")
    }
}

impl std::fmt::Display for PpeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One PPE item with its required specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PpeRequirement {
    pub ppe_type: PpeType,
    pub specification: String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_required() -> bool {
    true
}

impl PpeRequirement {
    pub fn new(ppe_type: PpeType, specification: impl Into<String>) -> Self {
        Self {
            ppe_type,
            specification: specification.into(),
            required: true,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn rank(&self) -> Option<usize> {
        self.ppe_type.rank(&self.specification)
    }
}

/// Maximal PPE set: the strongest specification of every type.
pub fn maximal_ppe() -> Vec<PpeRequirement> {
    PpeType::ALL
        .iter()
        .map(|t| PpeRequirement::new(*t, t.strongest()))
        .collect()
}

/// Keep the highest-ranked specification of each PPE type.
///
/// Ties keep the first item seen. A type is required if any input for it is.
/// Output is ordered by [`PpeType`].
pub fn strongest_per_type(items: impl IntoIterator<Item = PpeRequirement>) -> Vec<PpeRequirement> {
    let mut best: BTreeMap<PpeType, PpeRequirement> = BTreeMap::new();
    for item in items {
        match best.get_mut(&item.ppe_type) {
            None => {
                best.insert(item.ppe_type, item);
            }
            Some(current) => {
                let required = current.required || item.required;
                if item.rank() > current.rank() {
                    *current = item;
                }
                current.required = required;
            }
        }
    }
    best.into_values().collect()
}

/// Engineering control, ordered from least to most containment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineeringControl {
    GeneralVentilation,
    VentilatedBalanceEnclosure,
    ClassIiBiologicalSafetyCabinet,
    ContainmentPrimaryEngineeringControl,
    ContainmentSecondaryEngineeringControl,
    ClosedSystemTransferDevice,
}

impl EngineeringControl {
    /// Containment-grade controls used for worst-case handling.
    pub fn containment_grade() -> Vec<EngineeringControl> {
        vec![
            Self::ContainmentPrimaryEngineeringControl,
            Self::ContainmentSecondaryEngineeringControl,
            Self::ClosedSystemTransferDevice,
        ]
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::GeneralVentilation => "General room ventilation",
            Self::VentilatedBalanceEnclosure => "Ventilated balance enclosure for weighing",
            Self::ClassIiBiologicalSafetyCabinet => "Class II biological safety cabinet",
            Self::ContainmentPrimaryEngineeringControl => {
                "Externally vented containment primary engineering control (C-PEC)"
            }
            Self::ContainmentSecondaryEngineeringControl => {
                "Negative-pressure containment secondary engineering control (C-SEC)"
            }
            Self::ClosedSystemTransferDevice => "Closed-system drug-transfer device",
        }
    }
}
