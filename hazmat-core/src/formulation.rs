//! Compound formulations submitted for assessment.

use crate::error::ValidationError;
use crate::hazard::PhysicalForm;
use serde::{Deserialize, Serialize};

/// Final dosage form of the compounded preparation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DosageForm {
    Cream,
    Ointment,
    Gel,
    Capsule,
    Tablet,
    Solution,
    Suspension,
    Suppository,
    Powder,
    Lozenge,
    Other,
}

impl DosageForm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cream => "cream",
            Self::Ointment => "ointment",
            Self::Gel => "gel",
            Self::Capsule => "capsule",
            Self::Tablet => "tablet",
            Self::Solution => "solution",
            Self::Suspension => "suspension",
            Self::Suppository => "suppository",
            Self::Powder => "powder",
            Self::Lozenge => "lozenge",
            Self::Other => "other",
        }
    }
}

/// One ingredient line of a formulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    #[serde(default)]
    pub cas_number: Option<String>,
    /// Share of the final preparation, 0-100
    pub percentage: f64,
    /// Form as handled at the bench, when it differs from the source record
    #[serde(default)]
    pub physical_form: Option<PhysicalForm>,
}

impl Ingredient {
    pub fn new(name: impl Into<String>, percentage: f64) -> Self {
        Self {
            name: name.into(),
            cas_number: None,
            percentage,
            physical_form: None,
        }
    }

    pub fn with_cas(mut self, cas: impl Into<String>) -> Self {
        self.cas_number = Some(cas.into());
        self
    }

    pub fn with_form(mut self, form: PhysicalForm) -> Self {
        self.physical_form = Some(form);
        self
    }

    /// Identifier used for lookups: CAS number when known, else the name.
    pub fn lookup_key(&self) -> &str {
        self.cas_number
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(&self.name)
    }
}

/// A compounded preparation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundFormulation {
    pub name: String,
    pub dosage_form: DosageForm,
    pub ingredients: Vec<Ingredient>,
    /// Batch size in `batch_unit`
    pub batch_quantity: f64,
    #[serde(default = "default_batch_unit")]
    pub batch_unit: String,
}

fn default_batch_unit() -> String {
    "g".to_string()
}

impl CompoundFormulation {
    pub fn new(name: impl Into<String>, dosage_form: DosageForm, batch_quantity: f64) -> Self {
        Self {
            name: name.into(),
            dosage_form,
            ingredients: Vec::new(),
            batch_quantity,
            batch_unit: default_batch_unit(),
        }
    }

    pub fn with_ingredient(mut self, ingredient: Ingredient) -> Self {
        self.ingredients.push(ingredient);
        self
    }

    /// Structural validation, run before any source is contacted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "name".to_string(),
            });
        }
        if self.ingredients.is_empty() {
            return Err(ValidationError::EmptyFormulation {
                compound: self.name.clone(),
            });
        }
        if !self.batch_quantity.is_finite() || self.batch_quantity <= 0.0 {
            return Err(ValidationError::InvalidValue {
                field: "batch_quantity".to_string(),
                reason: format!("must be positive, got {}", self.batch_quantity),
            });
        }
        for (idx, ingredient) in self.ingredients.iter().enumerate() {
            if ingredient.name.trim().is_empty() {
                return Err(ValidationError::RequiredFieldMissing {
                    field: format!("ingredients[{}].name", idx),
                });
            }
            let pct = ingredient.percentage;
            if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
                return Err(ValidationError::InvalidValue {
                    field: format!("ingredients[{}].percentage", idx),
                    reason: format!("must be within 0-100, got {}", pct),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cream() -> CompoundFormulation {
        CompoundFormulation::new("Hydrocortisone 1% cream", DosageForm::Cream, 100.0)
            .with_ingredient(Ingredient::new("hydrocortisone", 1.0))
            .with_ingredient(Ingredient::new("cream base", 99.0))
    }

    #[test]
    fn test_valid_formulation() {
        assert!(cream().validate().is_ok());
    }

    #[test]
    fn test_empty_ingredients_rejected() {
        let mut f = cream();
        f.ingredients.clear();
        assert!(matches!(
            f.validate(),
            Err(ValidationError::EmptyFormulation { .. })
        ));
    }

    #[test]
    fn test_percentage_out_of_range_rejected() {
        let f = cream().with_ingredient(Ingredient::new("bad", 140.0));
        let err = f.validate().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { ref field, .. } if field == "ingredients[2].percentage"));
    }

    #[test]
    fn test_non_positive_batch_rejected() {
        let mut f = cream();
        f.batch_quantity = 0.0;
        assert!(f.validate().is_err());
    }

    #[test]
    fn test_lookup_key_prefers_cas() {
        let i = Ingredient::new("Methotrexate", 2.5).with_cas("59-05-2");
        assert_eq!(i.lookup_key(), "59-05-2");
        let blank = Ingredient::new("Methotrexate", 2.5).with_cas("  ");
        assert_eq!(blank.lookup_key(), "Methotrexate");
    }
}
