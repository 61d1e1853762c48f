//! Formulation input files.

use std::path::Path;

use hazmat_core::{CompoundFormulation, ConfigError};
use serde::Deserialize;

/// Accepted document shapes: a bare formulation or one wrapped under a
/// `formulation` key.
#[derive(Deserialize)]
#[serde(untagged)]
enum FormulationDocument {
    Wrapped { formulation: CompoundFormulation },
    Bare(CompoundFormulation),
}

impl From<FormulationDocument> for CompoundFormulation {
    fn from(doc: FormulationDocument) -> Self {
        match doc {
            FormulationDocument::Wrapped { formulation } => formulation,
            FormulationDocument::Bare(formulation) => formulation,
        }
    }
}

/// Parse a formulation from JSON text.
pub fn parse_formulation(json: &str) -> Result<CompoundFormulation, ConfigError> {
    serde_json::from_str::<FormulationDocument>(json)
        .map(Into::into)
        .map_err(|e| ConfigError::Parse {
            reason: format!("formulation: {}", e),
        })
}

/// Read a formulation JSON file.
///
/// Structural checks are left to `CompoundFormulation::validate`.
pub fn load_formulation(path: &Path) -> Result<CompoundFormulation, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        reason: format!("{}: {}", path.display(), e),
    })?;
    parse_formulation(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hazmat_core::DosageForm;
    use std::io::Write;

    const CAPSULES: &str = r#"{
        "name": "Methotrexate 2.5 mg capsules",
        "dosage_form": "capsule",
        "batch_quantity": 100.0,
        "ingredients": [
            { "name": "Methotrexate", "cas_number": "59-05-2", "percentage": 5.0 },
            { "name": "Microcrystalline cellulose", "percentage": 95.0, "physical_form": "powder" }
        ]
    }"#;

    #[test]
    fn test_load_formulation_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CAPSULES.as_bytes()).unwrap();

        let formulation = load_formulation(file.path()).unwrap();
        assert_eq!(formulation.dosage_form, DosageForm::Capsule);
        assert_eq!(formulation.ingredients.len(), 2);
        assert_eq!(formulation.batch_unit, "g");
        assert_eq!(
            formulation.ingredients[0].cas_number.as_deref(),
            Some("59-05-2")
        );
    }

    #[test]
    fn test_wrapped_document() {
        let wrapped = format!(r#"{{ "formulation": {} }}"#, CAPSULES);
        let formulation = parse_formulation(&wrapped).unwrap();
        assert_eq!(formulation.name, "Methotrexate 2.5 mg capsules");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_formulation(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = parse_formulation("{ \"name\": ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
