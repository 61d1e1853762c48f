//! Merging hazard records from several sources.
//!
//! Every field resolves toward the more hazardous reading: the union of GHS
//! codes, the most severe NIOSH table with flags OR-ed, powder if any source
//! says powder, the strongest PPE per type.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use hazmat_core::{
    strongest_per_type, HazardAssessment, NioshClassification, PhysicalForm, Solubility,
};

use crate::fallback::Sourced;

/// Merge records, highest confidence first. Returns `None` for an empty slice.
///
/// The merged record takes `confidence` as its data-quality confidence.
pub fn merge_assessments(
    records: &[Sourced<HazardAssessment>],
    confidence: f64,
) -> Option<HazardAssessment> {
    let (first, rest) = records.split_first()?;
    let mut merged = first.value.clone();

    for sourced in rest {
        let other = &sourced.value;

        if merged.cas_number.is_none() {
            merged.cas_number = other.cas_number.clone();
        }

        for ghs in &other.ghs_classifications {
            let code = ghs.code.trim();
            if !merged
                .ghs_classifications
                .iter()
                .any(|g| g.code.trim().eq_ignore_ascii_case(code))
            {
                merged.ghs_classifications.push(ghs.clone());
            }
        }

        merged.niosh = merge_niosh(merged.niosh.take(), other.niosh.as_ref());
        merged.physical_form = merge_form(merged.physical_form, other.physical_form);
        if merged.solubility == Solubility::Unknown {
            merged.solubility = other.solubility;
        }

        merged
            .ppe_recommendations
            .extend(other.ppe_recommendations.iter().cloned());
        merged
            .engineering_controls
            .extend(other.engineering_controls.iter().copied());

        let quality = &mut merged.data_quality;
        for source in &other.data_quality.sources {
            if !quality.sources.contains(source) {
                quality.sources.push(source.clone());
            }
        }
        for warning in &other.data_quality.warnings {
            if !quality.warnings.contains(warning) {
                quality.warnings.push(warning.clone());
            }
        }
        quality.verification_required |= other.data_quality.verification_required;
        quality.last_updated = latest(quality.last_updated, other.data_quality.last_updated);
    }

    merged.ppe_recommendations = strongest_per_type(merged.ppe_recommendations);
    let controls: BTreeSet<_> = merged.engineering_controls.drain(..).collect();
    merged.engineering_controls = controls.into_iter().collect();
    merged.data_quality.confidence = confidence;
    Some(merged)
}

fn merge_niosh(
    current: Option<NioshClassification>,
    other: Option<&NioshClassification>,
) -> Option<NioshClassification> {
    match (current, other) {
        (None, None) => None,
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b.clone()),
        (Some(a), Some(b)) => Some(NioshClassification {
            table: match (a.table, b.table) {
                (Some(x), Some(y)) => Some(x.most_severe(y)),
                (x, y) => x.or(y),
            },
            carcinogenic: a.carcinogenic || b.carcinogenic,
            reproductive_toxicity: a.reproductive_toxicity || b.reproductive_toxicity,
            developmental_toxicity: a.developmental_toxicity || b.developmental_toxicity,
            genotoxic: a.genotoxic || b.genotoxic,
            assumed_hazardous: a.assumed_hazardous || b.assumed_hazardous,
        }),
    }
}

fn merge_form(current: PhysicalForm, other: PhysicalForm) -> PhysicalForm {
    if current.is_powder() {
        current
    } else if other.is_powder() || current == PhysicalForm::Unknown {
        other
    } else {
        current
    }
}

fn latest(a: DateTime<Utc>, b: DateTime<Utc>) -> DateTime<Utc> {
    a.max(b)
}
