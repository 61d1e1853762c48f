//! hazmat Risk - Hazardous-drug risk classification
//!
//! Takes a compounded formulation, resolves a hazard record for every
//! ingredient through a [`HazardLookup`], and produces a [`RiskAssessment`]:
//! a Level A/B/C tier with its rationale, the strongest required PPE per
//! type, engineering controls, precautions, a review flag and an expiry
//! that shortens as data confidence drops.
//!
//! ```ignore
//! let engine = RiskEngine::new(Arc::new(service), config.risk.clone(), clock);
//! let assessment = engine.assess_compound(&formulation).await?;
//! ```

pub mod engine;
pub mod input;
pub mod ppe;
pub mod precautions;
pub mod rules;
pub mod telemetry;

pub use engine::RiskEngine;
pub use input::{load_formulation, parse_formulation};
pub use ppe::{aggregate_controls, aggregate_ppe, level_minimum_controls, level_minimum_ppe};
pub use precautions::{additional_precautions, dosage_form_note, incompatibilities};
pub use rules::{
    classify, contribution, effective_form, expiry_window, implied_level, ingredient_findings,
    review_required, Finding,
};
pub use telemetry::{init_tracing, LogFormat};

pub use hazmat_core::{RiskAssessment, RiskLevel};
pub use hazmat_reliability::HazardLookup;
