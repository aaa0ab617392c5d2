//! Vital Signs and qSOFA Criteria
//!
//! Shared clinical vocabulary for the detector:
//! - Vital-sign kinds and their LOINC codes
//! - Fixed qSOFA abnormality thresholds
//! - Criterion records and the per-patient criteria set

mod criteria;
mod kind;
mod rules;

pub use criteria::{CriteriaSet, CriterionRecord};
pub use kind::{Observation, VitalKind};
pub use rules::{is_abnormal, QSOFA_ALERT_THRESHOLD};
