//! FHIR Observation Normalization
//!
//! Turns a raw feed payload (an event envelope carrying a FHIR resource) into
//! at most one typed [`vitals::Observation`]. Irrelevant or malformed events are
//! reported as [`Normalized::Skip`] rather than errors.

mod envelope;
mod error;
mod normalizer;

pub use envelope::Envelope;
pub use error::NormalizeError;
pub use normalizer::{normalize, normalize_resource, Normalized, SkipReason};
