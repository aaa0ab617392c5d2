//! Envelope and Observation Normalizer

use serde_json::Value;
use tracing::debug;
use vitals::{Observation, VitalKind};

use crate::envelope::Envelope;
use crate::error::NormalizeError;

const OBSERVATION_RESOURCE_TYPE: &str = "Observation";

/// Why an event produced no observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Envelope is not JSON or lacks patient id / resource
    MalformedEnvelope(String),
    /// Resource is not an Observation
    NotObservation(Option<String>),
    /// No coding carries a recognized LOINC code
    UnrecognizedCode(Option<String>),
    /// No numeric value in valueQuantity / valueInteger
    MissingValue,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MalformedEnvelope(reason) => write!(f, "malformed envelope: {}", reason),
            SkipReason::NotObservation(Some(t)) => write!(f, "resource type {} ignored", t),
            SkipReason::NotObservation(None) => f.write_str("resource without resourceType"),
            SkipReason::UnrecognizedCode(Some(c)) => write!(f, "code {} not tracked", c),
            SkipReason::UnrecognizedCode(None) => f.write_str("observation without code"),
            SkipReason::MissingValue => f.write_str("observation without numeric value"),
        }
    }
}

/// Result of normalizing one event
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Observation(Observation),
    Skip(SkipReason),
}

/// Normalize a raw feed payload.
///
/// Returns `Err` only when the envelope is well-formed but its embedded
/// resource cannot be parsed.
pub fn normalize(payload: &[u8]) -> Result<Normalized, NormalizeError> {
    let envelope: Envelope = match serde_json::from_slice(payload) {
        Ok(e) => e,
        Err(e) => return Ok(Normalized::Skip(SkipReason::MalformedEnvelope(e.to_string()))),
    };

    let patient_id = match envelope.patient_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => {
            return Ok(Normalized::Skip(SkipReason::MalformedEnvelope(
                "missing PatientId".to_string(),
            )))
        }
    };

    let resource = match envelope.resource_json {
        Some(Value::String(raw)) => serde_json::from_str::<Value>(&raw)?,
        Some(obj @ Value::Object(_)) => obj,
        _ => {
            return Ok(Normalized::Skip(SkipReason::MalformedEnvelope(
                "missing ResourceJson".to_string(),
            )))
        }
    };

    normalize_resource(&patient_id, &resource)
}

/// Extract an observation from an already-parsed FHIR resource
pub fn normalize_resource(
    patient_id: &str,
    resource: &Value,
) -> Result<Normalized, NormalizeError> {
    let resource = resource
        .as_object()
        .ok_or_else(|| NormalizeError::InvalidShape("resource is not a JSON object".to_string()))?;

    let resource_type = resource.get("resourceType").and_then(Value::as_str);
    if resource_type != Some(OBSERVATION_RESOURCE_TYPE) {
        return Ok(Normalized::Skip(SkipReason::NotObservation(
            resource_type.map(str::to_string),
        )));
    }

    let codes: Vec<&str> = resource
        .get("code")
        .and_then(|c| c.get("coding"))
        .and_then(Value::as_array)
        .map(|codings| {
            codings
                .iter()
                .filter_map(|coding| coding.get("code").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    let kind = match codes.iter().find_map(|code| VitalKind::from_loinc(code)) {
        Some(kind) => kind,
        None => {
            return Ok(Normalized::Skip(SkipReason::UnrecognizedCode(
                codes.first().map(|c| c.to_string()),
            )))
        }
    };

    // valueQuantity wins when present, even without a usable value
    let value = match resource.get("valueQuantity") {
        Some(quantity) => quantity.get("value").and_then(Value::as_f64),
        None => resource.get("valueInteger").and_then(Value::as_f64),
    };
    let value = match value {
        Some(v) => v,
        None => return Ok(Normalized::Skip(SkipReason::MissingValue)),
    };

    let observation_id = resource
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string);

    debug!("Patient {}: {} = {}", patient_id, kind, value);

    Ok(Normalized::Observation(Observation {
        patient_id: patient_id.to_string(),
        kind,
        value,
        observation_id,
    }))
}
