//! Feed Event Envelope

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope published on the observation topics.
///
/// `ResourceJson` is normally a JSON-encoded string; an inline object is
/// accepted as well.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "PatientId", default)]
    pub patient_id: Option<String>,
    #[serde(rename = "ResourceJson", default)]
    pub resource_json: Option<Value>,
}

impl Envelope {
    /// Build an envelope with a string-encoded resource
    pub fn new(patient_id: impl Into<String>, resource: &Value) -> Self {
        Self {
            patient_id: Some(patient_id.into()),
            resource_json: Some(Value::String(resource.to_string())),
        }
    }
}
