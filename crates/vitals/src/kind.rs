//! Vital-Sign Kinds and LOINC Codes

use serde::{Deserialize, Serialize};

/// Vital signs recognized by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalKind {
    /// Respiratory rate, breaths/min (LOINC 9279-1)
    RespiratoryRate,
    /// Systolic blood pressure, mmHg (LOINC 85354-9)
    SystolicBp,
    /// Glasgow Coma Scale as mental-status proxy (LOINC 9269-2)
    #[serde(rename = "gcs")]
    MentalStatus,
    /// Heart rate, beats/min (LOINC 8867-4)
    HeartRate,
    /// Body temperature (LOINC 8310-5)
    Temperature,
}

impl VitalKind {
    /// All recognized kinds
    pub const ALL: [VitalKind; 5] = [
        VitalKind::RespiratoryRate,
        VitalKind::SystolicBp,
        VitalKind::MentalStatus,
        VitalKind::HeartRate,
        VitalKind::Temperature,
    ];

    /// Kinds that count toward the qSOFA score
    pub const SCORING: [VitalKind; 3] = [
        VitalKind::RespiratoryRate,
        VitalKind::SystolicBp,
        VitalKind::MentalStatus,
    ];

    /// Map a LOINC code to a vital kind
    pub fn from_loinc(code: &str) -> Option<Self> {
        match code {
            "9279-1" => Some(VitalKind::RespiratoryRate),
            "85354-9" => Some(VitalKind::SystolicBp),
            "9269-2" => Some(VitalKind::MentalStatus),
            "8867-4" => Some(VitalKind::HeartRate),
            "8310-5" => Some(VitalKind::Temperature),
            _ => None,
        }
    }

    /// LOINC code for this kind
    pub fn loinc(&self) -> &'static str {
        match self {
            VitalKind::RespiratoryRate => "9279-1",
            VitalKind::SystolicBp => "85354-9",
            VitalKind::MentalStatus => "9269-2",
            VitalKind::HeartRate => "8867-4",
            VitalKind::Temperature => "8310-5",
        }
    }

    /// Hash field name used in the keyed store and in alert payloads
    pub fn field_name(&self) -> &'static str {
        match self {
            VitalKind::RespiratoryRate => "respiratory_rate",
            VitalKind::SystolicBp => "systolic_bp",
            VitalKind::MentalStatus => "gcs",
            VitalKind::HeartRate => "heart_rate",
            VitalKind::Temperature => "temperature",
        }
    }

    /// Reverse of [`VitalKind::field_name`]
    pub fn from_field_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.field_name() == name)
    }

    /// Whether this kind participates in the qSOFA score
    pub fn is_scoring(&self) -> bool {
        matches!(
            self,
            VitalKind::RespiratoryRate | VitalKind::SystolicBp | VitalKind::MentalStatus
        )
    }
}

impl std::fmt::Display for VitalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field_name())
    }
}

/// A single normalized observation, discarded after one pass through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub patient_id: String,
    pub kind: VitalKind,
    pub value: f64,
    /// Source resource id, carried into alerts for traceability
    pub observation_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loinc_round_trip() {
        for kind in VitalKind::ALL {
            assert_eq!(VitalKind::from_loinc(kind.loinc()), Some(kind));
            assert_eq!(VitalKind::from_field_name(kind.field_name()), Some(kind));
        }
        assert_eq!(VitalKind::from_loinc("8480-6"), None);
    }

    #[test]
    fn test_serde_name_matches_field_name() {
        for kind in VitalKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.field_name()));
        }
    }

    #[test]
    fn test_scoring_kinds() {
        assert!(VitalKind::RespiratoryRate.is_scoring());
        assert!(VitalKind::SystolicBp.is_scoring());
        assert!(VitalKind::MentalStatus.is_scoring());
        assert!(!VitalKind::HeartRate.is_scoring());
        assert!(!VitalKind::Temperature.is_scoring());
    }
}
