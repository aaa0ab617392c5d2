//! Alert Payload and Composer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vitals::CriteriaSet;

/// Kind of clinical alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    SepsisRisk,
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    High,
}

/// Immutable sepsis-risk alert handed to sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub patient_id: String,
    pub timestamp: DateTime<Utc>,
    pub qsofa_score: usize,
    pub criteria_met: CriteriaSet,
    pub triggering_observation: Option<String>,
    pub message: String,
}

/// Build the alert for a patient from the criteria read at evaluation time
pub fn compose(
    patient_id: &str,
    criteria: &CriteriaSet,
    triggering_observation: Option<&str>,
    timestamp: DateTime<Utc>,
) -> Alert {
    let score = criteria.score();
    Alert {
        alert_type: AlertType::SepsisRisk,
        severity: AlertSeverity::High,
        patient_id: patient_id.to_string(),
        timestamp,
        qsofa_score: score,
        criteria_met: criteria.clone(),
        triggering_observation: triggering_observation.map(str::to_string),
        message: format!(
            "Patient {} meets qSOFA sepsis screening criteria ({}/3 positive)",
            patient_id, score
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vitals::{CriterionRecord, VitalKind};

    #[test]
    fn test_compose_alert() {
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap();
        let criteria: CriteriaSet = [
            (VitalKind::RespiratoryRate, CriterionRecord { value: 24.0, recorded_at: at }),
            (VitalKind::SystolicBp, CriterionRecord { value: 90.0, recorded_at: at }),
        ]
        .into_iter()
        .collect();

        let alert = compose("P1", &criteria, Some("obs-42"), at);

        assert_eq!(alert.qsofa_score, 2);
        assert_eq!(alert.triggering_observation.as_deref(), Some("obs-42"));
        assert_eq!(
            alert.message,
            "Patient P1 meets qSOFA sepsis screening criteria (2/3 positive)"
        );

        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["alert_type"], "SEPSIS_RISK");
        assert_eq!(json["severity"], "HIGH");
        assert_eq!(json["criteria_met"]["systolic_bp"]["value"], 90.0);
    }
}
