//! qSOFA Abnormality Rules

use crate::VitalKind;

/// Number of positive criteria that triggers a sepsis alert
pub const QSOFA_ALERT_THRESHOLD: usize = 2;

/// Respiratory rate at or above this is abnormal (breaths/min)
const RESPIRATORY_RATE_MIN_ABNORMAL: f64 = 22.0;
/// Systolic BP at or below this is abnormal (mmHg)
const SYSTOLIC_BP_MAX_ABNORMAL: f64 = 100.0;
/// GCS strictly below this is abnormal
const GCS_NORMAL: f64 = 15.0;

/// Apply the fixed qSOFA threshold for `kind`.
///
/// Non-scoring kinds are never abnormal.
pub fn is_abnormal(kind: VitalKind, value: f64) -> bool {
    match kind {
        VitalKind::RespiratoryRate => value >= RESPIRATORY_RATE_MIN_ABNORMAL,
        VitalKind::SystolicBp => value <= SYSTOLIC_BP_MAX_ABNORMAL,
        VitalKind::MentalStatus => value < GCS_NORMAL,
        VitalKind::HeartRate | VitalKind::Temperature => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_respiratory_rate_boundary() {
        assert!(is_abnormal(VitalKind::RespiratoryRate, 22.0));
        assert!(!is_abnormal(VitalKind::RespiratoryRate, 21.0));
        assert!(is_abnormal(VitalKind::RespiratoryRate, 30.0));
    }

    #[test]
    fn test_systolic_bp_boundary() {
        assert!(is_abnormal(VitalKind::SystolicBp, 100.0));
        assert!(!is_abnormal(VitalKind::SystolicBp, 101.0));
        assert!(is_abnormal(VitalKind::SystolicBp, 85.0));
    }

    #[test]
    fn test_mental_status_boundary() {
        assert!(!is_abnormal(VitalKind::MentalStatus, 15.0));
        assert!(is_abnormal(VitalKind::MentalStatus, 14.0));
    }

    #[test]
    fn test_non_scoring_never_abnormal() {
        assert!(!is_abnormal(VitalKind::HeartRate, 180.0));
        assert!(!is_abnormal(VitalKind::Temperature, 41.0));
    }
}
