//! Audit Trail Sink

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use state_store::{Clock, SystemClock};
use tracing::info;

use crate::{Alert, AlertError, AlertSink};

/// One clinical-alert audit record
#[derive(Debug, Serialize)]
pub struct AuditEntry<'a> {
    pub event_type: &'static str,
    pub alert: &'a Alert,
    pub timestamp: DateTime<Utc>,
    pub system: &'static str,
}

/// Writes audit entries on the `audit` tracing target
pub struct AuditSink {
    clock: Arc<dyn Clock>,
}

impl AuditSink {
    /// Create an audit sink stamping entries with `clock`
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Build the audit entry for an alert
    pub fn entry<'a>(&self, alert: &'a Alert) -> AuditEntry<'a> {
        AuditEntry {
            event_type: "CLINICAL_ALERT",
            alert,
            timestamp: self.clock.now(),
            system: "sepsis-detection",
        }
    }
}

impl Default for AuditSink {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl AlertSink for AuditSink {
    fn name(&self) -> &str {
        "audit"
    }

    async fn send(&self, alert: &Alert) -> Result<(), AlertError> {
        let entry = serde_json::to_string(&self.entry(alert))?;
        info!(target: "audit", patient_id = %alert.patient_id, "AUDIT: {}", entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose;
    use chrono::TimeZone;
    use state_store::ManualClock;
    use vitals::CriteriaSet;

    #[tokio::test]
    async fn test_audit_entry() {
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 11, 0, 0).unwrap();
        let sink = AuditSink::new(Arc::new(ManualClock::new(at)));
        let alert = compose("P1", &CriteriaSet::new(), None, at);

        let entry = serde_json::to_value(sink.entry(&alert)).unwrap();
        assert_eq!(entry["event_type"], "CLINICAL_ALERT");
        assert_eq!(entry["system"], "sepsis-detection");
        assert_eq!(entry["alert"]["patient_id"], "P1");

        assert!(sink.send(&alert).await.is_ok());
    }
}
