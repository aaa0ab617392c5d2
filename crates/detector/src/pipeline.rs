//! Per-Event Detection Pipeline
//!
//! normalize -> record/clear criterion -> re-read score -> compose ->
//! cooldown gate -> sink dispatch. Every step except dispatch may fail, and a
//! failure leaves the event uncommitted.

use alerting::{compose, Alert, AlertError, AlertGate, DispatchReport, SinkSet};
use feed::FeedMessage;
use fhir_normalizer::{normalize, NormalizeError, Normalized, SkipReason};
use scoring::{CriterionStore, ScoreEvaluator, ScoringError};
use state_store::{Clock, KeyedStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::DetectorConfig;

/// Processing errors; the event is redelivered
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Normalization failed: {0}")]
    Normalize(#[from] NormalizeError),
    #[error("Scoring failed: {0}")]
    Scoring(#[from] ScoringError),
    #[error("Alert gate failed: {0}")]
    Alert(#[from] AlertError),
}

impl DetectorError {
    /// Whether the failure is an infrastructure outage rather than a property
    /// of the event. Such events are retried without counting toward the
    /// dead-letter limit.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DetectorError::Scoring(ScoringError::Store(StoreError::Unavailable(_)))
                | DetectorError::Alert(AlertError::Store(StoreError::Unavailable(_)))
        )
    }
}

/// What the pipeline concluded for one event
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Malformed or irrelevant event
    Skipped(SkipReason),
    /// Fewer criteria than the alert threshold
    BelowThreshold { score: usize },
    /// Threshold met but the patient is in cooldown
    Suppressed { score: usize },
    /// Alert composed and handed to the sinks
    Alerted { alert: Alert, report: DispatchReport },
}

impl Verdict {
    /// Metric label for the outcome
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Skipped(_) => "skipped",
            Verdict::BelowThreshold { .. } => "below_threshold",
            Verdict::Suppressed { .. } => "suppressed",
            Verdict::Alerted { .. } => "alerted",
        }
    }
}

/// Feed acknowledgement decision for one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Committed,
    /// Processing failed; `transient` marks store outages
    Redeliver { reason: String, transient: bool },
}

/// Stateless per-event orchestrator; all patient state lives in the store
pub struct Detector {
    criteria: CriterionStore,
    evaluator: ScoreEvaluator,
    gate: AlertGate,
    sinks: SinkSet,
    clock: Arc<dyn Clock>,
}

impl Detector {
    /// Assemble a detector from its parts
    pub fn new(
        criteria: CriterionStore,
        evaluator: ScoreEvaluator,
        gate: AlertGate,
        sinks: SinkSet,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            criteria,
            evaluator,
            gate,
            sinks,
            clock,
        }
    }

    /// Build a detector over one shared store
    pub fn from_config(
        config: &DetectorConfig,
        store: Arc<dyn KeyedStore>,
        clock: Arc<dyn Clock>,
        sinks: SinkSet,
    ) -> Self {
        info!(
            "Creating detector: cooldown {}m, criteria window {}h, {} sinks",
            config.alert_cooldown_minutes,
            config.criteria_window_hours,
            sinks.len()
        );
        Self::new(
            CriterionStore::new(store.clone(), clock.clone(), config.criteria_window()),
            ScoreEvaluator::default(),
            AlertGate::new(store, config.alert_config()),
            sinks,
            clock,
        )
    }

    /// Run the pipeline for one raw payload
    pub async fn evaluate(&self, payload: &[u8]) -> Result<Verdict, DetectorError> {
        let observation = match normalize(payload)? {
            Normalized::Observation(observation) => observation,
            Normalized::Skip(reason) => {
                debug!("Skipping event: {}", reason);
                return Ok(Verdict::Skipped(reason));
            }
        };
        let patient_id = observation.patient_id.as_str();

        self.criteria
            .record_or_clear(patient_id, observation.kind, observation.value)
            .await?;

        let assessment = self.evaluator.assess(self.criteria.get_score(patient_id).await?);

        if !assessment.meets_threshold {
            return Ok(Verdict::BelowThreshold {
                score: assessment.score,
            });
        }

        let alert = compose(
            patient_id,
            &assessment.criteria,
            observation.observation_id.as_deref(),
            self.clock.now(),
        );

        if !self.gate.try_trigger(patient_id).await? {
            metrics::counter!("sepsis_alerts_suppressed_total").increment(1);
            return Ok(Verdict::Suppressed {
                score: assessment.score,
            });
        }

        let report = self.sinks.dispatch(&alert).await;
        metrics::counter!("sepsis_alerts_total").increment(1);
        warn!(
            "SEPSIS ALERT: Patient {} - qSOFA {}/3 ({} of {} sinks delivered)",
            patient_id,
            alert.qsofa_score,
            report.delivered.len(),
            self.sinks.len()
        );

        Ok(Verdict::Alerted { alert, report })
    }

    /// Process one feed message and decide whether it may be committed
    pub async fn handle(&self, msg: &FeedMessage) -> EventOutcome {
        match self.evaluate(&msg.payload).await {
            Ok(verdict) => {
                metrics::counter!("sepsis_events_total", "outcome" => verdict.label()).increment(1);
                EventOutcome::Committed
            }
            Err(e) => {
                let transient = e.is_transient();
                error!(
                    topic = %msg.topic,
                    partition = msg.partition,
                    offset = msg.offset,
                    transient,
                    "Error processing message: {}",
                    e
                );
                let outcome = if transient { "unavailable" } else { "error" };
                metrics::counter!("sepsis_events_total", "outcome" => outcome).increment(1);
                EventOutcome::Redeliver {
                    reason: e.to_string(),
                    transient,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::RecordingSink;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use fhir_normalizer::Envelope;
    use serde_json::json;
    use state_store::{ManualClock, MemoryStore};
    use std::collections::HashMap;
    use std::time::Duration;

    struct Harness {
        detector: Detector,
        clock: Arc<ManualClock>,
        sink: Arc<RecordingSink>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap(),
        ));
        let store: Arc<dyn KeyedStore> = Arc::new(MemoryStore::with_clock(clock.clone()));
        let sink = Arc::new(RecordingSink::new("recording"));
        let sinks = SinkSet::new(Duration::from_secs(5)).with_sink(sink.clone());
        let config = DetectorConfig::from_sources(None, HashMap::new()).unwrap();
        let detector = Detector::from_config(&config, store, clock.clone(), sinks);
        Harness {
            detector,
            clock,
            sink,
        }
    }

    fn event(patient: &str, code: &str, value: f64) -> Vec<u8> {
        let resource = json!({
            "resourceType": "Observation",
            "id": format!("obs-{}", code),
            "code": { "coding": [{ "system": "http://loinc.org", "code": code }] },
            "valueQuantity": { "value": value }
        });
        serde_json::to_vec(&Envelope::new(patient, &resource)).unwrap()
    }

    #[tokio::test]
    async fn test_single_criterion_below_threshold() {
        let h = harness();
        let verdict = h.detector.evaluate(&event("P1", "9279-1", 24.0)).await.unwrap();
        assert_eq!(verdict, Verdict::BelowThreshold { score: 1 });
        assert!(h.sink.alerts().is_empty());
    }

    #[tokio::test]
    async fn test_second_criterion_alerts() {
        let h = harness();
        h.detector.evaluate(&event("P1", "9279-1", 24.0)).await.unwrap();
        h.clock.advance(ChronoDuration::minutes(10));

        let verdict = h.detector.evaluate(&event("P1", "85354-9", 90.0)).await.unwrap();

        match verdict {
            Verdict::Alerted { alert, report } => {
                assert_eq!(alert.qsofa_score, 2);
                assert_eq!(alert.triggering_observation.as_deref(), Some("obs-85354-9"));
                assert!(report.all_delivered());
            }
            other => panic!("expected alert, got {:?}", other),
        }
        assert_eq!(h.sink.alerts().len(), 1);
    }

    #[tokio::test]
    async fn test_non_scoring_vital_still_evaluates() {
        let h = harness();
        h.detector.evaluate(&event("P1", "9279-1", 24.0)).await.unwrap();

        let verdict = h.detector.evaluate(&event("P1", "8867-4", 130.0)).await.unwrap();
        assert_eq!(verdict, Verdict::BelowThreshold { score: 1 });
    }

    #[tokio::test]
    async fn test_irrelevant_event_is_skipped() {
        let h = harness();
        let verdict = h.detector.evaluate(b"not json").await.unwrap();
        assert_eq!(verdict.label(), "skipped");
    }

    #[tokio::test]
    async fn test_unparseable_resource_redelivers() {
        let h = harness();
        let payload = serde_json::to_vec(&json!({
            "PatientId": "P1",
            "ResourceJson": "{not json"
        }))
        .unwrap();
        let msg = FeedMessage {
            topic: "fhir.observation.vitals".to_string(),
            partition: 0,
            offset: 7,
            payload,
        };

        assert!(matches!(
            h.detector.handle(&msg).await,
            EventOutcome::Redeliver {
                transient: false,
                ..
            }
        ));
    }

    #[test]
    fn test_store_outage_is_transient() {
        let unavailable = || StoreError::Unavailable("connection refused".to_string());

        assert!(DetectorError::Scoring(ScoringError::Store(unavailable())).is_transient());
        assert!(DetectorError::Alert(AlertError::Store(unavailable())).is_transient());

        let wrong_type = StoreError::Command("WRONGTYPE".to_string());
        assert!(!DetectorError::Scoring(ScoringError::Store(wrong_type)).is_transient());
        assert!(!DetectorError::Alert(AlertError::Delivery("rejected".to_string())).is_transient());
    }
}
