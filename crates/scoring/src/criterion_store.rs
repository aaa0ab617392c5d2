//! Criterion Store

use state_store::{Clock, KeyedStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use vitals::{is_abnormal, CriteriaSet, CriterionRecord, VitalKind};

use crate::ScoringError;

/// Default validity window for an abnormal finding (6 hours)
pub const DEFAULT_CRITERIA_WINDOW: Duration = Duration::from_secs(6 * 60 * 60);

/// What `record_or_clear` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriterionUpdate {
    /// Abnormal value stored with a fresh validity window
    Recorded,
    /// Normal value, any existing record removed
    Cleared,
    /// Kind does not participate in scoring
    Ignored,
}

/// Per-patient abnormal findings, persisted in the keyed store
pub struct CriterionStore {
    store: Arc<dyn KeyedStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl CriterionStore {
    /// Create a criterion store with the given validity window
    pub fn new(store: Arc<dyn KeyedStore>, clock: Arc<dyn Clock>, window: Duration) -> Self {
        info!("Creating criterion store (window {}s)", window.as_secs());
        Self {
            store,
            clock,
            window,
        }
    }

    /// Store key holding a patient's criteria
    pub fn criteria_key(patient_id: &str) -> String {
        format!("sepsis:criteria:{}", patient_id)
    }

    /// Apply the abnormality rule for `kind` and upsert or delete the record.
    ///
    /// Idempotent under replay: the resulting state depends only on `value`.
    pub async fn record_or_clear(
        &self,
        patient_id: &str,
        kind: VitalKind,
        value: f64,
    ) -> Result<CriterionUpdate, ScoringError> {
        if !kind.is_scoring() {
            debug!("Patient {}: {} = {} (not scored)", patient_id, kind, value);
            return Ok(CriterionUpdate::Ignored);
        }

        let key = Self::criteria_key(patient_id);

        if is_abnormal(kind, value) {
            let record = CriterionRecord {
                value,
                recorded_at: self.clock.now(),
            };
            let encoded = serde_json::to_string(&record)?;
            self.store
                .hash_upsert(&key, kind.field_name(), &encoded, self.window)
                .await?;
            info!("Patient {}: Abnormal {}={}", patient_id, kind, value);
            Ok(CriterionUpdate::Recorded)
        } else {
            self.store.hash_delete(&key, kind.field_name()).await?;
            debug!("Patient {}: {}={} within normal range", patient_id, kind, value);
            Ok(CriterionUpdate::Cleared)
        }
    }

    /// Current live criteria for a patient.
    ///
    /// Expiry is enforced by the store; records are not re-checked here.
    pub async fn get_score(&self, patient_id: &str) -> Result<CriteriaSet, ScoringError> {
        let key = Self::criteria_key(patient_id);
        let fields = self.store.hash_get_all(&key).await?;

        let mut criteria = CriteriaSet::new();
        for (field, raw) in fields {
            let kind = match VitalKind::from_field_name(&field) {
                Some(kind) if kind.is_scoring() => kind,
                _ => {
                    warn!("Patient {}: ignoring unknown criterion field {}", patient_id, field);
                    continue;
                }
            };
            match serde_json::from_str::<CriterionRecord>(&raw) {
                Ok(record) => criteria.insert(kind, record),
                Err(e) => warn!("Patient {}: unreadable {} record: {}", patient_id, field, e),
            }
        }

        debug!("Patient {}: qSOFA score = {}", patient_id, criteria.score());
        Ok(criteria)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use state_store::{ManualClock, MemoryStore};

    fn setup() -> (Arc<ManualClock>, Arc<MemoryStore>, CriterionStore) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let criteria = CriterionStore::new(store.clone(), clock.clone(), DEFAULT_CRITERIA_WINDOW);
        (clock, store, criteria)
    }

    #[tokio::test]
    async fn test_abnormal_recorded_normal_cleared() {
        let (_, _, criteria) = setup();

        let update = criteria
            .record_or_clear("P1", VitalKind::RespiratoryRate, 24.0)
            .await
            .unwrap();
        assert_eq!(update, CriterionUpdate::Recorded);
        assert_eq!(criteria.get_score("P1").await.unwrap().score(), 1);

        let update = criteria
            .record_or_clear("P1", VitalKind::RespiratoryRate, 18.0)
            .await
            .unwrap();
        assert_eq!(update, CriterionUpdate::Cleared);
        assert!(criteria.get_score("P1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_scoring_kind_ignored() {
        let (_, store, criteria) = setup();
        let update = criteria
            .record_or_clear("P1", VitalKind::HeartRate, 140.0)
            .await
            .unwrap();
        assert_eq!(update, CriterionUpdate::Ignored);
        assert_eq!(store.key_count(), 0);
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let (_, _, criteria) = setup();
        criteria
            .record_or_clear("P1", VitalKind::SystolicBp, 90.0)
            .await
            .unwrap();
        let first = criteria.get_score("P1").await.unwrap();

        for _ in 0..3 {
            criteria
                .record_or_clear("P1", VitalKind::SystolicBp, 90.0)
                .await
                .unwrap();
        }
        assert_eq!(criteria.get_score("P1").await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_record_expires_after_window() {
        let (clock, _, criteria) = setup();
        criteria
            .record_or_clear("P1", VitalKind::RespiratoryRate, 25.0)
            .await
            .unwrap();

        clock.advance(chrono::Duration::hours(4));
        criteria
            .record_or_clear("P1", VitalKind::MentalStatus, 13.0)
            .await
            .unwrap();
        assert_eq!(criteria.get_score("P1").await.unwrap().score(), 2);

        // The respiratory finding is now 6 hours old; the GCS one is not
        clock.advance(chrono::Duration::hours(2));
        let live = criteria.get_score("P1").await.unwrap();
        assert_eq!(live.kinds(), vec![VitalKind::MentalStatus]);
    }

    #[tokio::test]
    async fn test_patients_are_isolated() {
        let (_, _, criteria) = setup();
        criteria
            .record_or_clear("P1", VitalKind::RespiratoryRate, 30.0)
            .await
            .unwrap();
        assert_eq!(criteria.get_score("P2").await.unwrap().score(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_record_skipped() {
        let (_, store, criteria) = setup();
        store
            .hash_upsert(
                &CriterionStore::criteria_key("P1"),
                "systolic_bp",
                "not-json",
                DEFAULT_CRITERIA_WINDOW,
            )
            .await
            .unwrap();
        assert_eq!(criteria.get_score("P1").await.unwrap().score(), 0);
    }

    proptest! {
        #[test]
        fn prop_score_matches_latest_abnormal_values(
            events in prop::collection::vec((0usize..3, 0u32..200), 0..40)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let (_, _, criteria) = setup();
                let mut latest: [Option<f64>; 3] = [None; 3];

                for (idx, raw) in &events {
                    let kind = VitalKind::SCORING[*idx];
                    let value = *raw as f64;
                    criteria.record_or_clear("P", kind, value).await.unwrap();
                    latest[*idx] = Some(value);
                }

                let expected = VitalKind::SCORING
                    .iter()
                    .zip(latest.iter())
                    .filter(|(kind, value)| value.map_or(false, |v| is_abnormal(**kind, v)))
                    .count();

                let live = criteria.get_score("P").await.unwrap();
                prop_assert_eq!(live.score(), expected);
                Ok(())
            })?;
        }
    }
}
