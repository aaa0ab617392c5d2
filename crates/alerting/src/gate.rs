//! Alert Dedup Gate

use serde::{Deserialize, Serialize};
use state_store::KeyedStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::AlertError;

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Suppression window after an alert (minutes, default: 60)
    pub cooldown_minutes: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_minutes: 60,
        }
    }
}

impl AlertConfig {
    /// Cooldown as a duration
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_minutes.saturating_mul(60))
    }
}

/// Per-patient cooldown held in the shared keyed store.
///
/// The cooldown entry is only ever created and left to expire; it never
/// resets when the score drops and rises again inside the window.
pub struct AlertGate {
    store: Arc<dyn KeyedStore>,
    config: AlertConfig,
}

impl AlertGate {
    /// Create a new gate
    pub fn new(store: Arc<dyn KeyedStore>, config: AlertConfig) -> Self {
        info!("Creating alert gate with config: {:?}", config);
        Self { store, config }
    }

    /// Store key of a patient's cooldown marker
    pub fn cooldown_key(patient_id: &str) -> String {
        format!("sepsis:alert:{}", patient_id)
    }

    /// Atomically claim the alert slot for a patient.
    ///
    /// Returns `false` when a cooldown is already active, otherwise starts
    /// one and returns `true`.
    pub async fn try_trigger(&self, patient_id: &str) -> Result<bool, AlertError> {
        let key = Self::cooldown_key(patient_id);
        let claimed = self
            .store
            .set_if_absent(&key, "1", self.config.cooldown())
            .await?;

        if claimed {
            debug!(
                "Patient {}: cooldown started ({} min)",
                patient_id, self.config.cooldown_minutes
            );
        } else {
            debug!("Patient {}: Alert already sent (cooldown active)", patient_id);
        }
        Ok(claimed)
    }

    /// Whether a cooldown is active for a patient
    pub async fn in_cooldown(&self, patient_id: &str) -> Result<bool, AlertError> {
        Ok(self.store.exists(&Self::cooldown_key(patient_id)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use state_store::{ManualClock, MemoryStore};

    fn gate() -> (Arc<ManualClock>, AlertGate) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        (clock, AlertGate::new(store, AlertConfig::default()))
    }

    #[tokio::test]
    async fn test_deduplication() {
        let (_, gate) = gate();

        assert!(gate.try_trigger("P1").await.unwrap());
        assert!(!gate.try_trigger("P1").await.unwrap());
        assert!(gate.in_cooldown("P1").await.unwrap());

        // Other patients are unaffected
        assert!(gate.try_trigger("P2").await.unwrap());
    }

    #[tokio::test]
    async fn test_cooldown_expires() {
        let (clock, gate) = gate();
        assert!(gate.try_trigger("P1").await.unwrap());

        clock.advance(chrono::Duration::minutes(59));
        assert!(!gate.try_trigger("P1").await.unwrap());

        clock.advance(chrono::Duration::minutes(1));
        assert!(!gate.in_cooldown("P1").await.unwrap());
        assert!(gate.try_trigger("P1").await.unwrap());
    }

    #[tokio::test]
    async fn test_suppressed_attempt_does_not_extend_cooldown() {
        let (clock, gate) = gate();
        assert!(gate.try_trigger("P1").await.unwrap());

        clock.advance(chrono::Duration::minutes(30));
        assert!(!gate.try_trigger("P1").await.unwrap());

        clock.advance(chrono::Duration::minutes(30));
        assert!(gate.try_trigger("P1").await.unwrap());
    }

    #[test]
    fn test_cooldown_duration() {
        let config = AlertConfig { cooldown_minutes: 5 };
        assert_eq!(config.cooldown(), Duration::from_secs(300));

        let absurd = AlertConfig {
            cooldown_minutes: u64::MAX,
        };
        assert_eq!(absurd.cooldown(), Duration::from_secs(u64::MAX));
    }
}
