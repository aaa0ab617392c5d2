//! Sepsis Detector
//!
//! qSOFA screening over an at-least-once observation feed:
//! - Per-event pipeline with explicit commit/redeliver outcomes
//! - Sequential poll loop with redelivery backoff and dead letters
//! - Configuration, logging and metrics setup for the binary

pub mod config;
pub mod pipeline;
pub mod telemetry;
pub mod worker;

pub use self::config::{ConfigError, DetectorConfig};
pub use pipeline::{Detector, DetectorError, EventOutcome, Verdict};
pub use telemetry::{init_logging, install_metrics, TelemetryError};
pub use worker::{RetryPolicy, Worker, WorkerStats};

use alerting::{AlertError, AuditSink, PagerSink, RecordSystemSink, SinkSet};
use state_store::Clock;
use std::sync::Arc;
use tracing::warn;

/// Build the configured alert sinks. The audit trail is always present.
pub fn build_sinks(config: &DetectorConfig, clock: Arc<dyn Clock>) -> Result<SinkSet, AlertError> {
    let timeout = config.sink_timeout();
    let mut sinks = SinkSet::new(timeout);

    match &config.pagerduty_api_key {
        Some(key) => sinks.push(Arc::new(PagerSink::new(
            key.as_str(),
            config.pagerduty_url.as_str(),
            timeout,
        )?)),
        None => warn!("PagerDuty API key not set, paging disabled"),
    }

    if let Some(url) = &config.ehr_webhook_url {
        sinks.push(Arc::new(RecordSystemSink::new(url.as_str(), timeout)?));
    }

    sinks.push(Arc::new(AuditSink::new(clock)));
    Ok(sinks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use state_store::SystemClock;
    use std::collections::HashMap;

    #[test]
    fn test_audit_only_by_default() {
        let config = DetectorConfig::from_sources(None, HashMap::new()).unwrap();
        let sinks = build_sinks(&config, Arc::new(SystemClock)).unwrap();
        assert_eq!(sinks.len(), 1);
    }

    #[test]
    fn test_all_sinks_configured() {
        let vars = [
            ("PAGERDUTY_API_KEY", "routing"),
            ("EHR_WEBHOOK_URL", "http://ehr.local/inbasket"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let config = DetectorConfig::from_sources(None, vars).unwrap();
        let sinks = build_sinks(&config, Arc::new(SystemClock)).unwrap();
        assert_eq!(sinks.len(), 3);
    }
}
