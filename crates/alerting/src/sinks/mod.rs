//! Alert Sinks
//!
//! Delivery is best-effort: every sink is called independently under a
//! per-call timeout, and a failure is logged and counted without affecting
//! the other sinks or the caller.

mod audit;
mod pager;
mod record_system;
mod recording;

pub use audit::AuditSink;
pub use pager::{PagerSink, PAGERDUTY_EVENTS_URL};
pub use record_system::RecordSystemSink;
pub use recording::RecordingSink;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{Alert, AlertError};

/// A delivery capability for composed alerts
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Short identifier used in logs and metrics
    fn name(&self) -> &str;

    /// Deliver one alert
    async fn send(&self, alert: &Alert) -> Result<(), AlertError>;
}

/// Per-sink outcome of a dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl DispatchReport {
    /// Whether every configured sink accepted the alert
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ordered collection of sinks sharing one call timeout
pub struct SinkSet {
    sinks: Vec<Arc<dyn AlertSink>>,
    timeout: Duration,
}

impl SinkSet {
    /// Create an empty set
    pub fn new(timeout: Duration) -> Self {
        Self {
            sinks: Vec::new(),
            timeout,
        }
    }

    /// Add a sink
    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.push(sink);
        self
    }

    /// Add a sink in place
    pub fn push(&mut self, sink: Arc<dyn AlertSink>) {
        info!("Registering alert sink: {}", sink.name());
        self.sinks.push(sink);
    }

    /// Number of registered sinks
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sinks are registered
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Hand the alert to every sink. Never fails.
    pub async fn dispatch(&self, alert: &Alert) -> DispatchReport {
        let mut report = DispatchReport::default();

        if self.sinks.is_empty() {
            debug!("No alert sinks configured for patient {}", alert.patient_id);
            return report;
        }

        for sink in &self.sinks {
            let name = sink.name().to_string();
            let outcome = match tokio::time::timeout(self.timeout, sink.send(alert)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("timed out after {}ms", self.timeout.as_millis())),
            };

            match outcome {
                Ok(()) => {
                    debug!("Alert for patient {} delivered via {}", alert.patient_id, name);
                    report.delivered.push(name);
                }
                Err(reason) => {
                    warn!(
                        "Alert sink {} failed for patient {}: {}",
                        name, alert.patient_id, reason
                    );
                    metrics::counter!("sepsis_sink_failures_total", "sink" => name.clone())
                        .increment(1);
                    report.failed.push((name, reason));
                }
            }
        }

        report
    }
}
