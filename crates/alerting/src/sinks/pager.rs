//! PagerDuty Paging Sink

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::info;

use crate::{Alert, AlertError, AlertSink};

/// PagerDuty Events API v2 endpoint
pub const PAGERDUTY_EVENTS_URL: &str = "https://events.pagerduty.com/v2/enqueue";

/// Pages the rapid response team through PagerDuty
pub struct PagerSink {
    client: reqwest::Client,
    routing_key: String,
    url: String,
}

impl PagerSink {
    /// Create a pager sink for an integration routing key
    pub fn new(
        routing_key: impl Into<String>,
        url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            routing_key: routing_key.into(),
            url: url.into(),
        })
    }

    /// Events API v2 trigger body for an alert
    pub fn event_body(&self, alert: &Alert) -> serde_json::Value {
        json!({
            "routing_key": self.routing_key,
            "event_action": "trigger",
            "dedup_key": format!("sepsis-{}", alert.patient_id),
            "payload": {
                "summary": alert.message,
                "severity": "critical",
                "source": "FHIR-Sepsis-Detection",
                "custom_details": alert,
            }
        })
    }
}

#[async_trait]
impl AlertSink for PagerSink {
    fn name(&self) -> &str {
        "pagerduty"
    }

    async fn send(&self, alert: &Alert) -> Result<(), AlertError> {
        let response = self
            .client
            .post(&self.url)
            .json(&self.event_body(alert))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AlertError::Delivery(format!("PagerDuty {}: {}", status, body)));
        }

        info!("PagerDuty alert sent for patient {}", alert.patient_id);
        Ok(())
    }
}
