//! Health-Record In-Basket Sink

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use crate::{Alert, AlertError, AlertSink};

/// Posts alerts to the health-record system's in-basket webhook
pub struct RecordSystemSink {
    client: reqwest::Client,
    endpoint: String,
}

impl RecordSystemSink {
    /// Create a sink posting to `endpoint`
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl AlertSink for RecordSystemSink {
    fn name(&self) -> &str {
        "record-system"
    }

    async fn send(&self, alert: &Alert) -> Result<(), AlertError> {
        let response = self.client.post(&self.endpoint).json(alert).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AlertError::Delivery(format!("record system returned {}", status)));
        }

        info!("Record-system alert sent for patient {}", alert.patient_id);
        Ok(())
    }
}
