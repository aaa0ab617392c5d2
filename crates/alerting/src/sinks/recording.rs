//! In-Memory Recording Sink

use async_trait::async_trait;
use std::sync::Mutex;

use crate::{Alert, AlertError, AlertSink};

/// Keeps every alert it receives; optionally rejects them all
pub struct RecordingSink {
    name: String,
    alerts: Mutex<Vec<Alert>>,
    fail: bool,
}

impl RecordingSink {
    /// A sink that accepts and records alerts
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alerts: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// A sink that records alerts and then reports failure
    pub fn failing(name: impl Into<String>) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    /// Alerts received so far
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, alert: &Alert) -> Result<(), AlertError> {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert.clone());
        }
        if self.fail {
            return Err(AlertError::Delivery(format!("{} rejected alert", self.name)));
        }
        Ok(())
    }
}
