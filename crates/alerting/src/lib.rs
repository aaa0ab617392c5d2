//! Alerting System
//!
//! Provides sepsis alert composition, per-patient cooldown deduplication,
//! and best-effort fan-out to delivery sinks.

mod alert;
mod gate;
mod sinks;

pub use alert::{compose, Alert, AlertType, AlertSeverity};
pub use gate::{AlertConfig, AlertGate};
pub use sinks::{
    AlertSink, AuditSink, DispatchReport, PagerSink, RecordSystemSink, RecordingSink, SinkSet,
    PAGERDUTY_EVENTS_URL,
};

use state_store::StoreError;
use thiserror::Error;

/// Alerting errors
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Cooldown store error: {0}")]
    Store(#[from] StoreError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Delivery rejected: {0}")]
    Delivery(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
