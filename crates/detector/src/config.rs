//! Detector Configuration
//!
//! Loaded from built-in defaults, an optional `sepsis-detector.toml`, and
//! unprefixed environment variables, in that order of precedence.

use alerting::{AlertConfig, PAGERDUTY_EVENTS_URL};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Optional configuration file name, without extension
pub const CONFIG_FILE: &str = "sepsis-detector";

const MAX_COOLDOWN_MINUTES: u64 = 7 * 24 * 60;
const MAX_WINDOW_HOURS: u64 = 7 * 24;
const MAX_BACKOFF_MS: u64 = 60 * 60 * 1000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime settings for the detector process
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub kafka_bootstrap_servers: String,
    pub kafka_username: Option<String>,
    pub kafka_password: Option<String>,
    pub kafka_group_id: String,
    /// Comma-separated topic list
    pub kafka_topics: String,
    pub kafka_dead_letter_topic: String,
    pub redis_host: String,
    pub redis_port: u16,
    /// PagerDuty integration routing key; paging is disabled without it
    pub pagerduty_api_key: Option<String>,
    pub pagerduty_url: String,
    /// Health-record in-basket webhook; disabled without it
    pub ehr_webhook_url: Option<String>,
    pub alert_cooldown_minutes: u64,
    pub criteria_window_hours: u64,
    pub sink_timeout_ms: u64,
    pub max_delivery_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Upper bound on any single redelivery wait
    pub max_retry_backoff_ms: u64,
    /// Prometheus listener address, e.g. `0.0.0.0:9000`
    pub metrics_addr: Option<String>,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            kafka_bootstrap_servers: "localhost:9092".to_string(),
            kafka_username: None,
            kafka_password: None,
            kafka_group_id: "sepsis-detection-consumer".to_string(),
            kafka_topics: "fhir.observation.vitals,fhir.observation.labs".to_string(),
            kafka_dead_letter_topic: "fhir.observation.deadletter".to_string(),
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            pagerduty_api_key: None,
            pagerduty_url: PAGERDUTY_EVENTS_URL.to_string(),
            ehr_webhook_url: None,
            alert_cooldown_minutes: 60,
            criteria_window_hours: 6,
            sink_timeout_ms: 5000,
            max_delivery_attempts: 5,
            retry_backoff_ms: 500,
            max_retry_backoff_ms: 30_000,
            metrics_addr: None,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl DetectorConfig {
    /// Load from the optional config file and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::assemble(
            Config::builder()
                .add_source(File::with_name(CONFIG_FILE).required(false))
                .add_source(Environment::default().try_parsing(true)),
        )
    }

    /// Load from an inline TOML document and an explicit variable map
    pub fn from_sources(
        toml: Option<&str>,
        vars: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(toml) = toml {
            builder = builder.add_source(File::from_str(toml, FileFormat::Toml));
        }
        let env = Environment::default().try_parsing(true).source(Some(vars));
        Self::assemble(builder.add_source(env))
    }

    fn assemble(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let mut config: Self = builder.build()?.try_deserialize()?;
        config.drop_blank_secrets();
        config.validate()?;
        Ok(config)
    }

    fn drop_blank_secrets(&mut self) {
        for value in [
            &mut self.kafka_username,
            &mut self.kafka_password,
            &mut self.pagerduty_api_key,
            &mut self.ehr_webhook_url,
            &mut self.metrics_addr,
        ] {
            if value.as_deref().map_or(false, |v| v.trim().is_empty()) {
                *value = None;
            }
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("alert_cooldown_minutes", self.alert_cooldown_minutes),
            ("criteria_window_hours", self.criteria_window_hours),
            ("sink_timeout_ms", self.sink_timeout_ms),
            ("max_delivery_attempts", u64::from(self.max_delivery_attempts)),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than zero", name)));
            }
        }
        let bounded = [
            ("alert_cooldown_minutes", self.alert_cooldown_minutes, MAX_COOLDOWN_MINUTES),
            ("criteria_window_hours", self.criteria_window_hours, MAX_WINDOW_HOURS),
            ("retry_backoff_ms", self.retry_backoff_ms, MAX_BACKOFF_MS),
            ("max_retry_backoff_ms", self.max_retry_backoff_ms, MAX_BACKOFF_MS),
        ];
        for (name, value, max) in bounded {
            if value > max {
                return Err(ConfigError::Invalid(format!("{} must be at most {}", name, max)));
            }
        }
        if self.topics().is_empty() {
            return Err(ConfigError::Invalid("kafka_topics is empty".to_string()));
        }
        Ok(())
    }

    /// Subscribed topics
    pub fn topics(&self) -> Vec<String> {
        self.kafka_topics
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// SASL credentials, when both halves are set
    pub fn kafka_credentials(&self) -> Option<(&str, &str)> {
        match (&self.kafka_username, &self.kafka_password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }

    pub fn alert_config(&self) -> AlertConfig {
        AlertConfig {
            cooldown_minutes: self.alert_cooldown_minutes,
        }
    }

    pub fn criteria_window(&self) -> Duration {
        Duration::from_secs(self.criteria_window_hours.saturating_mul(60 * 60))
    }

    pub fn sink_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn max_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.max_retry_backoff_ms)
    }
}
