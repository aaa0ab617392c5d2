//! Logging and Metrics Setup

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::{AddrParseError, SocketAddr};
use thiserror::Error;
use tracing::info;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Telemetry setup errors
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to set tracing subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
    #[error("Invalid metrics address: {0}")]
    Address(#[from] AddrParseError),
    #[error("Failed to start metrics exporter: {0}")]
    Exporter(#[from] BuildError),
}

/// Initialize logging with a `RUST_LOG`-style filter
pub fn init_logging(level: &str, json: bool) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Serve Prometheus metrics on `addr`
pub fn install_metrics(addr: &str) -> Result<(), TelemetryError> {
    let addr: SocketAddr = addr.parse()?;
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    info!("Prometheus metrics listening on {}", addr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_metrics_address() {
        assert!(matches!(
            install_metrics("not-an-address"),
            Err(TelemetryError::Address(_))
        ));
    }
}
