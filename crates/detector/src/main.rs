//! Sepsis Detector - Main Entry Point

use anyhow::Context;
use detector::{
    build_sinks, init_logging, install_metrics, Detector, DetectorConfig, RetryPolicy, Worker,
};
use feed::FeedSource;
use state_store::{Clock, KeyedStore, SystemClock};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DetectorConfig::load().context("loading configuration")?;
    init_logging(&config.log_level, config.log_json)?;

    info!("=== Sepsis Detector v{} ===", env!("CARGO_PKG_VERSION"));

    if let Some(addr) = &config.metrics_addr {
        install_metrics(addr)?;
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(&config, clock.clone()).await?;
    let sinks = build_sinks(&config, clock.clone())?;
    let detector = Arc::new(Detector::from_config(&config, store, clock, sinks));
    let feed = open_feed(&config)?;

    let worker = Worker::new(detector, feed, RetryPolicy::from(&config));
    let stats = worker.run(shutdown_signal()).await?;

    info!(
        "Consumer closed: {} processed, {} committed, {} outage retries, {} dead-lettered",
        stats.processed, stats.committed, stats.outage_retries, stats.dead_lettered
    );
    Ok(())
}

#[cfg(feature = "redis")]
async fn open_store(
    config: &DetectorConfig,
    _clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<dyn KeyedStore>> {
    let store = state_store::RedisStore::connect(&config.redis_host, config.redis_port)
        .await
        .context("connecting to Redis")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn open_store(
    _config: &DetectorConfig,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<dyn KeyedStore>> {
    tracing::warn!("Built without the redis feature, patient state is in-process only");
    Ok(Arc::new(state_store::MemoryStore::with_clock(clock)))
}

#[cfg(feature = "kafka")]
fn open_feed(config: &DetectorConfig) -> anyhow::Result<Box<dyn FeedSource>> {
    let mut builder = feed::KafkaFeed::builder()
        .brokers(config.kafka_bootstrap_servers.as_str())
        .group_id(config.kafka_group_id.as_str())
        .topics(config.topics())
        .dead_letter_topic(config.kafka_dead_letter_topic.as_str());
    if let Some((username, password)) = config.kafka_credentials() {
        builder = builder.credentials(username, password);
    }
    Ok(Box::new(builder.build().context("creating Kafka consumer")?))
}

#[cfg(not(feature = "kafka"))]
fn open_feed(_config: &DetectorConfig) -> anyhow::Result<Box<dyn FeedSource>> {
    info!("Built without the kafka feature, reading envelopes from stdin");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    Ok(Box::new(feed::LinesFeed::new("stdin", stdin)))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutting down consumer...");
}
