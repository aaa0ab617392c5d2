//! Feed Poll Loop
//!
//! One worker consumes one feed strictly sequentially. Failed events are
//! redelivered with a capped linear backoff. Events that keep failing on
//! their own content are dead-lettered once they exhaust their attempts;
//! events that failed because the store was unavailable are retried until it
//! comes back.

use feed::{FeedError, FeedMessage, FeedSource};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::DetectorConfig;
use crate::pipeline::{Detector, EventOutcome};

/// Redelivery limits for failing events
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_delivery_attempts: u32,
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Wait before the `attempt`-th redelivery
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_delivery_attempts: 5,
            backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl From<&DetectorConfig> for RetryPolicy {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            max_delivery_attempts: config.max_delivery_attempts,
            backoff: config.retry_backoff(),
            max_backoff: config.max_retry_backoff(),
        }
    }
}

/// Counters for one worker run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub committed: u64,
    pub redelivered: u64,
    /// Redeliveries caused by store outages
    pub outage_retries: u64,
    pub dead_lettered: u64,
}

/// Sequential consumer driving the detector
pub struct Worker {
    detector: Arc<Detector>,
    feed: Box<dyn FeedSource>,
    policy: RetryPolicy,
    attempts: HashMap<(String, i32, i64), u32>,
    outage_streak: u32,
    stats: WorkerStats,
}

impl Worker {
    /// Create a worker over a feed
    pub fn new(detector: Arc<Detector>, feed: Box<dyn FeedSource>, policy: RetryPolicy) -> Self {
        info!("Creating worker with retry policy: {:?}", policy);
        Self {
            detector,
            feed,
            policy,
            attempts: HashMap::new(),
            outage_streak: 0,
            stats: WorkerStats::default(),
        }
    }

    /// Poll until `shutdown` resolves, the feed is exhausted, or a fatal feed
    /// error occurs. An event already received is always finished first.
    pub async fn run<S>(mut self, shutdown: S) -> Result<WorkerStats, FeedError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Worker started");

        loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping poll loop");
                    break;
                }
                next = self.feed.next() => next,
            };

            let result = match next {
                Ok(Some(msg)) => self.process(msg).await,
                Ok(None) => Ok(()),
                Err(FeedError::Closed) => {
                    info!("Feed exhausted");
                    break;
                }
                Err(e) => Err(e),
            };

            if let Err(e) = result {
                error!("Fatal feed error: {}", e);
                if let Err(close_err) = self.feed.close().await {
                    warn!("Failed to close feed: {}", close_err);
                }
                return Err(e);
            }
        }

        self.feed.close().await?;
        info!("Worker stopped: {:?}", self.stats);
        Ok(self.stats)
    }

    async fn process(&mut self, msg: FeedMessage) -> Result<(), FeedError> {
        self.stats.processed += 1;

        match self.detector.handle(&msg).await {
            EventOutcome::Committed => {
                self.outage_streak = 0;
                self.attempts.remove(&msg.position());
                self.commit(&msg).await;
                Ok(())
            }
            EventOutcome::Redeliver {
                reason,
                transient: true,
            } => self.retry_after_outage(&msg, &reason).await,
            EventOutcome::Redeliver {
                reason,
                transient: false,
            } => self.retry_or_dead_letter(&msg, &reason).await,
        }
    }

    async fn retry_after_outage(
        &mut self,
        msg: &FeedMessage,
        reason: &str,
    ) -> Result<(), FeedError> {
        self.outage_streak = self.outage_streak.saturating_add(1);
        warn!(
            "Store unavailable while processing {} (retry {}), redelivering: {}",
            msg, self.outage_streak, reason
        );
        self.stats.outage_retries += 1;
        self.redeliver(msg, self.policy.delay(self.outage_streak)).await
    }

    async fn retry_or_dead_letter(
        &mut self,
        msg: &FeedMessage,
        reason: &str,
    ) -> Result<(), FeedError> {
        let attempt = {
            let count = self.attempts.entry(msg.position()).or_insert(0);
            *count += 1;
            *count
        };

        if attempt >= self.policy.max_delivery_attempts {
            error!(
                "Event {} failed {} times, dead-lettering: {}",
                msg, attempt, reason
            );
            match self.feed.dead_letter(msg, reason).await {
                Ok(()) => {
                    self.attempts.remove(&msg.position());
                    self.stats.dead_lettered += 1;
                    metrics::counter!("sepsis_dead_letters_total").increment(1);
                    self.commit(msg).await;
                    return Ok(());
                }
                Err(e) => error!("Dead-letter publish for {} failed: {}", msg, e),
            }
        } else {
            warn!(
                "Event {} failed (attempt {}/{}), redelivering: {}",
                msg, attempt, self.policy.max_delivery_attempts, reason
            );
        }

        self.redeliver(msg, self.policy.delay(attempt)).await
    }

    async fn redeliver(&mut self, msg: &FeedMessage, delay: Duration) -> Result<(), FeedError> {
        tokio::time::sleep(delay).await;
        self.feed.redeliver(msg).await?;
        self.stats.redelivered += 1;
        metrics::counter!("sepsis_redeliveries_total").increment(1);
        Ok(())
    }

    async fn commit(&mut self, msg: &FeedMessage) {
        match self.feed.commit(msg).await {
            Ok(()) => self.stats.committed += 1,
            Err(e) => error!("Commit of {} failed: {}", msg, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::SinkSet;
    use feed::MemoryFeed;
    use state_store::{KeyedStore, MemoryStore, SystemClock};
    use std::collections::HashMap as Map;

    fn detector() -> Arc<Detector> {
        let store: Arc<dyn KeyedStore> = Arc::new(MemoryStore::new());
        let config = DetectorConfig::from_sources(None, Map::new()).unwrap();
        Arc::new(Detector::from_config(
            &config,
            store,
            Arc::new(SystemClock),
            SinkSet::new(Duration::from_secs(1)),
        ))
    }

    #[tokio::test]
    async fn test_skipped_events_are_committed() {
        let feed = MemoryFeed::new("vitals");
        feed.push("garbage");
        feed.push("{}");

        let worker = Worker::new(detector(), Box::new(feed.clone()), RetryPolicy::default());
        let stats = worker.run(std::future::pending()).await.unwrap();

        assert_eq!(stats.committed, 2);
        assert_eq!(feed.committed().len(), 2);
        assert!(feed.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poison_event_dead_lettered() {
        let feed = MemoryFeed::new("vitals");
        feed.push(r#"{"PatientId":"P1","ResourceJson":"{broken"}"#);

        let policy = RetryPolicy {
            max_delivery_attempts: 3,
            backoff: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        let worker = Worker::new(detector(), Box::new(feed.clone()), policy);
        let stats = worker.run(std::future::pending()).await.unwrap();

        assert_eq!(stats.processed, 3);
        assert_eq!(stats.redelivered, 2);
        assert_eq!(stats.dead_lettered, 1);
        assert_eq!(feed.dead_letters().len(), 1);
        assert_eq!(feed.committed().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_before_polling() {
        let feed = MemoryFeed::new("vitals");
        feed.push("garbage");

        let worker = Worker::new(detector(), Box::new(feed.clone()), RetryPolicy::default());
        let stats = worker.run(async {}).await.unwrap();

        assert_eq!(stats.processed, 0);
        assert_eq!(feed.pending(), 1);
        assert!(feed.is_closed());
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(4), Duration::from_secs(2));
        assert_eq!(policy.delay(1000), Duration::from_secs(30));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(30));
    }
}
