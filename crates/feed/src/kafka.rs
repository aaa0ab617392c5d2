//! Kafka consumer-group feed with manual offset commits.
//!
//! Offsets are committed synchronously after an event has been fully
//! processed. Redelivery seeks the partition back to the event's offset, and
//! dead letters are produced to a separate topic carrying the failure reason
//! as a header.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{Header, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{Offset, TopicPartitionList};

use crate::{FeedError, FeedMessage, FeedSource};

/// Header carrying the reason an event was dead-lettered
pub const DEAD_LETTER_REASON_HEADER: &str = "x-dead-letter-reason";

/// Kafka feed over a `StreamConsumer` and a dead-letter `FutureProducer`.
pub struct KafkaFeed {
    consumer: StreamConsumer,
    producer: FutureProducer,
    dead_letter_topic: String,
    poll_timeout: Duration,
    request_timeout: Duration,
}

impl KafkaFeed {
    /// Create a new builder for configuring the feed.
    pub fn builder() -> KafkaFeedBuilder {
        KafkaFeedBuilder::default()
    }
}

#[async_trait]
impl FeedSource for KafkaFeed {
    async fn next(&mut self) -> Result<Option<FeedMessage>, FeedError> {
        let received = match tokio::time::timeout(self.poll_timeout, self.consumer.recv()).await {
            Ok(received) => received,
            Err(_) => return Ok(None),
        };

        match received {
            Ok(message) => Ok(Some(FeedMessage {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            })),
            Err(KafkaError::PartitionEOF(partition)) => {
                debug!("Reached end of partition {}", partition);
                Ok(None)
            }
            Err(e) => Err(FeedError::Fatal(e.to_string())),
        }
    }

    async fn commit(&mut self, msg: &FeedMessage) -> Result<(), FeedError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&msg.topic, msg.partition, Offset::Offset(msg.offset + 1))
            .map_err(|e| FeedError::Commit(e.to_string()))?;

        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .map_err(|e| FeedError::Commit(e.to_string()))
    }

    async fn redeliver(&mut self, msg: &FeedMessage) -> Result<(), FeedError> {
        self.consumer
            .seek(&msg.topic, msg.partition, Offset::Offset(msg.offset), self.request_timeout)
            .map_err(|e| FeedError::Fatal(format!("seek to {} failed: {}", msg, e)))
    }

    async fn dead_letter(&mut self, msg: &FeedMessage, reason: &str) -> Result<(), FeedError> {
        let partition = msg.partition.to_string();
        let offset = msg.offset.to_string();
        let headers = OwnedHeaders::new()
            .insert(Header {
                key: DEAD_LETTER_REASON_HEADER,
                value: Some(reason),
            })
            .insert(Header {
                key: "x-source-topic",
                value: Some(msg.topic.as_str()),
            })
            .insert(Header {
                key: "x-source-partition",
                value: Some(partition.as_str()),
            })
            .insert(Header {
                key: "x-source-offset",
                value: Some(offset.as_str()),
            });

        let record = FutureRecord::<(), [u8]>::to(&self.dead_letter_topic)
            .payload(msg.payload.as_slice())
            .headers(headers);

        self.producer
            .send(record, self.request_timeout)
            .await
            .map(|_| ())
            .map_err(|(e, _)| FeedError::Publish(e.to_string()))?;

        info!("Dead-lettered {} to {}", msg, self.dead_letter_topic);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), FeedError> {
        self.consumer.unsubscribe();
        if let Err(e) = self.producer.flush(self.request_timeout) {
            warn!("Dead-letter producer flush failed: {}", e);
        }
        info!("Kafka feed closed");
        Ok(())
    }
}

impl std::fmt::Debug for KafkaFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaFeed")
            .field("dead_letter_topic", &self.dead_letter_topic)
            .field("poll_timeout", &self.poll_timeout)
            .finish()
    }
}

/// Builder for KafkaFeed.
#[derive(Debug, Default)]
pub struct KafkaFeedBuilder {
    brokers: Option<String>,
    group_id: Option<String>,
    topics: Vec<String>,
    dead_letter_topic: Option<String>,
    credentials: Option<(String, String)>,
    poll_timeout: Option<Duration>,
}

impl KafkaFeedBuilder {
    /// Set the Kafka broker addresses (comma-separated).
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the consumer group ID.
    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Subscribe to these topics.
    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    /// Set the dead-letter topic (default: `fhir.observation.deadletter`).
    pub fn dead_letter_topic(mut self, topic: impl Into<String>) -> Self {
        self.dead_letter_topic = Some(topic.into());
        self
    }

    /// Authenticate with SASL PLAIN over TLS.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Set how long one poll waits for a message (default: 1 second).
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = Some(timeout);
        self
    }

    fn client_config(&self, brokers: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", brokers);

        match &self.credentials {
            Some((username, password)) => {
                config
                    .set("security.protocol", "SASL_SSL")
                    .set("sasl.mechanisms", "PLAIN")
                    .set("sasl.username", username)
                    .set("sasl.password", password);
            }
            None => warn!("Kafka credentials not set, connecting without authentication"),
        }

        config
    }

    /// Build the feed and subscribe to the topics.
    pub fn build(self) -> Result<KafkaFeed, FeedError> {
        let brokers = self
            .brokers
            .clone()
            .unwrap_or_else(|| "localhost:9092".to_string());
        let group_id = self
            .group_id
            .clone()
            .unwrap_or_else(|| "sepsis-detection-consumer".to_string());
        let topics = if self.topics.is_empty() {
            vec![
                "fhir.observation.vitals".to_string(),
                "fhir.observation.labs".to_string(),
            ]
        } else {
            self.topics.clone()
        };

        let consumer: StreamConsumer = self
            .client_config(&brokers)
            .set("group.id", &group_id)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "false")
            .set("max.poll.interval.ms", "300000")
            .set("session.timeout.ms", "60000")
            .create()
            .map_err(|e| FeedError::Fatal(e.to_string()))?;

        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topic_refs)
            .map_err(|e| FeedError::Fatal(e.to_string()))?;

        let producer: FutureProducer = self
            .client_config(&brokers)
            .set("message.timeout.ms", "10000")
            .create()
            .map_err(|e| FeedError::Fatal(e.to_string()))?;

        info!(
            "Kafka feed subscribed to {:?} as group {} on {}",
            topics, group_id, brokers
        );

        Ok(KafkaFeed {
            consumer,
            producer,
            dead_letter_topic: self
                .dead_letter_topic
                .unwrap_or_else(|| "fhir.observation.deadletter".to_string()),
            poll_timeout: self.poll_timeout.unwrap_or(Duration::from_secs(1)),
            request_timeout: Duration::from_secs(5),
        })
    }
}
