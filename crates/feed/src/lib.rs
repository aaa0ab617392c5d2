//! Observation Feed
//!
//! At-least-once sources of observation envelopes:
//! - `KafkaFeed` consumer group with manual offset commits (`kafka` feature)
//! - `LinesFeed` JSON lines from any async reader
//! - `MemoryFeed` in-memory queue for tests

mod lines;
mod memory;

#[cfg(feature = "kafka")]
mod kafka;

pub use lines::LinesFeed;
pub use memory::MemoryFeed;

#[cfg(feature = "kafka")]
pub use kafka::{KafkaFeed, KafkaFeedBuilder, DEAD_LETTER_REASON_HEADER};

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Feed error types
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Feed closed")]
    Closed,

    #[error("Fatal feed error: {0}")]
    Fatal(String),

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Dead-letter publish failed: {0}")]
    Publish(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One delivered event and its position in the feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

impl FeedMessage {
    /// Feed position used to count delivery attempts
    pub fn position(&self) -> (String, i32, i64) {
        (self.topic.clone(), self.partition, self.offset)
    }
}

impl fmt::Display for FeedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]@{}", self.topic, self.partition, self.offset)
    }
}

/// A source of events with explicit acknowledgement
#[async_trait]
pub trait FeedSource: Send {
    /// Next event, or `None` on a transient condition such as a poll timeout.
    /// `FeedError::Closed` means the input is exhausted.
    async fn next(&mut self) -> Result<Option<FeedMessage>, FeedError>;

    /// Acknowledge an event so it is not delivered again
    async fn commit(&mut self, msg: &FeedMessage) -> Result<(), FeedError>;

    /// Rewind so the event is delivered again
    async fn redeliver(&mut self, msg: &FeedMessage) -> Result<(), FeedError>;

    /// Park an event that repeatedly failed processing
    async fn dead_letter(&mut self, msg: &FeedMessage, reason: &str) -> Result<(), FeedError>;

    /// Release feed resources
    async fn close(&mut self) -> Result<(), FeedError>;
}
