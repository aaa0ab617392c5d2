//! JSON-Lines Feed

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, Lines};
use tracing::{debug, info};

use crate::{FeedError, FeedMessage, FeedSource};

/// Reads one envelope per line from an async reader.
///
/// Each non-blank line becomes a message on a single partition whose offset is
/// the line number. Redelivered messages are replayed before new input. Dead
/// letters are written to stderr as JSON.
pub struct LinesFeed<R> {
    lines: Lines<R>,
    topic: String,
    next_offset: i64,
    pending: VecDeque<FeedMessage>,
}

impl<R: AsyncBufRead + Unpin + Send> LinesFeed<R> {
    /// Create a feed labelled `topic` over `reader`
    pub fn new(topic: impl Into<String>, reader: R) -> Self {
        let topic = topic.into();
        info!("Creating lines feed for topic {}", topic);
        Self {
            lines: reader.lines(),
            topic,
            next_offset: 0,
            pending: VecDeque::new(),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> FeedSource for LinesFeed<R> {
    async fn next(&mut self) -> Result<Option<FeedMessage>, FeedError> {
        if let Some(msg) = self.pending.pop_front() {
            return Ok(Some(msg));
        }

        loop {
            let line = match self.lines.next_line().await? {
                Some(line) => line,
                None => return Err(FeedError::Closed),
            };
            let offset = self.next_offset;
            self.next_offset += 1;

            if line.trim().is_empty() {
                continue;
            }

            return Ok(Some(FeedMessage {
                topic: self.topic.clone(),
                partition: 0,
                offset,
                payload: line.into_bytes(),
            }));
        }
    }

    async fn commit(&mut self, msg: &FeedMessage) -> Result<(), FeedError> {
        debug!("Committed {}", msg);
        Ok(())
    }

    async fn redeliver(&mut self, msg: &FeedMessage) -> Result<(), FeedError> {
        self.pending.push_back(msg.clone());
        Ok(())
    }

    async fn dead_letter(&mut self, msg: &FeedMessage, reason: &str) -> Result<(), FeedError> {
        let record = json!({
            "topic": msg.topic,
            "partition": msg.partition,
            "offset": msg.offset,
            "reason": reason,
            "payload": String::from_utf8_lossy(&msg.payload),
        });
        let mut line = record.to_string();
        line.push('\n');

        let mut stderr = tokio::io::stderr();
        stderr.write_all(line.as_bytes()).await?;
        stderr.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), FeedError> {
        self.pending.clear();
        info!("Lines feed {} closed", self.topic);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    fn feed(input: &'static str) -> LinesFeed<BufReader<&'static [u8]>> {
        LinesFeed::new("stdin", BufReader::new(input.as_bytes()))
    }

    #[tokio::test]
    async fn test_reads_lines_until_closed() {
        let mut feed = feed("{\"a\":1}\n\n{\"b\":2}\n");

        let first = feed.next().await.unwrap().unwrap();
        assert_eq!(first.offset, 0);
        assert_eq!(first.payload, b"{\"a\":1}");

        let second = feed.next().await.unwrap().unwrap();
        assert_eq!(second.offset, 2);

        assert!(matches!(feed.next().await, Err(FeedError::Closed)));
    }

    #[tokio::test]
    async fn test_redelivered_message_comes_first() {
        let mut feed = feed("one\ntwo\n");

        let first = feed.next().await.unwrap().unwrap();
        feed.redeliver(&first).await.unwrap();

        let again = feed.next().await.unwrap().unwrap();
        assert_eq!(again, first);
        assert_eq!(feed.next().await.unwrap().unwrap().payload, b"two");
    }
}
