//! In-Memory Feed

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{FeedError, FeedMessage, FeedSource};

#[derive(Default)]
struct State {
    queue: VecDeque<FeedMessage>,
    next_offset: i64,
    committed: Vec<FeedMessage>,
    dead_letters: Vec<(FeedMessage, String)>,
    redeliveries: usize,
    closed: bool,
}

/// Queue-backed feed that records every acknowledgement.
///
/// Clones share state, so a test can hand one clone to a worker and inspect
/// the other. Reports `Closed` once the queue is drained.
#[derive(Clone, Default)]
pub struct MemoryFeed {
    topic: String,
    state: Arc<Mutex<State>>,
}

impl MemoryFeed {
    /// Create an empty feed labelled `topic`
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue a payload and return its offset
    pub fn push(&self, payload: impl Into<Vec<u8>>) -> i64 {
        let mut state = self.state();
        let offset = state.next_offset;
        state.next_offset += 1;
        state.queue.push_back(FeedMessage {
            topic: self.topic.clone(),
            partition: 0,
            offset,
            payload: payload.into(),
        });
        offset
    }

    /// Messages committed so far, in order
    pub fn committed(&self) -> Vec<FeedMessage> {
        self.state().committed.clone()
    }

    /// Dead-lettered messages with their reasons
    pub fn dead_letters(&self) -> Vec<(FeedMessage, String)> {
        self.state().dead_letters.clone()
    }

    /// Number of redelivery requests
    pub fn redeliveries(&self) -> usize {
        self.state().redeliveries
    }

    /// Messages still waiting to be delivered
    pub fn pending(&self) -> usize {
        self.state().queue.len()
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

#[async_trait]
impl FeedSource for MemoryFeed {
    async fn next(&mut self) -> Result<Option<FeedMessage>, FeedError> {
        match self.state().queue.pop_front() {
            Some(msg) => Ok(Some(msg)),
            None => Err(FeedError::Closed),
        }
    }

    async fn commit(&mut self, msg: &FeedMessage) -> Result<(), FeedError> {
        self.state().committed.push(msg.clone());
        Ok(())
    }

    async fn redeliver(&mut self, msg: &FeedMessage) -> Result<(), FeedError> {
        let mut state = self.state();
        state.redeliveries += 1;
        state.queue.push_front(msg.clone());
        Ok(())
    }

    async fn dead_letter(&mut self, msg: &FeedMessage, reason: &str) -> Result<(), FeedError> {
        self.state()
            .dead_letters
            .push((msg.clone(), reason.to_string()));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), FeedError> {
        self.state().closed = true;
        Ok(())
    }
}
