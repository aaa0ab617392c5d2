//! Keyed State Store
//!
//! Provides the narrow TTL-capable key/value interface the detector keeps all
//! of its mutable state in:
//! - Hash fields with per-field expiry (criterion records)
//! - Atomic set-if-absent with expiry (alert cooldowns)
//!
//! `MemoryStore` runs against an injectable [`Clock`] so expiry can be driven
//! by simulated time; `RedisStore` (feature `redis`) is the shared production store.

mod clock;
mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Store command failed: {0}")]
    Command(String),
    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),
}

/// Per-key operations the detector requires from its shared store.
///
/// Every operation must be atomic per key so that independent workers can
/// touch the same patient concurrently.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Set `field` in hash `key`, expiring the field after `ttl`.
    /// The key itself must live at least as long as its newest field.
    async fn hash_upsert(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Remove `field` from hash `key`; absent fields are not an error
    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), StoreError>;

    /// All live fields of hash `key` (empty when the key does not exist)
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Create `key` with `ttl` only if it does not exist; `true` when created
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Whether `key` currently exists
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
}
