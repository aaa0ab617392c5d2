//! In-Memory Keyed Store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use crate::{Clock, KeyedStore, StoreError, SystemClock};

#[derive(Debug, Clone)]
struct Field {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
enum Entry {
    Hash {
        fields: HashMap<String, Field>,
        expires_at: DateTime<Utc>,
    },
    Value {
        value: String,
        expires_at: DateTime<Utc>,
    },
}

impl Entry {
    fn expires_at(&self) -> DateTime<Utc> {
        match self {
            Entry::Hash { expires_at, .. } | Entry::Value { expires_at, .. } => *expires_at,
        }
    }
}

/// Single-process store with the same expiry semantics as the shared store.
///
/// All operations take one lock, so each is atomic. Suitable for tests and
/// single-worker deployments; state does not survive a restart.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create a store on the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store driven by `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        info!("Creating in-memory keyed store");
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of live keys
    pub fn key_count(&self) -> usize {
        match self.live_entries() {
            Ok(entries) => entries.len(),
            Err(_) => 0,
        }
    }

    /// Lock the map and drop everything that has expired
    fn live_entries(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock error: {}", e)))?;

        let now = self.clock.now();
        entries.retain(|_, entry| entry.expires_at() > now);
        for entry in entries.values_mut() {
            if let Entry::Hash { fields, .. } = entry {
                fields.retain(|_, f| f.expires_at > now);
            }
        }
        entries.retain(|_, entry| {
            !matches!(entry, Entry::Hash { fields, .. } if fields.is_empty())
        });

        Ok(entries)
    }

    fn deadline(&self, ttl: Duration) -> Result<DateTime<Utc>, StoreError> {
        let ttl =
            chrono::Duration::from_std(ttl).map_err(|e| StoreError::InvalidTtl(e.to_string()))?;
        if ttl <= chrono::Duration::zero() {
            return Err(StoreError::InvalidTtl("TTL must be positive".to_string()));
        }
        Ok(self.clock.now() + ttl)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Command(format!("WRONGTYPE operation against key {}", key))
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn hash_upsert(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let deadline = self.deadline(ttl)?;
        let mut entries = self.live_entries()?;

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry::Hash {
            fields: HashMap::new(),
            expires_at: deadline,
        });

        match entry {
            Entry::Hash { fields, expires_at } => {
                fields.insert(
                    field.to_string(),
                    Field {
                        value: value.to_string(),
                        expires_at: deadline,
                    },
                );
                *expires_at = (*expires_at).max(deadline);
                debug!("HSET {} {} (expires {})", key, field, deadline);
                Ok(())
            }
            Entry::Value { .. } => Err(wrong_type(key)),
        }
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), StoreError> {
        let mut entries = self.live_entries()?;

        let now_empty = match entries.get_mut(key) {
            Some(Entry::Hash { fields, .. }) => {
                fields.remove(field);
                fields.is_empty()
            }
            Some(Entry::Value { .. }) => return Err(wrong_type(key)),
            None => return Ok(()),
        };

        if now_empty {
            entries.remove(key);
        }
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let entries = self.live_entries()?;

        match entries.get(key) {
            Some(Entry::Hash { fields, .. }) => Ok(fields
                .iter()
                .map(|(name, f)| (name.clone(), f.value.clone()))
                .collect()),
            Some(Entry::Value { .. }) => Err(wrong_type(key)),
            None => Ok(HashMap::new()),
        }
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let deadline = self.deadline(ttl)?;
        let mut entries = self.live_entries()?;

        if entries.contains_key(key) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry::Value {
                value: value.to_string(),
                expires_at: deadline,
            },
        );
        Ok(true)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.live_entries()?.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use chrono::TimeZone;

    fn store() -> (Arc<ManualClock>, MemoryStore) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap(),
        ));
        let store = MemoryStore::with_clock(clock.clone());
        (clock, store)
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_hash_upsert_and_read() {
        let (_, store) = store();
        store.hash_upsert("h", "a", "1", HOUR).await.unwrap();
        store.hash_upsert("h", "b", "2", HOUR).await.unwrap();
        store.hash_upsert("h", "a", "3", HOUR).await.unwrap();

        let all = store.hash_get_all("h").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["a"], "3");
        assert!(store.hash_get_all("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fields_expire_independently() {
        let (clock, store) = store();
        store.hash_upsert("h", "old", "1", HOUR).await.unwrap();
        clock.advance(chrono::Duration::minutes(40));
        store.hash_upsert("h", "new", "2", HOUR).await.unwrap();

        clock.advance(chrono::Duration::minutes(30));
        let all = store.hash_get_all("h").await.unwrap();
        assert!(!all.contains_key("old"));
        assert!(all.contains_key("new"));

        clock.advance(chrono::Duration::minutes(31));
        assert!(!store.exists("h").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_last_field_removes_key() {
        let (_, store) = store();
        store.hash_upsert("h", "a", "1", HOUR).await.unwrap();
        store.hash_delete("h", "a").await.unwrap();
        store.hash_delete("h", "a").await.unwrap();
        assert!(!store.exists("h").await.unwrap());
        assert_eq!(store.key_count(), 0);
    }

    #[tokio::test]
    async fn test_set_if_absent_expires() {
        let (clock, store) = store();
        assert!(store.set_if_absent("k", "1", HOUR).await.unwrap());
        assert!(!store.set_if_absent("k", "1", HOUR).await.unwrap());

        clock.advance(chrono::Duration::minutes(60));
        assert!(!store.exists("k").await.unwrap());
        assert!(store.set_if_absent("k", "1", HOUR).await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_type_rejected() {
        let (_, store) = store();
        store.set_if_absent("k", "1", HOUR).await.unwrap();
        assert!(store.hash_upsert("k", "f", "v", HOUR).await.is_err());
    }

    #[tokio::test]
    async fn test_zero_ttl_rejected() {
        let (_, store) = store();
        let err = store.set_if_absent("k", "1", Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTtl(_)));
    }
}
