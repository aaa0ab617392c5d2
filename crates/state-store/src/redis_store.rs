//! Redis-Backed Keyed Store
//!
//! Field-level expiry uses `HEXPIRE`, which needs Redis 7.4 or newer.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::{KeyedStore, StoreError};

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Command(err.to_string())
        }
    }
}

/// Shared store on a Redis server.
///
/// The connection manager re-establishes the socket after a drop or server
/// restart; calls made while it is down fail with `StoreError::Unavailable`.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    /// Connect to `redis://{host}:{port}`
    pub async fn connect(host: &str, port: u16) -> Result<Self, StoreError> {
        let url = format!("redis://{}:{}/", host, port);
        info!("Connecting to Redis at {}:{}", host, port);

        let client = Client::open(url.as_str())
            .map_err(|e| StoreError::Unavailable(format!("Failed to create Redis client: {}", e)))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self { connection })
    }

    fn ttl_secs(ttl: Duration) -> Result<i64, StoreError> {
        let secs = ttl.as_secs();
        if secs == 0 {
            return Err(StoreError::InvalidTtl("TTL must be at least one second".to_string()));
        }
        i64::try_from(secs).map_err(|e| StoreError::InvalidTtl(e.to_string()))
    }
}

#[async_trait]
impl KeyedStore for RedisStore {
    async fn hash_upsert(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let secs = Self::ttl_secs(ttl)?;
        let mut con = self.connection.clone();

        redis::pipe()
            .atomic()
            .cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .ignore()
            .cmd("HEXPIRE")
            .arg(key)
            .arg(secs)
            .arg("FIELDS")
            .arg(1)
            .arg(field)
            .ignore()
            .cmd("EXPIRE")
            .arg(key)
            .arg(secs)
            .ignore()
            .query_async::<()>(&mut con)
            .await?;

        debug!("HSET {} {} (ttl {}s)", key, field, secs);
        Ok(())
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), StoreError> {
        let mut con = self.connection.clone();
        redis::cmd("HDEL")
            .arg(key)
            .arg(field)
            .query_async::<i64>(&mut con)
            .await?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut con = self.connection.clone();
        let fields = redis::cmd("HGETALL")
            .arg(key)
            .query_async::<HashMap<String, String>>(&mut con)
            .await?;
        Ok(fields)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let secs = Self::ttl_secs(ttl)?;
        let mut con = self.connection.clone();

        let reply = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(secs)
            .query_async::<Option<String>>(&mut con)
            .await?;

        Ok(reply.is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut con = self.connection.clone();
        let count = redis::cmd("EXISTS")
            .arg(key)
            .query_async::<i64>(&mut con)
            .await?;
        Ok(count > 0)
    }
}
