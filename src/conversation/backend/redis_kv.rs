//! Redis implementation of the key-value backend.

use std::time::Duration;

use ::redis::aio::ConnectionManager;
use tracing::info;

use crate::conversation::backend::{KeyValueBackend, KvFuture};
use crate::conversation::core::errors::StoreResult;

/// Redis-backed key-value store.
///
/// Uses a multiplexed [`ConnectionManager`] that reconnects on failure; each
/// operation clones the handle, so the backend is cheap to share.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Connect to the Redis server at `url` (e.g. `redis://127.0.0.1:6379`).
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the server is unreachable.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = ::redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to redis backend");
        Ok(Self { conn })
    }

    /// Wrap an existing connection manager.
    #[must_use]
    pub const fn from_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

/// Redis expiries are whole seconds; never round a TTL down to zero.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl KeyValueBackend for RedisBackend {
    fn get(&self, key: &str) -> KvFuture<'_, StoreResult<Option<String>>> {
        let key = key.to_string();
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let value: Option<String> = ::redis::cmd("GET").arg(&key).query_async(&mut conn).await?;
            Ok(value)
        })
    }

    fn set_with_expiry(
        &self,
        key: &str,
        ttl: Duration,
        value: String,
    ) -> KvFuture<'_, StoreResult<()>> {
        let key = key.to_string();
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let (): () = ::redis::cmd("SETEX")
                .arg(&key)
                .arg(ttl_seconds(ttl))
                .arg(value)
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> KvFuture<'_, StoreResult<u64>> {
        let key = key.to_string();
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let removed: u64 = ::redis::cmd("DEL").arg(&key).query_async(&mut conn).await?;
            Ok(removed)
        })
    }

    fn exists(&self, key: &str) -> KvFuture<'_, StoreResult<bool>> {
        let key = key.to_string();
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let exists: bool = ::redis::cmd("EXISTS").arg(&key).query_async(&mut conn).await?;
            Ok(exists)
        })
    }

    fn expire(&self, key: &str, ttl: Duration) -> KvFuture<'_, StoreResult<bool>> {
        let key = key.to_string();
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let applied: bool = ::redis::cmd("EXPIRE")
                .arg(&key)
                .arg(ttl_seconds(ttl))
                .query_async(&mut conn)
                .await?;
            Ok(applied)
        })
    }

    fn list_keys(&self, pattern: &str) -> KvFuture<'_, StoreResult<Vec<String>>> {
        let pattern = pattern.to_string();
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let keys: Vec<String> = ::redis::cmd("KEYS").arg(&pattern).query_async(&mut conn).await?;
            Ok(keys)
        })
    }
}
