//! Key-value backends for session records.
//!
//! The store only needs six primitives, all keyed by `<prefix>:<sessionId>`:
//! - `get` / `set_with_expiry` for whole-record reads and writes
//! - `delete` and `exists`
//! - `expire` to refresh a TTL without rewriting the value
//! - `list_keys` for prefix-wildcard scans

/// In-process backend with clock-driven expiry.
pub mod memory;
/// Redis backend.
pub mod redis_kv;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::conversation::core::errors::StoreResult;

pub use self::memory::InMemoryBackend;
pub use self::redis_kv::RedisBackend;

/// Boxed future type for backend operations.
pub type KvFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Key-value backend with per-key expiry.
pub trait KeyValueBackend: Send + Sync {
    /// Read a value; `None` when the key is absent or expired.
    ///
    /// # Errors
    /// Returns an error if backend access fails.
    fn get(&self, key: &str) -> KvFuture<'_, StoreResult<Option<String>>>;

    /// Write a value that expires after `ttl`.
    ///
    /// # Errors
    /// Returns an error if backend access fails.
    fn set_with_expiry(
        &self,
        key: &str,
        ttl: Duration,
        value: String,
    ) -> KvFuture<'_, StoreResult<()>>;

    /// Remove a key, returning how many keys were removed (0 or 1).
    ///
    /// # Errors
    /// Returns an error if backend access fails.
    fn delete(&self, key: &str) -> KvFuture<'_, StoreResult<u64>>;

    /// Check whether a live key exists.
    ///
    /// # Errors
    /// Returns an error if backend access fails.
    fn exists(&self, key: &str) -> KvFuture<'_, StoreResult<bool>>;

    /// Reset a key's TTL without touching its value. Returns `false` if absent.
    ///
    /// # Errors
    /// Returns an error if backend access fails.
    fn expire(&self, key: &str, ttl: Duration) -> KvFuture<'_, StoreResult<bool>>;

    /// List live keys matching a glob pattern such as `session:*`.
    ///
    /// # Errors
    /// Returns an error if backend access fails.
    fn list_keys(&self, pattern: &str) -> KvFuture<'_, StoreResult<Vec<String>>>;
}
