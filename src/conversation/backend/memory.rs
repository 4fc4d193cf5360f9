//! In-process backend with clock-driven expiry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;

use crate::conversation::backend::{KeyValueBackend, KvFuture};
use crate::conversation::core::clock::{Clock, SystemClock};
use crate::conversation::core::errors::{StoreError, StoreResult};

/// Stored value with its expiry deadline.
#[derive(Clone, Debug)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe in-memory key-value backend.
///
/// Expired entries behave exactly like missing ones. They are removed when
/// their key is read and on every key scan, so periodic listing keeps the
/// map bounded by the live sessions.
pub struct InMemoryBackend {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemoryBackend {
    /// Create an empty backend that reads time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Remaining time to live of a live key.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| (entry.expires_at - now).to_std().ok())
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the backend holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn deadline(&self, ttl: Duration) -> StoreResult<DateTime<Utc>> {
        let ttl = TimeDelta::from_std(ttl)
            .map_err(|err| StoreError::Backend(format!("ttl out of range: {err}")))?;
        self.clock
            .now()
            .checked_add_signed(ttl)
            .ok_or_else(|| StoreError::Backend("ttl overflows timestamp".to_string()))
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        self.entries.get(key).and_then(|entry| {
            if entry.is_expired(now) {
                drop(entry);
                self.entries.remove(key);
                None
            } else {
                Some(entry.value.clone())
            }
        })
    }
}

/// Match `key` against a pattern with at most one trailing `*`.
fn matches_pattern(pattern: &str, key: &str) -> bool {
    pattern
        .strip_suffix('*')
        .map_or_else(|| pattern == key, |prefix| key.starts_with(prefix))
}

impl KeyValueBackend for InMemoryBackend {
    fn get(&self, key: &str) -> KvFuture<'_, StoreResult<Option<String>>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.live_value(&key)) })
    }

    fn set_with_expiry(
        &self,
        key: &str,
        ttl: Duration,
        value: String,
    ) -> KvFuture<'_, StoreResult<()>> {
        let key = key.to_string();
        Box::pin(async move {
            let expires_at = self.deadline(ttl)?;
            self.entries.insert(key, Entry { value, expires_at });
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> KvFuture<'_, StoreResult<u64>> {
        let key = key.to_string();
        Box::pin(async move {
            let now = self.clock.now();
            let removed = self
                .entries
                .remove(&key)
                .is_some_and(|(_, entry)| !entry.is_expired(now));
            Ok(u64::from(removed))
        })
    }

    fn exists(&self, key: &str) -> KvFuture<'_, StoreResult<bool>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.live_value(&key).is_some()) })
    }

    fn expire(&self, key: &str, ttl: Duration) -> KvFuture<'_, StoreResult<bool>> {
        let key = key.to_string();
        Box::pin(async move {
            let now = self.clock.now();
            let expires_at = self.deadline(ttl)?;
            let Some(mut entry) = self.entries.get_mut(&key) else {
                return Ok(false);
            };
            if entry.is_expired(now) {
                drop(entry);
                self.entries.remove(&key);
                return Ok(false);
            }
            entry.expires_at = expires_at;
            Ok(true)
        })
    }

    fn list_keys(&self, pattern: &str) -> KvFuture<'_, StoreResult<Vec<String>>> {
        let pattern = pattern.to_string();
        Box::pin(async move {
            self.purge_expired();
            let keys = self
                .entries
                .iter()
                .filter(|entry| matches_pattern(&pattern, entry.key()))
                .map(|entry| entry.key().clone())
                .collect();
            Ok(keys)
        })
    }
}
