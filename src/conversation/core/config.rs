//! Configuration for the conversation store.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::conversation::core::errors::{StoreError, StoreResult};

/// Default sliding TTL for a session: 24 hours.
pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 60 * 60 * 24;
/// Default max age used by the cleanup sweep: 7 days.
pub const DEFAULT_CLEANUP_MAX_AGE_SECONDS: u64 = 60 * 60 * 24 * 7;

/// Characters with a meaning in Redis `KEYS` patterns.
const GLOB_METACHARACTERS: [char; 5] = ['*', '?', '[', ']', '\\'];

/// Store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Prefix of every session key (`<prefix>:<id>`).
    pub key_prefix: String,
    /// TTL applied on create, append and extend.
    pub session_ttl_seconds: u64,
    /// Number of recent messages used to build model context.
    pub history_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "session".to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            history_limit: 50,
        }
    }
}

impl StoreConfig {
    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> StoreResult<()> {
        if self.key_prefix.is_empty() {
            return Err(StoreError::InvalidConfig(
                "key_prefix must not be empty".to_string(),
            ));
        }

        if self.key_prefix.contains(GLOB_METACHARACTERS) {
            return Err(StoreError::InvalidConfig(format!(
                "key_prefix must not contain any of {GLOB_METACHARACTERS:?}"
            )));
        }

        if self.session_ttl_seconds == 0 {
            return Err(StoreError::InvalidConfig(
                "session_ttl_seconds must be > 0".to_string(),
            ));
        }

        if self.history_limit == 0 {
            return Err(StoreError::InvalidConfig(
                "history_limit must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Session TTL as a duration.
    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }
}
