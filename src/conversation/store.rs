//! TTL-bounded conversation store.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use futures::future::try_join_all;
use tracing::{debug, info};

use crate::conversation::backend::KeyValueBackend;
use crate::conversation::core::clock::{Clock, SystemClock};
use crate::conversation::core::config::{DEFAULT_CLEANUP_MAX_AGE_SECONDS, StoreConfig};
use crate::conversation::core::errors::{StoreError, StoreResult};
use crate::conversation::core::ids::{IdGenerator, SessionId, UuidIdGenerator};
use crate::conversation::core::message::{FormattedMessage, Message, MessageMetadata, Role};
use crate::conversation::core::session::{Session, SessionStats, SessionSummary};
use crate::conversation::locks::SessionLocks;

/// Default max age for [`ConversationStore::cleanup_old_sessions`].
pub const DEFAULT_CLEANUP_MAX_AGE: Duration = Duration::from_secs(DEFAULT_CLEANUP_MAX_AGE_SECONDS);

/// Session storage on top of a key-value backend.
///
/// Every session is one JSON document under `<prefix>:<id>` carrying the
/// configured TTL. Appends reset the TTL (sliding expiry). Creation, appends
/// and the cleanup sweep hold a per-session lock, so writers in this process
/// never lose each other's messages; writers in other processes still can.
pub struct ConversationStore {
    backend: Arc<dyn KeyValueBackend>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: StoreConfig,
    locks: SessionLocks,
}

impl ConversationStore {
    /// Create a store using the system clock and UUID ids.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(backend: Arc<dyn KeyValueBackend>, config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidIdGenerator),
            config,
            locks: SessionLocks::new(),
        })
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the id generator.
    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn key(&self, id: &SessionId) -> String {
        format!("{}:{}", self.config.key_prefix, id)
    }

    fn scan_pattern(&self) -> String {
        format!("{}:*", self.config.key_prefix)
    }

    async fn load(&self, key: &str) -> StoreResult<Option<Session>> {
        match self.backend.get(key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, session: &Session) -> StoreResult<()> {
        let json = serde_json::to_string(session)?;
        self.backend
            .set_with_expiry(&self.key(&session.id), self.config.session_ttl(), json)
            .await
    }

    /// Create and persist an empty session.
    ///
    /// A supplied id is used verbatim and overwrites any existing record.
    ///
    /// # Errors
    /// Returns an error if the backend write fails.
    pub async fn create_session(&self, id: Option<SessionId>) -> StoreResult<Session> {
        let id = id.unwrap_or_else(|| self.ids.session_id());
        let _guard = self.locks.acquire(&id).await;
        self.insert_empty(id).await
    }

    /// Load the session `id`, creating it empty if it has no live record.
    ///
    /// The lookup and the creation run under the session lock, so a
    /// concurrent append to a session created this way is never wiped.
    ///
    /// # Errors
    /// Returns an error if a backend call fails or the record is corrupt.
    pub async fn get_or_create_session(&self, id: &SessionId) -> StoreResult<Session> {
        let _guard = self.locks.acquire(id).await;
        match self.get_session(id).await? {
            Some(session) => Ok(session),
            None => self.insert_empty(id.clone()).await,
        }
    }

    async fn insert_empty(&self, id: SessionId) -> StoreResult<Session> {
        let session = Session::new(id, self.clock.now());
        self.save(&session).await?;
        info!(session_id = %session.id, "Created session");
        Ok(session)
    }

    /// Load a live session.
    ///
    /// # Errors
    /// Returns an error if the backend read fails or the record is corrupt.
    pub async fn get_session(&self, id: &SessionId) -> StoreResult<Option<Session>> {
        self.load(&self.key(id)).await
    }

    /// Append a message and slide the session TTL forward.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the session is absent or expired,
    /// or a backend error if the read or write fails.
    pub async fn add_message(
        &self,
        session_id: &SessionId,
        role: Role,
        content: impl Into<String>,
        metadata: MessageMetadata,
    ) -> StoreResult<Message> {
        let _guard = self.locks.acquire(session_id).await;

        let mut session = self
            .get_session(session_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(session_id.clone()))?;

        let message = Message::new(
            self.ids.message_id(),
            role,
            content,
            self.clock.now(),
            metadata,
        );
        session.push(message.clone());
        self.save(&session).await?;

        debug!(
            session_id = %session_id,
            role = %role,
            messages = session.messages.len(),
            "Appended message"
        );
        Ok(message)
    }

    /// The last `limit` messages, oldest first. Empty if the session is absent.
    ///
    /// # Errors
    /// Returns an error if the backend read fails or the record is corrupt.
    pub async fn get_conversation_history(
        &self,
        session_id: &SessionId,
        limit: usize,
    ) -> StoreResult<Vec<Message>> {
        Ok(self
            .get_session(session_id)
            .await?
            .map(|session| session.history(limit).to_vec())
            .unwrap_or_default())
    }

    /// Role/content projection of the recent history, used as model input.
    ///
    /// Covers the last `history_limit` messages of the store configuration.
    ///
    /// # Errors
    /// Returns an error if the backend read fails or the record is corrupt.
    pub async fn get_formatted_messages(
        &self,
        session_id: &SessionId,
        include_system: bool,
    ) -> StoreResult<Vec<FormattedMessage>> {
        Ok(self
            .get_session(session_id)
            .await?
            .map(|session| session.formatted(self.config.history_limit, include_system))
            .unwrap_or_default())
    }

    /// Delete a session. Returns whether a record was removed.
    ///
    /// # Errors
    /// Returns an error if the backend call fails.
    pub async fn delete_session(&self, id: &SessionId) -> StoreResult<bool> {
        let removed = self.backend.delete(&self.key(id)).await? > 0;
        if removed {
            info!(session_id = %id, "Deleted session");
        }
        Ok(removed)
    }

    /// Reset a session's TTL without touching its content.
    ///
    /// # Errors
    /// Returns an error if the backend call fails.
    pub async fn extend_session(&self, id: &SessionId) -> StoreResult<bool> {
        let key = self.key(id);
        if !self.backend.exists(&key).await? {
            return Ok(false);
        }
        let extended = self.backend.expire(&key, self.config.session_ttl()).await?;
        debug!(session_id = %id, extended, "Extended session TTL");
        Ok(extended)
    }

    /// Summaries of every live session, most recently active first.
    ///
    /// This is a full scan of the key space.
    ///
    /// # Errors
    /// Returns an error if any backend call fails or a record is corrupt.
    pub async fn get_all_sessions(&self) -> StoreResult<Vec<SessionSummary>> {
        let keys = self.backend.list_keys(&self.scan_pattern()).await?;
        let sessions = try_join_all(keys.iter().map(|key| self.load(key))).await?;

        let mut summaries: Vec<SessionSummary> = sessions
            .into_iter()
            .flatten()
            .map(|session| session.summary())
            .collect();
        summaries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(summaries)
    }

    /// Delete every session idle for longer than `max_age`.
    ///
    /// Returns the number of sessions deleted.
    ///
    /// # Errors
    /// Returns an error if any backend call fails or a record is corrupt.
    pub async fn cleanup_old_sessions(&self, max_age: Duration) -> StoreResult<usize> {
        let max_age = TimeDelta::from_std(max_age)
            .map_err(|err| StoreError::InvalidConfig(format!("max_age out of range: {err}")))?;
        let keys = self.backend.list_keys(&self.scan_pattern()).await?;

        let mut deleted = 0;
        for key in keys {
            let Some(session) = self.load(&key).await? else {
                continue;
            };

            let _guard = self.locks.acquire(&session.id).await;
            // Re-read under the lock: an append may have landed since the scan.
            let Some(session) = self.load(&key).await? else {
                continue;
            };
            if self.clock.now() - session.last_activity > max_age
                && self.backend.delete(&key).await? > 0
            {
                deleted += 1;
            }
        }

        if deleted > 0 {
            info!(deleted, "Cleaned up stale sessions");
        }
        Ok(deleted)
    }

    /// Message statistics for a session, or `None` if it is absent.
    ///
    /// # Errors
    /// Returns an error if the backend read fails or the record is corrupt.
    pub async fn get_session_stats(&self, id: &SessionId) -> StoreResult<Option<SessionStats>> {
        Ok(self.get_session(id).await?.map(|session| session.stats()))
    }
}
