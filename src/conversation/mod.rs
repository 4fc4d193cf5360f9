//! Conversation subsystem for the chat relay.
//!
//! - `core`: configuration, errors, ids, clock, messages, sessions
//! - `backend`: key-value backends (Redis, in-memory)
//! - `store`: the TTL-bounded conversation store
//! - `locks`: per-session write serialization
//! - `maintenance`: background cleanup of stale sessions

/// Key-value backends.
pub mod backend;
/// Core types: configuration, errors, ids, clock, messages, sessions.
pub mod core;
/// Per-session write locks.
pub mod locks;
/// Background cleanup of stale sessions.
pub mod maintenance;
/// The TTL-bounded conversation store.
pub mod store;

pub use self::backend::{InMemoryBackend, KeyValueBackend, KvFuture, RedisBackend};
pub use self::core::{
    Clock, FormattedMessage, IdGenerator, ManualClock, Message, MessageId, MessageMetadata, Role,
    Session, SessionId, SessionStats, SessionSummary, StoreConfig, StoreError, StoreResult,
    SystemClock, UuidIdGenerator,
};
pub use self::maintenance::{BackgroundCleanup, CleanupConfig, CleanupStats};
pub use self::store::{ConversationStore, DEFAULT_CLEANUP_MAX_AGE};
