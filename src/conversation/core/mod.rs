//! Core conversation types and identifiers.

/// Injectable time source.
pub mod clock;
/// Store configuration.
pub mod config;
/// Store error types.
pub mod errors;
/// Session and message identifiers.
pub mod ids;
/// Messages and roles.
pub mod message;
/// Session records, summaries and statistics.
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DEFAULT_CLEANUP_MAX_AGE_SECONDS, DEFAULT_SESSION_TTL_SECONDS, StoreConfig};
pub use errors::{StoreError, StoreResult};
pub use ids::{IdGenerator, MessageId, SessionId, UuidIdGenerator};
pub use message::{FormattedMessage, Message, MessageMetadata, Role};
pub use session::{Session, SessionStats, SessionSummary};
