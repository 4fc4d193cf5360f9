//! Identifier types for sessions and messages.
//!
//! Both identifiers are opaque strings: session ids may be supplied by
//! callers, so the store never assumes a UUID shape when reading them back.
//! Fresh ids come from an [`IdGenerator`], injected into the store.
//!
//! ## Cargo features used by this module
//! - `uuid_v7`: [`UuidIdGenerator`] emits time-ordered `UUIDv7` values.

use core::fmt;
use core::str::FromStr;
use std::convert::Infallible;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate an ID intended to have good insert locality.
///
/// With feature `uuid_v7` enabled, this uses `Uuid::now_v7()`.
/// Otherwise it falls back to `Uuid::new_v4()`.
#[inline]
#[must_use]
fn uuid_time_ordered() -> Uuid {
    #[cfg(feature = "uuid_v7")]
    {
        Uuid::now_v7()
    }
    #[cfg(not(feature = "uuid_v7"))]
    {
        Uuid::new_v4()
    }
}

/// Declare an opaque string identifier with a consistent API.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing string identifier.
            #[inline]
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the identifier as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Extract the underlying string.
            #[inline]
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            #[inline]
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<Uuid> for $name {
            #[inline]
            fn from(value: Uuid) -> Self {
                Self(value.to_string())
            }
        }

        impl AsRef<str> for $name {
            #[inline]
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = Infallible;

            #[inline]
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }
    };
}

define_string_id!(
    /// Identifier for a conversation session.
    ///
    /// Caller-supplied ids are stored verbatim; the store does not check for
    /// collisions with existing sessions.
    SessionId
);

define_string_id!(
    /// Identifier for a single message within a session.
    MessageId
);

/// Source of fresh identifiers.
pub trait IdGenerator: Send + Sync {
    /// Generate a new session id.
    fn session_id(&self) -> SessionId;
    /// Generate a new message id.
    fn message_id(&self) -> MessageId;
}

/// UUID-backed identifier generator.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn session_id(&self) -> SessionId {
        SessionId::from(Uuid::new_v4())
    }

    fn message_id(&self) -> MessageId {
        MessageId::from(uuid_time_ordered())
    }
}
