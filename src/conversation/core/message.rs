//! Message model for conversation turns.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::core::ids::MessageId;

/// Free-form metadata attached to a message at append time.
pub type MessageMetadata = serde_json::Map<String, serde_json::Value>;

/// Field names owned by [`Message`] itself; metadata can never shadow them.
pub const RESERVED_FIELDS: [&str; 4] = ["id", "role", "content", "timestamp"];

/// Author of a message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// User input.
    User,
    /// Model reply.
    Assistant,
    /// System instruction.
    System,
}

impl Role {
    /// Stable string form for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            _ => Err(value.to_string()),
        }
    }
}

/// A single turn within a session.
///
/// Metadata is flattened onto the record, so a message persisted with
/// `{"model": "x"}` serializes as `{"id", "role", "content", "timestamp", "model"}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier.
    pub id: MessageId,
    /// Author role.
    pub role: Role,
    /// Text payload.
    pub content: String,
    /// Append time.
    pub timestamp: DateTime<Utc>,
    /// Extra fields stored verbatim.
    #[serde(flatten)]
    pub metadata: MessageMetadata,
}

impl Message {
    /// Build a message, dropping metadata keys that collide with core fields.
    #[must_use]
    pub fn new(
        id: MessageId,
        role: Role,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
        mut metadata: MessageMetadata,
    ) -> Self {
        for field in RESERVED_FIELDS {
            if metadata.remove(field).is_some() {
                tracing::debug!(field, "dropping reserved metadata key");
            }
        }

        Self {
            id,
            role,
            content: content.into(),
            timestamp,
            metadata,
        }
    }

    /// Role and content only, as fed to a language model.
    #[must_use]
    pub fn to_formatted(&self) -> FormattedMessage {
        FormattedMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Minimal projection of a message used as model input.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FormattedMessage {
    /// Author role.
    pub role: Role,
    /// Text payload.
    pub content: String,
}

impl FormattedMessage {
    /// Build a formatted message.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn metadata_is_flattened_onto_the_record() {
        let mut metadata = MessageMetadata::new();
        metadata.insert("model".to_string(), json!("llama3.1:8b"));
        metadata.insert("usage".to_string(), json!({"totalTokens": 12}));

        let message = Message::new(
            MessageId::new("m1"),
            Role::Assistant,
            "hi",
            DateTime::<Utc>::UNIX_EPOCH,
            metadata,
        );
        let value = serde_json::to_value(&message).expect("serialize message");

        assert_eq!(value["role"], json!("assistant"));
        assert_eq!(value["model"], json!("llama3.1:8b"));
        assert_eq!(value["usage"]["totalTokens"], json!(12));

        let back: Message = serde_json::from_value(value).expect("deserialize message");
        assert_eq!(back, message);
    }

    #[test]
    fn reserved_metadata_keys_are_dropped() {
        let mut metadata = MessageMetadata::new();
        metadata.insert("id".to_string(), json!("spoofed"));
        metadata.insert("role".to_string(), json!("system"));
        metadata.insert("source".to_string(), json!("web"));

        let message = Message::new(
            MessageId::new("m1"),
            Role::User,
            "hello",
            DateTime::<Utc>::UNIX_EPOCH,
            metadata,
        );

        assert_eq!(message.id.as_str(), "m1");
        assert_eq!(message.role, Role::User);
        assert_eq!(message.metadata.len(), 1);
        assert!(message.metadata.contains_key("source"));
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::User, Role::Assistant, Role::System] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!("tool".parse::<Role>().is_err());
    }
}
