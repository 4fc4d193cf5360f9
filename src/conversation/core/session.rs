//! Session record and its read-side projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::core::ids::SessionId;
use crate::conversation::core::message::{FormattedMessage, Message, Role};

/// A conversation thread, persisted as one JSON document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session identifier.
    pub id: SessionId,
    /// Creation time, never modified after creation.
    pub created_at: DateTime<Utc>,
    /// Time of the most recent append.
    pub last_activity: DateTime<Utc>,
    /// Messages in append order.
    pub messages: Vec<Message>,
}

impl Session {
    /// Create an empty session stamped at `now`.
    #[must_use]
    pub const fn new(id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: now,
            last_activity: now,
            messages: Vec::new(),
        }
    }

    /// Append a message and bump `last_activity` to its timestamp.
    pub fn push(&mut self, message: Message) {
        // Keep last_activity >= created_at even if the clock stepped backwards.
        self.last_activity = message.timestamp.max(self.created_at);
        self.messages.push(message);
    }

    /// The last `limit` messages in chronological order.
    #[must_use]
    pub fn history(&self, limit: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(limit);
        &self.messages[start..]
    }

    /// Role/content projection of the last `limit` messages.
    #[must_use]
    pub fn formatted(&self, limit: usize, include_system: bool) -> Vec<FormattedMessage> {
        self.history(limit)
            .iter()
            .filter(|message| include_system || message.role != Role::System)
            .map(Message::to_formatted)
            .collect()
    }

    /// Listing summary without message bodies.
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            created_at: self.created_at,
            last_activity: self.last_activity,
            message_count: self.messages.len(),
        }
    }

    /// Message counts and first/last timestamps.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        let count_role = |role: Role| self.messages.iter().filter(|m| m.role == role).count();

        SessionStats {
            total_messages: self.messages.len(),
            user_messages: count_role(Role::User),
            assistant_messages: count_role(Role::Assistant),
            first_message_at: self.messages.first().map(|m| m.timestamp),
            last_message_at: self.messages.last().map(|m| m.timestamp),
        }
    }
}

/// Session listing entry.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session identifier.
    pub id: SessionId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the most recent append.
    pub last_activity: DateTime<Utc>,
    /// Number of stored messages.
    pub message_count: usize,
}

/// Per-session statistics.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    /// Total message count.
    pub total_messages: usize,
    /// Messages with role `user`.
    pub user_messages: usize,
    /// Messages with role `assistant`.
    pub assistant_messages: usize,
    /// Timestamp of the first message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_message_at: Option<DateTime<Utc>>,
    /// Timestamp of the last message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::conversation::core::ids::MessageId;
    use crate::conversation::core::message::MessageMetadata;

    fn session_with(roles: &[Role]) -> Session {
        let start = DateTime::<Utc>::UNIX_EPOCH;
        let mut session = Session::new(SessionId::new("s1"), start);
        for (i, role) in roles.iter().enumerate() {
            let offset = TimeDelta::seconds(i64::try_from(i).unwrap_or_default() + 1);
            session.push(Message::new(
                MessageId::new(format!("m{i}")),
                *role,
                format!("content {i}"),
                start + offset,
                MessageMetadata::new(),
            ));
        }
        session
    }

    #[test]
    fn history_returns_tail_in_order() {
        let session = session_with(&[Role::User, Role::Assistant, Role::User, Role::Assistant]);

        let last_two: Vec<&str> = session.history(2).iter().map(|m| m.id.as_str()).collect();
        assert_eq!(last_two, ["m2", "m3"]);
        assert_eq!(session.history(10).len(), 4);
        assert!(session.history(0).is_empty());
    }

    #[test]
    fn push_bumps_last_activity() {
        let session = session_with(&[Role::User]);
        assert_eq!(session.last_activity, session.messages[0].timestamp);
        assert!(session.last_activity > session.created_at);
    }

    #[test]
    fn formatted_can_drop_system_messages() {
        let session = session_with(&[Role::System, Role::User, Role::Assistant]);

        let without: Vec<Role> = session.formatted(10, false).iter().map(|m| m.role).collect();
        assert_eq!(without, [Role::User, Role::Assistant]);
        assert_eq!(session.formatted(10, true).len(), 3);
    }

    #[test]
    fn stats_on_empty_session_omit_timestamps() {
        let session = session_with(&[]);
        let stats = session.stats();
        assert_eq!(stats, SessionStats::default());

        let value = serde_json::to_value(&stats).expect("serialize stats");
        assert!(value.get("firstMessageAt").is_none());
        assert_eq!(value["totalMessages"], 0);
    }

    #[test]
    fn summary_counts_messages() {
        let session = session_with(&[Role::User, Role::Assistant]);
        let summary = session.summary();
        assert_eq!(summary.message_count, 2);
        assert_eq!(summary.last_activity, session.last_activity);
    }
}
