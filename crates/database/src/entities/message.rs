//! Message entity definitions

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// An immutable message in a conversation.
///
/// Messages sort by `created_at`, then by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    /// Store-assigned, increasing within the store
    pub id: i64,
    pub public_id: String,
    /// Public id of the owning conversation
    pub conversation_id: String,
    pub sender_id: i64,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Key used to order messages inside a conversation.
    pub fn order_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.id)
    }
}

impl PartialOrd for ChatMessage {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChatMessage {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.order_key().cmp(&other.order_key())
    }
}

/// Format a timestamp as fixed-width RFC 3339 text (microseconds, `Z`).
///
/// Fixed width keeps lexical order equal to chronological order in SQL.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(id: i64, created_at: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            id,
            public_id: format!("m{id}"),
            conversation_id: "c1".to_string(),
            sender_id: 1,
            body: "hi".to_string(),
            created_at,
        }
    }

    #[test]
    fn ordering_breaks_timestamp_ties_by_id() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut messages = vec![message(3, at), message(1, at), message(2, at - chrono::Duration::seconds(1))];
        messages.sort();
        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn formatted_timestamps_sort_lexically() {
        let early = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let late = early + chrono::Duration::microseconds(1);
        let (a, b) = (format_timestamp(&early), format_timestamp(&late));
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(a, "2024-05-01T12:00:00.000000Z");
    }
}
