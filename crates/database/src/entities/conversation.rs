//! Conversation entity definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fixed group of participants sharing one message history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Database primary key
    #[serde(skip_serializing, default)]
    pub db_id: i64,
    /// Public identifier handed to clients
    pub id: String,
    pub created_by: i64,
    /// Participants in join order; never empty.
    pub participant_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
}

/// Request to create a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConversationRequest {
    pub participant_ids: Vec<i64>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: i64) -> bool {
        self.participant_ids.contains(&user_id)
    }
}

impl CreateConversationRequest {
    /// Resolve the final participant list: the creator first, then the
    /// requested users in order, without duplicates.
    pub fn participants_with(&self, creator_id: i64) -> Vec<i64> {
        let mut participants = Vec::with_capacity(self.participant_ids.len() + 1);
        participants.push(creator_id);
        for id in &self.participant_ids {
            if !participants.contains(id) {
                participants.push(*id);
            }
        }
        participants
    }
}
