//! Durable record of conversations, participants and messages.

mod memory;
mod sql;

pub use memory::MemoryConversationStore;
pub use sql::SqlConversationStore;

use crate::types::{ChatResult, UserId};
use async_trait::async_trait;
use buzzhub_database::{ChatMessage, Conversation};
use chrono::{DateTime, Utc};

/// Storage seam used by the router.
///
/// `append` checks membership before anything is written and assigns the
/// message id and timestamp. Timestamps never go backwards inside one
/// conversation, so listing order is commit order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append(
        &self,
        conversation_id: &str,
        sender_id: UserId,
        body: &str,
    ) -> ChatResult<ChatMessage>;

    /// Messages ordered by `(created_at, id)`, only those strictly after
    /// `after` when given.
    async fn list_messages(
        &self,
        conversation_id: &str,
        after: Option<DateTime<Utc>>,
    ) -> ChatResult<Vec<ChatMessage>>;

    /// Create a conversation. The creator always takes part and duplicate
    /// ids collapse.
    async fn create_conversation(
        &self,
        creator_id: UserId,
        participant_ids: &[UserId],
    ) -> ChatResult<Conversation>;

    async fn get_conversation(&self, conversation_id: &str) -> ChatResult<Conversation>;

    /// Conversations the user takes part in, newest first.
    async fn list_conversations(&self, user_id: UserId) -> ChatResult<Vec<Conversation>>;
}

/// Participant list with the creator first and duplicates removed.
pub(crate) fn participants_with_creator(creator_id: UserId, participant_ids: &[UserId]) -> Vec<UserId> {
    buzzhub_database::CreateConversationRequest {
        participant_ids: participant_ids.to_vec(),
    }
    .participants_with(creator_id)
}
