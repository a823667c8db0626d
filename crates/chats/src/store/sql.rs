use super::{participants_with_creator, ConversationStore};
use crate::types::{ChatError, ChatResult, UserId};
use async_trait::async_trait;
use buzzhub_database::{ChatMessage, Conversation, ConversationRepository, MessageRepository};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// [`ConversationStore`] on top of the SQLite repositories.
#[derive(Clone)]
pub struct SqlConversationStore {
    conversations: ConversationRepository,
    messages: MessageRepository,
}

impl SqlConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            conversations: ConversationRepository::new(pool.clone()),
            messages: MessageRepository::new(pool),
        }
    }
}

#[async_trait]
impl ConversationStore for SqlConversationStore {
    async fn append(
        &self,
        conversation_id: &str,
        sender_id: UserId,
        body: &str,
    ) -> ChatResult<ChatMessage> {
        self.messages
            .append(conversation_id, sender_id, body)
            .await
            .map_err(|e| ChatError::from_conversation_error(e, conversation_id))
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        after: Option<DateTime<Utc>>,
    ) -> ChatResult<Vec<ChatMessage>> {
        self.messages
            .list_by_conversation(conversation_id, after)
            .await
            .map_err(|e| ChatError::from_conversation_error(e, conversation_id))
    }

    async fn create_conversation(
        &self,
        creator_id: UserId,
        participant_ids: &[UserId],
    ) -> ChatResult<Conversation> {
        let participants = participants_with_creator(creator_id, participant_ids);
        self.conversations
            .create(creator_id, &participants)
            .await
            .map_err(|e| ChatError::from_conversation_error(e, ""))
    }

    async fn get_conversation(&self, conversation_id: &str) -> ChatResult<Conversation> {
        self.conversations
            .find_by_public_id(conversation_id)
            .await
            .map_err(|e| ChatError::from_conversation_error(e, conversation_id))?
            .ok_or_else(|| ChatError::conversation_not_found(conversation_id))
    }

    async fn list_conversations(&self, user_id: UserId) -> ChatResult<Vec<Conversation>> {
        self.conversations
            .list_for_user(user_id)
            .await
            .map_err(|e| ChatError::from_conversation_error(e, ""))
    }
}
