use super::{participants_with_creator, ConversationStore};
use crate::types::{ChatError, ChatResult, UserId};
use async_trait::async_trait;
use buzzhub_database::{ChatMessage, Conversation};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Process-local [`ConversationStore`].
///
/// Has no user directory: any user id is accepted as a participant.
#[derive(Default)]
pub struct MemoryConversationStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    next_conversation: i64,
    next_message: i64,
    conversations: HashMap<String, StoredConversation>,
}

struct StoredConversation {
    conversation: Conversation,
    messages: Vec<ChatMessage>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn append(
        &self,
        conversation_id: &str,
        sender_id: UserId,
        body: &str,
    ) -> ChatResult<ChatMessage> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let stored = state
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| ChatError::conversation_not_found(conversation_id))?;
        if !stored.conversation.has_participant(sender_id) {
            return Err(ChatError::not_participant(conversation_id, sender_id));
        }

        state.next_message += 1;
        let id = state.next_message;
        let now = Utc::now();
        let created_at = match stored.messages.last() {
            Some(last) if last.created_at >= now => last.created_at + Duration::microseconds(1),
            _ => now,
        };

        let message = ChatMessage {
            id,
            public_id: format!("msg-{id}"),
            conversation_id: conversation_id.to_string(),
            sender_id,
            body: body.to_string(),
            created_at,
        };
        stored.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        after: Option<DateTime<Utc>>,
    ) -> ChatResult<Vec<ChatMessage>> {
        let state = self.state.lock().await;
        let stored = state
            .conversations
            .get(conversation_id)
            .ok_or_else(|| ChatError::conversation_not_found(conversation_id))?;

        Ok(stored
            .messages
            .iter()
            .filter(|m| after.map_or(true, |after| m.created_at > after))
            .cloned()
            .collect())
    }

    async fn create_conversation(
        &self,
        creator_id: UserId,
        participant_ids: &[UserId],
    ) -> ChatResult<Conversation> {
        let participants = participants_with_creator(creator_id, participant_ids);

        let mut state = self.state.lock().await;
        state.next_conversation += 1;
        let db_id = state.next_conversation;

        let conversation = Conversation {
            db_id,
            id: format!("conv-{db_id}"),
            created_by: creator_id,
            participant_ids: participants,
            created_at: Utc::now(),
        };
        state.conversations.insert(
            conversation.id.clone(),
            StoredConversation {
                conversation: conversation.clone(),
                messages: Vec::new(),
            },
        );
        Ok(conversation)
    }

    async fn get_conversation(&self, conversation_id: &str) -> ChatResult<Conversation> {
        let state = self.state.lock().await;
        state
            .conversations
            .get(conversation_id)
            .map(|stored| stored.conversation.clone())
            .ok_or_else(|| ChatError::conversation_not_found(conversation_id))
    }

    async fn list_conversations(&self, user_id: UserId) -> ChatResult<Vec<Conversation>> {
        let state = self.state.lock().await;
        let mut conversations: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|stored| stored.conversation.has_participant(user_id))
            .map(|stored| stored.conversation.clone())
            .collect();
        conversations.sort_by(|a, b| (b.created_at, b.db_id).cmp(&(a.created_at, a.db_id)));
        Ok(conversations)
    }
}
