//! Write path for messages: validate, persist, then publish.

use crate::delivery::DeliveryBus;
use crate::store::ConversationStore;
use crate::types::{ChatError, ChatResult, DeliveryEvent, UserId};
use buzzhub_database::{ChatMessage, Conversation};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct MessageRouter {
    store: Arc<dyn ConversationStore>,
    bus: DeliveryBus,
    max_message_length: usize,
}

impl MessageRouter {
    pub fn new(store: Arc<dyn ConversationStore>, bus: DeliveryBus, max_message_length: usize) -> Self {
        Self {
            store,
            bus,
            max_message_length,
        }
    }

    /// Persist a message and publish it to live subscribers.
    ///
    /// The stored message is returned whatever happens on the delivery side.
    /// Nothing is published when the store rejects the message.
    pub async fn send(
        &self,
        conversation_id: &str,
        sender_id: UserId,
        body: &str,
    ) -> ChatResult<ChatMessage> {
        self.validate(conversation_id, body)?;

        let message = self.store.append(conversation_id, sender_id, body).await?;

        let outcome = self.bus.publish(DeliveryEvent::message_sent(message.clone()));
        if outcome.dropped > 0 {
            warn!(
                conversation_id,
                message_id = message.id,
                dropped = outcome.dropped,
                "message not queued for every bus handler"
            );
        }
        debug!(
            conversation_id,
            message_id = message.id,
            sender_id,
            queued = outcome.queued,
            "message sent"
        );

        Ok(message)
    }

    /// Messages of a conversation for one of its participants.
    pub async fn history(
        &self,
        conversation_id: &str,
        viewer_id: UserId,
        after: Option<DateTime<Utc>>,
    ) -> ChatResult<Vec<ChatMessage>> {
        self.conversation_for(conversation_id, viewer_id).await?;
        self.store.list_messages(conversation_id, after).await
    }

    pub async fn create_conversation(
        &self,
        creator_id: UserId,
        participant_ids: &[UserId],
    ) -> ChatResult<Conversation> {
        let conversation = self
            .store
            .create_conversation(creator_id, participant_ids)
            .await?;
        info!(
            conversation_id = %conversation.id,
            creator_id,
            participants = conversation.participant_ids.len(),
            "conversation created"
        );
        Ok(conversation)
    }

    /// Fetch a conversation, failing unless `viewer_id` takes part in it.
    pub async fn conversation_for(
        &self,
        conversation_id: &str,
        viewer_id: UserId,
    ) -> ChatResult<Conversation> {
        let conversation = self.store.get_conversation(conversation_id).await?;
        if !conversation.has_participant(viewer_id) {
            return Err(ChatError::not_participant(conversation_id, viewer_id));
        }
        Ok(conversation)
    }

    pub async fn conversations_for(&self, user_id: UserId) -> ChatResult<Vec<Conversation>> {
        self.store.list_conversations(user_id).await
    }

    fn validate(&self, conversation_id: &str, body: &str) -> ChatResult<()> {
        if conversation_id.trim().is_empty() {
            return Err(ChatError::invalid_input("conversation id must not be empty"));
        }
        if body.trim().is_empty() {
            return Err(ChatError::invalid_input("message body must not be empty"));
        }
        let length = body.chars().count();
        if length > self.max_message_length {
            return Err(ChatError::invalid_input(format!(
                "message body is {length} characters, the limit is {}",
                self.max_message_length
            )));
        }
        Ok(())
    }
}
