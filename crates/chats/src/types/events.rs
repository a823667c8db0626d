//! Events fanned out to live subscribers.

use buzzhub_database::ChatMessage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    MessageSent,
}

/// Notification that something happened in a conversation. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub conversation_id: String,
    pub kind: DeliveryKind,
    pub message: ChatMessage,
}

impl DeliveryEvent {
    pub fn message_sent(message: ChatMessage) -> Self {
        Self {
            conversation_id: message.conversation_id.clone(),
            kind: DeliveryKind::MessageSent,
            message,
        }
    }
}
