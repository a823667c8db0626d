//! JSON frames exchanged over `/ws`.

use buzzhub_chats::{ChatMessage, DeliveryEvent, DeliveryKind};
use serde::{Deserialize, Serialize};

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Heartbeat to keep connection alive
    Ping,
    Subscribe {
        conversation_id: String,
    },
    Unsubscribe {
        conversation_id: String,
    },
    SendMessage {
        conversation_id: String,
        body: String,
    },
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Hello {
        user_id: i64,
        session_id: String,
    },
    Pong,
    Subscribed {
        conversation_id: String,
    },
    Unsubscribed {
        conversation_id: String,
    },
    MessageSent {
        conversation_id: String,
        message: ChatMessage,
    },
    Error {
        message: String,
    },
}

impl From<DeliveryEvent> for ServerEvent {
    fn from(event: DeliveryEvent) -> Self {
        match event.kind {
            DeliveryKind::MessageSent => ServerEvent::MessageSent {
                conversation_id: event.conversation_id,
                message: event.message,
            },
        }
    }
}
