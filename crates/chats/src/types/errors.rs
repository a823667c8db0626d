//! Error types for the chat system.

use buzzhub_database::ConversationError;
use thiserror::Error;
use tracing::error;

/// Result type alias for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("user {user_id} is not a participant of conversation {conversation_id}")]
    NotParticipant {
        conversation_id: String,
        user_id: i64,
    },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// The store could not be reached or failed mid-operation. Callers may retry.
    #[error("store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// A subscriber's delivery channel is gone. Never leaves the registry.
    #[error("delivery channel closed")]
    ChannelClosed,
}

impl ChatError {
    pub fn conversation_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "conversation",
            id: id.into(),
        }
    }

    pub fn user_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "user",
            id: id.to_string(),
        }
    }

    pub fn not_participant(conversation_id: impl Into<String>, user_id: i64) -> Self {
        Self::NotParticipant {
            conversation_id: conversation_id.into(),
            user_id,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Translate a repository error raised while working on `conversation_id`.
    pub(crate) fn from_conversation_error(error: ConversationError, conversation_id: &str) -> Self {
        match error {
            ConversationError::ConversationNotFound => Self::conversation_not_found(conversation_id),
            ConversationError::UserNotFound(user_id) => Self::user_not_found(user_id),
            ConversationError::NotParticipant(user_id) => {
                Self::not_participant(conversation_id, user_id)
            }
            ConversationError::NoParticipants => {
                Self::invalid_input("a conversation needs at least one participant")
            }
            ConversationError::Database(error) => error.into(),
        }
    }
}

impl From<sqlx::Error> for ChatError {
    fn from(error: sqlx::Error) -> Self {
        error!(%error, "conversation store failure");
        Self::store_unavailable(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_errors_keep_their_kind() {
        let error = ChatError::from_conversation_error(ConversationError::ConversationNotFound, "c1");
        assert!(matches!(error, ChatError::NotFound { entity: "conversation", ref id } if id == "c1"));

        let error = ChatError::from_conversation_error(ConversationError::NotParticipant(7), "c1");
        assert!(matches!(
            error,
            ChatError::NotParticipant { user_id: 7, ref conversation_id } if conversation_id == "c1"
        ));

        let error = ChatError::from_conversation_error(
            ConversationError::Database(sqlx::Error::PoolTimedOut),
            "c1",
        );
        assert!(error.is_retryable());
    }
}
