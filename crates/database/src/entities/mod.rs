//! Domain entities for the database layer

pub mod conversation;
pub mod message;
pub mod user;

pub use conversation::{Conversation, CreateConversationRequest};
pub use message::{format_timestamp, ChatMessage};
pub use user::{CreateUserRequest, User};
