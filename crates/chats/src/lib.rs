//! # BuzzHub Chats Crate
//!
//! Conversations, messages and their real-time fan-out.
//!
//! ## Architecture
//!
//! - **Store**: [`ConversationStore`] with SQLite and in-memory implementations
//! - **Router**: [`MessageRouter`] persists a message, then publishes it
//! - **Delivery**: [`DeliveryBus`] queues events per handler and
//!   [`SubscriptionRegistry`] pushes them into connection channels
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use buzzhub_chats::{
//!     delivery_channel, DeliveryBus, MemoryConversationStore, MessageRouter,
//!     SubscriptionRegistry,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let bus = DeliveryBus::new(16);
//! let registry = SubscriptionRegistry::new(bus.clone());
//! let router = MessageRouter::new(Arc::new(MemoryConversationStore::new()), bus, 10_000);
//!
//! let conversation = router.create_conversation(1, &[2]).await.unwrap();
//! let (tx, mut rx) = delivery_channel(8);
//! registry.subscribe(&conversation.id, "session-1", &tx);
//!
//! router.send(&conversation.id, 1, "hi").await.unwrap();
//! assert_eq!(rx.recv().await.unwrap().message.body, "hi");
//! # });
//! ```

pub mod delivery;
pub mod services;
pub mod store;
pub mod types;

pub use delivery::{
    delivery_channel, BusToken, DeliveryBus, DeliveryHandler, DeliveryReceiver, DeliverySender,
    DispatchReport, PublishOutcome, SubscriptionHandle, SubscriptionRegistry,
};
pub use services::MessageRouter;
pub use store::{ConversationStore, MemoryConversationStore, SqlConversationStore};
pub use types::{
    ChatError, ChatResult, ConversationId, DeliveryEvent, DeliveryKind, SessionId, UserId,
};

pub use buzzhub_database::{ChatMessage, Conversation};
