//! Business logic services for the chat system.

pub mod router;

pub use router::MessageRouter;
