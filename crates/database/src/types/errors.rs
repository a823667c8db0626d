//! Error types for the database layer

use thiserror::Error;

/// General database error
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    #[error("Database migration error: {0}")]
    MigrationError(String),
}

/// User-specific database errors
#[derive(Debug, Error)]
pub enum UserError {
    #[error("User not found")]
    UserNotFound,

    #[error("Username already taken")]
    UsernameTaken,

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Conversation and message database errors
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("Conversation not found")]
    ConversationNotFound,

    #[error("User {0} not found")]
    UserNotFound(i64),

    #[error("User {0} is not a participant")]
    NotParticipant(i64),

    #[error("Conversation needs at least one participant")]
    NoParticipants,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Whether a sqlx error is a unique constraint violation.
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}
