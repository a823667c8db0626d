//! BuzzHub Database Crate
//!
//! Connection management, migrations and repositories for users,
//! conversations and messages on SQLite.

use buzzhub_config::DatabaseConfig;
use sqlx::SqlitePool;

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repos;
pub mod types;

#[cfg(test)]
mod test_support;

pub use connection::prepare_database;
pub use migrations::run_migrations;

pub use repos::{ConversationRepository, MessageRepository, UserRepository};

pub use entities::{
    format_timestamp, ChatMessage, Conversation, CreateConversationRequest, CreateUserRequest,
    User,
};

pub use types::{
    ConversationError, ConversationResult, DatabaseError, DatabaseResult, UserError, UserResult,
};

/// Connect and bring the schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .map_err(|e| DatabaseError::ConnectionError(format!("{e:#}")))?;

    run_migrations(&pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("{e:#}")))?;

    Ok(pool)
}
