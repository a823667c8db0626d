//! Repository for conversation data access operations.

use crate::entities::{format_timestamp, Conversation};
use crate::types::{ConversationError, ConversationResult};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::info;

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: i64,
    public_id: String,
    created_by: i64,
    created_at: DateTime<Utc>,
}

/// Repository for conversation database operations
#[derive(Clone)]
pub struct ConversationRepository {
    pool: SqlitePool,
}

impl ConversationRepository {
    /// Create a new conversation repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a conversation with a fixed participant list.
    ///
    /// `participant_ids` is stored in the given order; duplicates are ignored.
    pub async fn create(
        &self,
        created_by: i64,
        participant_ids: &[i64],
    ) -> ConversationResult<Conversation> {
        let mut participants: Vec<i64> = Vec::with_capacity(participant_ids.len());
        for id in participant_ids {
            if !participants.contains(id) {
                participants.push(*id);
            }
        }
        if participants.is_empty() {
            return Err(ConversationError::NoParticipants);
        }

        for user_id in participants.iter().copied().chain(std::iter::once(created_by)) {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
            if exists.is_none() {
                return Err(ConversationError::UserNotFound(user_id));
            }
        }

        let public_id = cuid2::create_id();
        let now = Utc::now();
        let stamp = format_timestamp(&now);

        let mut tx = self.pool.begin().await?;

        let db_id = sqlx::query(
            "INSERT INTO conversations (public_id, created_by, created_at) VALUES (?, ?, ?)",
        )
        .bind(&public_id)
        .bind(created_by)
        .bind(&stamp)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for (position, user_id) in participants.iter().enumerate() {
            sqlx::query(
                "INSERT INTO conversation_participants (conversation_id, user_id, position, joined_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(db_id)
            .bind(user_id)
            .bind(position as i64)
            .bind(&stamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            conversation_id = %public_id,
            created_by,
            participants = participants.len(),
            "created conversation"
        );

        Ok(Conversation {
            db_id,
            id: public_id,
            created_by,
            participant_ids: participants,
            created_at: now,
        })
    }

    /// Find a conversation by its public ID
    pub async fn find_by_public_id(&self, public_id: &str) -> ConversationResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(
            "SELECT id, public_id, created_by, created_at FROM conversations WHERE public_id = ?",
        )
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let participant_ids = self.participant_ids(row.id).await?;
        Ok(Some(Self::assemble(row, participant_ids)))
    }

    /// Conversations the user takes part in, newest first.
    pub async fn list_for_user(&self, user_id: i64) -> ConversationResult<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            "SELECT c.id, c.public_id, c.created_by, c.created_at
             FROM conversations c
             JOIN conversation_participants p ON p.conversation_id = c.id
             WHERE p.user_id = ?
             ORDER BY c.created_at DESC, c.id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        self.with_participants(rows).await
    }

    /// Every conversation, oldest first.
    pub async fn list_all(&self) -> ConversationResult<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            "SELECT id, public_id, created_by, created_at FROM conversations ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        self.with_participants(rows).await
    }

    /// Whether `user_id` participates in the conversation with database id `db_id`.
    pub async fn is_participant(&self, db_id: i64, user_id: i64) -> ConversationResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM conversation_participants WHERE conversation_id = ? AND user_id = ?",
        )
        .bind(db_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    async fn participant_ids(&self, db_id: i64) -> ConversationResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM conversation_participants WHERE conversation_id = ? ORDER BY position ASC",
        )
        .bind(db_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn with_participants(
        &self,
        rows: Vec<ConversationRow>,
    ) -> ConversationResult<Vec<Conversation>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; rows.len()].join(", ");
        let query = format!(
            "SELECT conversation_id, user_id FROM conversation_participants
             WHERE conversation_id IN ({placeholders})
             ORDER BY conversation_id ASC, position ASC"
        );
        let mut builder = sqlx::query_as::<_, (i64, i64)>(&query);
        for row in &rows {
            builder = builder.bind(row.id);
        }

        let mut by_conversation: HashMap<i64, Vec<i64>> = HashMap::new();
        for (conversation_id, user_id) in builder.fetch_all(&self.pool).await? {
            by_conversation.entry(conversation_id).or_default().push(user_id);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let participants = by_conversation.remove(&row.id).unwrap_or_default();
                Self::assemble(row, participants)
            })
            .collect())
    }

    fn assemble(row: ConversationRow, participant_ids: Vec<i64>) -> Conversation {
        Conversation {
            db_id: row.id,
            id: row.public_id,
            created_by: row.created_by,
            participant_ids,
            created_at: row.created_at,
        }
    }
}
