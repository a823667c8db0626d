//! Repository for message data access operations.

use crate::entities::{format_timestamp, ChatMessage};
use crate::types::{ConversationError, ConversationResult};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use sqlx::SqlitePool;
use tracing::debug;

/// Repository for message database operations
#[derive(Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    /// Create a new message repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a message to a conversation.
    ///
    /// Checks that the conversation exists and that `sender_id` takes part in
    /// it before writing. Timestamps strictly increase within a
    /// conversation, so `created_at` alone is a usable catch-up cursor.
    pub async fn append(
        &self,
        conversation_public_id: &str,
        sender_id: i64,
        body: &str,
    ) -> ConversationResult<ChatMessage> {
        let conversation_db_id = self.resolve_conversation(conversation_public_id).await?;

        let is_participant: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM conversation_participants WHERE conversation_id = ? AND user_id = ?",
        )
        .bind(conversation_db_id)
        .bind(sender_id)
        .fetch_optional(&self.pool)
        .await?;

        if is_participant.is_none() {
            return Err(ConversationError::NotParticipant(sender_id));
        }

        let public_id = cuid2::create_id();
        let now = Utc::now().trunc_subsecs(6);

        // The INSERT is the first statement, so the transaction holds the
        // write lock before the newest timestamp is read back.
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO messages (public_id, conversation_id, sender_id, body, created_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&public_id)
        .bind(conversation_db_id)
        .bind(sender_id)
        .bind(body)
        .bind(format_timestamp(&now))
        .fetch_one(&mut *tx)
        .await?;

        let latest: Option<String> = sqlx::query_scalar(
            "SELECT MAX(created_at) FROM messages WHERE conversation_id = ? AND id <> ?",
        )
        .bind(conversation_db_id)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let created_at = next_timestamp(latest.as_deref(), now)?;
        if created_at != now {
            sqlx::query("UPDATE messages SET created_at = ? WHERE id = ?")
                .bind(format_timestamp(&created_at))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        debug!(
            message_id = id,
            public_id = %public_id,
            conversation_id = %conversation_public_id,
            sender_id,
            "stored message"
        );

        Ok(ChatMessage {
            id,
            public_id,
            conversation_id: conversation_public_id.to_string(),
            sender_id,
            body: body.to_string(),
            created_at,
        })
    }

    /// Messages of a conversation in store order, optionally only those
    /// created strictly after `after`.
    pub async fn list_by_conversation(
        &self,
        conversation_public_id: &str,
        after: Option<DateTime<Utc>>,
    ) -> ConversationResult<Vec<ChatMessage>> {
        let conversation_db_id = self.resolve_conversation(conversation_public_id).await?;
        let after = after.as_ref().map(format_timestamp);

        let messages = sqlx::query_as::<_, ChatMessage>(
            "SELECT m.id, m.public_id, c.public_id AS conversation_id, m.sender_id, m.body, m.created_at
             FROM messages m
             JOIN conversations c ON c.id = m.conversation_id
             WHERE m.conversation_id = ? AND (? IS NULL OR m.created_at > ?)
             ORDER BY m.created_at ASC, m.id ASC",
        )
        .bind(conversation_db_id)
        .bind(after.as_deref())
        .bind(after.as_deref())
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    /// Number of messages stored for a conversation.
    pub async fn count_by_conversation(&self, conversation_public_id: &str) -> ConversationResult<i64> {
        let conversation_db_id = self.resolve_conversation(conversation_public_id).await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = ?")
            .bind(conversation_db_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn resolve_conversation(&self, public_id: &str) -> ConversationResult<i64> {
        let db_id: Option<i64> = sqlx::query_scalar("SELECT id FROM conversations WHERE public_id = ?")
            .bind(public_id)
            .fetch_optional(&self.pool)
            .await?;

        db_id.ok_or(ConversationError::ConversationNotFound)
    }
}

/// `now`, or one microsecond past `latest` when the clock has not moved on.
fn next_timestamp(
    latest: Option<&str>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, sqlx::Error> {
    let Some(latest) = latest else {
        return Ok(now);
    };
    let latest = DateTime::parse_from_rfc3339(latest)
        .map_err(|error| sqlx::Error::Decode(Box::new(error)))?
        .with_timezone(&Utc);

    if latest >= now {
        Ok(latest + Duration::microseconds(1))
    } else {
        Ok(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::CreateUserRequest;
    use crate::repos::{ConversationRepository, UserRepository};
    use crate::test_support::test_pool;

    async fn setup() -> (MessageRepository, String, i64, i64, tempfile::TempDir) {
        let (pool, dir) = test_pool().await;
        let users = UserRepository::new(pool.clone());
        let alice = users
            .create(&CreateUserRequest {
                email: Some("alice@example.com".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let mallory = users
            .create(&CreateUserRequest {
                email: Some("mallory@example.com".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let conversation = ConversationRepository::new(pool.clone())
            .create(alice.id, &[alice.id])
            .await
            .unwrap();

        (MessageRepository::new(pool), conversation.id, alice.id, mallory.id, dir)
    }

    #[tokio::test]
    async fn append_then_list_in_order() {
        let (repo, conversation, alice, _, _dir) = setup().await;

        let first = repo.append(&conversation, alice, "one").await.unwrap();
        let second = repo.append(&conversation, alice, "two").await.unwrap();
        assert!(second.order_key() > first.order_key());

        let listed = repo.list_by_conversation(&conversation, None).await.unwrap();
        let bodies: Vec<_> = listed.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["one", "two"]);
        assert_eq!(listed[0], first);
    }

    #[tokio::test]
    async fn list_after_excludes_older_messages() {
        let (repo, conversation, alice, _, _dir) = setup().await;

        let first = repo.append(&conversation, alice, "one").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        repo.append(&conversation, alice, "two").await.unwrap();

        let listed = repo
            .list_by_conversation(&conversation, Some(first.created_at))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].body, "two");
    }

    #[test]
    fn next_timestamp_steps_past_an_equal_or_later_latest() {
        let now = Utc::now().trunc_subsecs(6);
        let stamp = format_timestamp(&now);

        assert_eq!(next_timestamp(None, now).unwrap(), now);
        assert_eq!(
            next_timestamp(Some(&stamp), now).unwrap(),
            now + Duration::microseconds(1)
        );

        let earlier = format_timestamp(&(now - Duration::seconds(1)));
        assert_eq!(next_timestamp(Some(&earlier), now).unwrap(), now);

        let later = now + Duration::seconds(5);
        assert_eq!(
            next_timestamp(Some(&format_timestamp(&later)), now).unwrap(),
            later + Duration::microseconds(1)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_get_distinct_increasing_timestamps() {
        let (repo, conversation, alice, _, _dir) = setup().await;

        let mut tasks = Vec::new();
        for n in 0..32 {
            let repo = repo.clone();
            let conversation = conversation.clone();
            tasks.push(tokio::spawn(async move {
                repo.append(&conversation, alice, &format!("m{n}")).await.unwrap()
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let listed = repo.list_by_conversation(&conversation, None).await.unwrap();
        assert_eq!(listed.len(), 32);
        for pair in listed.windows(2) {
            assert!(pair[0].created_at < pair[1].created_at);
            let newer = repo
                .list_by_conversation(&conversation, Some(pair[0].created_at))
                .await
                .unwrap();
            assert_eq!(newer.first(), Some(&pair[1]));
        }
    }

    #[tokio::test]
    async fn append_rejects_outsiders_without_writing() {
        let (repo, conversation, _, mallory, _dir) = setup().await;

        let error = repo.append(&conversation, mallory, "hack").await.unwrap_err();
        assert!(matches!(error, ConversationError::NotParticipant(id) if id == mallory));
        assert_eq!(repo.count_by_conversation(&conversation).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_conversation_is_not_found() {
        let (repo, _, alice, _, _dir) = setup().await;

        let error = repo.append("missing", alice, "hi").await.unwrap_err();
        assert!(matches!(error, ConversationError::ConversationNotFound));

        let error = repo.list_by_conversation("missing", None).await.unwrap_err();
        assert!(matches!(error, ConversationError::ConversationNotFound));
    }
}
