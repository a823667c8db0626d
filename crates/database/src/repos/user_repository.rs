//! User repository for database operations.

use crate::entities::{format_timestamp, CreateUserRequest, User};
use crate::types::errors::is_unique_violation;
use crate::types::{UserError, UserResult};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

const USER_COLUMNS: &str =
    "id, public_id, email, display_name, username, created_at, updated_at";

/// Repository for user database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Find user by ID
    pub async fn find_by_id(&self, id: i64) -> UserResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Find user by email
    pub async fn find_by_email(&self, email: &str) -> UserResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Find user by exact username
    pub async fn find_by_username(&self, username: &str) -> UserResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Users whose username starts with `prefix`, alphabetically.
    pub async fn search_by_username(&self, prefix: &str, limit: i64) -> UserResult<Vec<User>> {
        let escaped = prefix
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");

        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE username LIKE ? ESCAPE '\\'
             ORDER BY username ASC
             LIMIT ?"
        ))
        .bind(format!("{escaped}%"))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    /// All users, oldest first.
    pub async fn list(&self) -> UserResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    /// Create a new user
    pub async fn create(&self, request: &CreateUserRequest) -> UserResult<User> {
        let public_id = cuid2::create_id();
        let now = Utc::now();
        let stamp = format_timestamp(&now);

        let result = sqlx::query(
            "INSERT INTO users (public_id, email, display_name, username, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&public_id)
        .bind(request.email.as_deref())
        .bind(request.display_name.as_deref())
        .bind(request.username.as_deref())
        .bind(&stamp)
        .bind(&stamp)
        .execute(&self.pool)
        .await;

        let result = match result {
            Ok(result) => result,
            Err(error) if is_unique_violation(&error) => {
                return Err(if request.username.is_some()
                    && self.username_exists(request.username.as_deref()).await?
                {
                    UserError::UsernameTaken
                } else {
                    UserError::EmailAlreadyExists
                });
            }
            Err(error) => return Err(error.into()),
        };

        let id = result.last_insert_rowid();
        info!(user_id = id, public_id = %public_id, "created new user");

        self.find_by_id(id).await?.ok_or(UserError::UserNotFound)
    }

    /// Set the user's username.
    ///
    /// Fails with [`UserError::UsernameTaken`] when another user holds it.
    pub async fn set_username(&self, user_id: i64, username: &str) -> UserResult<User> {
        let now = format_timestamp(&Utc::now());

        let result = sqlx::query("UPDATE users SET username = ?, updated_at = ? WHERE id = ?")
            .bind(username)
            .bind(&now)
            .bind(user_id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(UserError::UserNotFound),
            Ok(_) => {
                info!(user_id, username, "username updated");
                self.find_by_id(user_id).await?.ok_or(UserError::UserNotFound)
            }
            Err(error) if is_unique_violation(&error) => Err(UserError::UsernameTaken),
            Err(error) => Err(error.into()),
        }
    }

    async fn username_exists(&self, username: Option<&str>) -> UserResult<bool> {
        let Some(username) = username else {
            return Ok(false);
        };
        Ok(self.find_by_username(username).await?.is_some())
    }
}
