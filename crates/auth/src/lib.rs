use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use buzzhub_config::AuthConfig;
use buzzhub_database::{format_timestamp, CreateUserRequest, User, UserError, UserRepository};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::{debug, info};

/// Provider name recorded for identities minted by the development sign-in.
pub const DEV_PROVIDER: &str = "dev";

const USERNAME_MIN_LEN: usize = 3;
const USERNAME_MAX_LEN: usize = 32;
const SEARCH_LIMIT: i64 = 20;
// chrono durations overflow far below u64::MAX seconds.
const MAX_SESSION_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

#[derive(Clone)]
pub struct Authenticator {
    pool: SqlitePool,
    users: UserRepository,
    session_ttl: Duration,
    dev_tokens: bool,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("session not found")]
    SessionNotFound,
    #[error("session expired")]
    SessionExpired,
    #[error("invalid session token")]
    InvalidSession,
    #[error("user not found")]
    UserNotFound,
    #[error("invalid username: {0}")]
    InvalidUsername(String),
    #[error("username already taken")]
    UsernameTaken,
    #[error("email already in use")]
    EmailTaken,
    #[error("development tokens are disabled")]
    DevTokensDisabled,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<UserError> for AuthError {
    fn from(error: UserError) -> Self {
        match error {
            UserError::UserNotFound => AuthError::UserNotFound,
            UserError::UsernameTaken => AuthError::UsernameTaken,
            UserError::EmailAlreadyExists => AuthError::EmailTaken,
            UserError::Database(error) => AuthError::Database(error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

/// Identity asserted by an external provider after a successful sign-in.
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    pub provider: String,
    pub subject: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl Authenticator {
    pub fn new(pool: SqlitePool, config: &AuthConfig) -> Self {
        let ttl_seconds = config.session_ttl_seconds.min(MAX_SESSION_TTL_SECONDS) as i64;
        let session_ttl = Duration::seconds(ttl_seconds);

        Self {
            users: UserRepository::new(pool.clone()),
            pool,
            session_ttl,
            dev_tokens: config.dev_tokens,
        }
    }

    pub fn dev_tokens_enabled(&self) -> bool {
        self.dev_tokens
    }

    /// Resolve a bearer token to its user.
    ///
    /// Expired sessions are deleted on sight.
    pub async fn authenticate_token(&self, token: &str) -> Result<(User, AuthSession), AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidSession);
        }

        let row = sqlx::query("SELECT user_id, expires_at FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Err(AuthError::SessionNotFound);
        };

        let user_id: i64 = row.try_get("user_id")?;
        let expires_at: String = row.try_get("expires_at")?;

        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map_err(|_| AuthError::InvalidSession)?
            .with_timezone(&Utc);

        if expires_at <= Utc::now() {
            sqlx::query("DELETE FROM sessions WHERE token = ?")
                .bind(token)
                .execute(&self.pool)
                .await?;
            debug!(user_id, "removed expired session");
            return Err(AuthError::SessionExpired);
        }

        let user = self.user_profile(user_id).await?;
        let session = AuthSession {
            token: token.to_owned(),
            user_id,
            expires_at,
        };

        Ok((user, session))
    }

    pub async fn user_profile(&self, user_id: i64) -> Result<User, AuthError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Find or create the user behind an external identity.
    ///
    /// A known `(provider, subject)` pair maps to its user. Otherwise a user
    /// with the same email is linked, and failing that a new user is created.
    pub async fn resolve_identity(&self, identity: &ExternalIdentity) -> Result<User, AuthError> {
        let linked: Option<i64> = sqlx::query_scalar(
            "SELECT user_id FROM user_identities WHERE provider = ? AND provider_uid = ?",
        )
        .bind(&identity.provider)
        .bind(&identity.subject)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(user_id) = linked {
            return self.user_profile(user_id).await;
        }

        let existing = match identity.email.as_deref() {
            Some(email) => self.users.find_by_email(email).await?,
            None => None,
        };

        let user = match existing {
            Some(user) => user,
            None => {
                self.users
                    .create(&CreateUserRequest {
                        email: identity.email.clone(),
                        display_name: identity.display_name.clone(),
                        username: None,
                    })
                    .await?
            }
        };

        sqlx::query(
            "INSERT INTO user_identities (user_id, provider, provider_uid, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (provider, provider_uid) DO NOTHING",
        )
        .bind(user.id)
        .bind(&identity.provider)
        .bind(&identity.subject)
        .bind(format_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;

        info!(
            user_id = user.id,
            provider = %identity.provider,
            "linked external identity"
        );

        Ok(user)
    }

    /// Sign in under `username` without an identity provider.
    ///
    /// Only available when `auth.dev_tokens` is enabled.
    pub async fn dev_sign_in(&self, username: &str) -> Result<(User, AuthSession), AuthError> {
        if !self.dev_tokens {
            return Err(AuthError::DevTokensDisabled);
        }
        validate_username(username)?;

        let identity = ExternalIdentity {
            provider: DEV_PROVIDER.to_string(),
            subject: username.to_string(),
            email: None,
            display_name: Some(username.to_string()),
        };

        let mut user = self.resolve_identity(&identity).await?;
        if user.needs_username() {
            user = self.users.set_username(user.id, username).await?;
        }

        let session = self.issue_session(user.id).await?;
        Ok((user, session))
    }

    pub async fn issue_session(&self, user_id: i64) -> Result<AuthSession, AuthError> {
        let token = generate_session_token();
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.session_ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        sqlx::query(
            "INSERT INTO sessions (user_id, token, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(&token)
        .bind(format_timestamp(&now))
        .bind(format_timestamp(&expires_at))
        .execute(&self.pool)
        .await?;

        debug!(user_id, "issued session");

        Ok(AuthSession {
            token,
            user_id,
            expires_at,
        })
    }

    pub async fn revoke_session(&self, token: &str) -> Result<(), AuthError> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete every expired session, returning how many were removed.
    pub async fn purge_expired_sessions(&self) -> Result<u64, AuthError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(format_timestamp(&Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Claim a username for the user.
    pub async fn set_username(&self, user_id: i64, username: &str) -> Result<User, AuthError> {
        validate_username(username)?;
        Ok(self.users.set_username(user_id, username).await?)
    }

    /// Users whose username starts with `prefix`.
    pub async fn search_users(&self, prefix: &str) -> Result<Vec<User>, AuthError> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.users.search_by_username(prefix, SEARCH_LIMIT).await?)
    }
}

/// Usernames are 3 to 32 ASCII letters, digits, `_`, `.` or `-`.
pub fn validate_username(username: &str) -> Result<(), AuthError> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(AuthError::InvalidUsername(format!(
            "must be between {USERNAME_MIN_LEN} and {USERNAME_MAX_LEN} characters"
        )));
    }

    if let Some(bad) = username
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(AuthError::InvalidUsername(format!(
            "character {bad:?} is not allowed"
        )));
    }

    Ok(())
}

fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_follow_the_allowed_alphabet() {
        assert!(validate_username("ada").is_ok());
        assert!(validate_username("ada.lovelace-1_x").is_ok());
        assert!(matches!(
            validate_username("ab"),
            Err(AuthError::InvalidUsername(_))
        ));
        assert!(matches!(
            validate_username(&"a".repeat(33)),
            Err(AuthError::InvalidUsername(_))
        ));
        assert!(matches!(
            validate_username("ada lovelace"),
            Err(AuthError::InvalidUsername(_))
        ));
    }

    #[test]
    fn session_tokens_are_url_safe_and_unique() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
