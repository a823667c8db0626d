//! User entity definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A person who can take part in conversations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub public_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// Chosen after the first sign-in; unique when present.
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request for creating a new user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub username: Option<String>,
}

impl User {
    /// Name to show in clients, preferring the username.
    pub fn label(&self) -> &str {
        self.username
            .as_deref()
            .or(self.display_name.as_deref())
            .or(self.email.as_deref())
            .unwrap_or(&self.public_id)
    }

    /// Whether the user still has to pick a username.
    pub fn needs_username(&self) -> bool {
        self.username.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: 1,
            public_id: "u1".to_string(),
            email: Some("ada@example.com".to_string()),
            display_name: Some("Ada".to_string()),
            username: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn label_falls_back_in_order() {
        let mut user = user();
        assert_eq!(user.label(), "Ada");

        user.username = Some("ada".to_string());
        assert_eq!(user.label(), "ada");

        user.username = None;
        user.display_name = None;
        assert_eq!(user.label(), "ada@example.com");

        user.email = None;
        assert_eq!(user.label(), "u1");
    }

    #[test]
    fn needs_username_until_one_is_set() {
        let mut user = user();
        assert!(user.needs_username());
        user.username = Some("ada".to_string());
        assert!(!user.needs_username());
    }
}
