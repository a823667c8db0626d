use axum::{
    extract::{Query, State},
    Json,
};
use buzzhub_auth::AuthSession;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{routes::users::UserResponse, GatewayError, GatewayState};

#[derive(Debug, Deserialize)]
pub struct DevTokenQuery {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserResponse,
}

impl SessionResponse {
    pub fn new(session: AuthSession, user: impl Into<UserResponse>) -> Self {
        Self {
            token: session.token,
            expires_at: session.expires_at,
            user: user.into(),
        }
    }
}

/// Issue a session for `username` without an identity provider.
pub async fn dev_token(
    State(state): State<GatewayState>,
    Query(query): Query<DevTokenQuery>,
) -> Result<Json<SessionResponse>, GatewayError> {
    let (user, session) = state.authenticator.dev_sign_in(query.username.trim()).await?;
    info!(user_id = user.id, "issued development session");

    Ok(Json(SessionResponse::new(session, user)))
}
