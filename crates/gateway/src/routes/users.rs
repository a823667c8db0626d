use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use buzzhub_database::User;
use serde::{Deserialize, Serialize};

use crate::{util::require_bearer, GatewayError, GatewayState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub public_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub needs_username: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let needs_username = user.needs_username();
        Self {
            id: user.id,
            public_id: user.public_id,
            email: user.email,
            display_name: user.display_name,
            username: user.username,
            needs_username,
        }
    }
}

/// What other users get to see about someone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub public_id: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            public_id: user.public_id,
            username: user.username,
            display_name: user.display_name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SetUsernameRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub username: String,
}

pub async fn current_user(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Result<Json<UserResponse>, GatewayError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    Ok(Json(user.into()))
}

pub async fn set_username(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(request): Json<SetUsernameRequest>,
) -> Result<Json<UserResponse>, GatewayError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let updated = state
        .authenticator
        .set_username(user.id, request.username.trim())
        .await?;

    Ok(Json(updated.into()))
}

/// Users whose username starts with the given prefix, excluding the caller.
pub async fn search_users(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<UserSummary>>, GatewayError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let found = state.authenticator.search_users(&query.username).await?;
    Ok(Json(
        found
            .into_iter()
            .filter(|candidate| candidate.id != user.id)
            .map(UserSummary::from)
            .collect(),
    ))
}
