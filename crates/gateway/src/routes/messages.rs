use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use buzzhub_database::ChatMessage;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{util::require_bearer, GatewayError, GatewayState};

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    /// Only messages created strictly after this instant.
    pub after: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub body: String,
}

pub async fn list_messages(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<ChatMessage>>, GatewayError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let messages = state
        .router
        .history(&conversation_id, user.id, query.after)
        .await?;
    Ok(Json(messages))
}

/// Persist a message and fan it out to the conversation's live subscribers.
pub async fn send_message(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessage>), GatewayError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let message = state
        .router
        .send(&conversation_id, user.id, &request.body)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}
