use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use buzzhub_database::{Conversation, CreateConversationRequest};

use crate::{util::require_bearer, GatewayError, GatewayState};

pub async fn list_conversations(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Conversation>>, GatewayError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let conversations = state.router.conversations_for(user.id).await?;
    Ok(Json(conversations))
}

/// Start a conversation between the caller and `participant_ids`.
pub async fn create_conversation(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(request): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>), GatewayError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let conversation = state
        .router
        .create_conversation(user.id, &request.participant_ids)
        .await?;

    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn get_conversation(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
) -> Result<Json<Conversation>, GatewayError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let conversation = state
        .router
        .conversation_for(&conversation_id, user.id)
        .await?;
    Ok(Json(conversation))
}
