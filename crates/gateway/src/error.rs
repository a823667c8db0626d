//! Error types for the gateway layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use buzzhub_auth::AuthError;
use buzzhub_chats::ChatError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status.as_str().to_string(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Client-facing text for store failures; the cause is only logged.
pub const SERVICE_UNAVAILABLE_MESSAGE: &str =
    "the message store is temporarily unavailable, retry later";

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<ChatError> for GatewayError {
    fn from(error: ChatError) -> Self {
        match error {
            ChatError::NotFound { .. } => GatewayError::NotFound(error.to_string()),
            ChatError::NotParticipant { .. } => GatewayError::Forbidden(error.to_string()),
            ChatError::InvalidInput { .. } => GatewayError::InvalidRequest(error.to_string()),
            ChatError::StoreUnavailable { .. } | ChatError::ChannelClosed => {
                error!(%error, "store unavailable");
                GatewayError::ServiceUnavailable(SERVICE_UNAVAILABLE_MESSAGE.to_string())
            }
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::SessionNotFound | AuthError::SessionExpired | AuthError::InvalidSession => {
                GatewayError::AuthenticationFailed(error.to_string())
            }
            AuthError::UserNotFound | AuthError::DevTokensDisabled => {
                GatewayError::NotFound(error.to_string())
            }
            AuthError::InvalidUsername(_) => GatewayError::InvalidRequest(error.to_string()),
            AuthError::UsernameTaken | AuthError::EmailTaken => {
                GatewayError::Conflict(error.to_string())
            }
            AuthError::Database(_) => {
                error!(%error, "auth store failure");
                GatewayError::ServiceUnavailable(SERVICE_UNAVAILABLE_MESSAGE.to_string())
            }
        }
    }
}
