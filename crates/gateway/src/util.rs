use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::error::GatewayError;

pub fn require_bearer(headers: &HeaderMap) -> Result<String, GatewayError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| GatewayError::AuthenticationFailed("missing authorization header".into()))?;

    let mut parts = value.split_whitespace();
    let scheme = parts.next().unwrap_or("");
    if !scheme.eq_ignore_ascii_case("Bearer") {
        return Err(GatewayError::AuthenticationFailed(
            "invalid authorization scheme".into(),
        ));
    }

    let token = parts.next().unwrap_or("");
    if token.is_empty() {
        return Err(GatewayError::AuthenticationFailed(
            "missing bearer token".into(),
        ));
    }

    Ok(token.to_string())
}
