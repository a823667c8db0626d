//! HTTP and WebSocket surface of the BuzzHub backend.

mod error;
mod protocol;
mod state;
mod util;

pub mod routes;

pub use error::{ErrorResponse, GatewayError, GatewayResult};
pub use protocol::{ClientEvent, ServerEvent};
pub use state::GatewayState;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

pub fn build_router(state: GatewayState) -> Router {
    let mut router: Router<GatewayState> =
        Router::new().route("/health", get(routes::health::health_check));

    if state.dev_tokens() {
        router = router.route("/api/auth/dev/token", get(routes::auth::dev_token));
    }

    let cors = cors_layer(&state.cors_origins);

    router
        .route("/api/me", get(routes::users::current_user))
        .route("/api/me/username", put(routes::users::set_username))
        .route("/api/users/search", get(routes::users::search_users))
        // Conversation routes
        .route(
            "/api/conversations",
            get(routes::conversations::list_conversations)
                .post(routes::conversations::create_conversation),
        )
        .route(
            "/api/conversations/:conversation_id",
            get(routes::conversations::get_conversation),
        )
        .route(
            "/api/conversations/:conversation_id/messages",
            get(routes::messages::list_messages).post(routes::messages::send_message),
        )
        // WebSocket route
        .route("/ws", get(routes::websocket::websocket_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// An empty origin list allows any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(allowed))
}
