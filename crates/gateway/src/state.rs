//! Shared application state for the gateway

use buzzhub_auth::{AuthSession, Authenticator};
use buzzhub_chats::{MessageRouter, SubscriptionRegistry};
use buzzhub_config::AppConfig;
use buzzhub_database::User;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::error::GatewayResult;

/// Everything a request handler needs. Cheap to clone.
#[derive(Clone)]
pub struct GatewayState {
    pub pool: SqlitePool,
    pub authenticator: Authenticator,
    pub router: MessageRouter,
    pub registry: SubscriptionRegistry,
    /// Per-connection delivery channel capacity.
    pub channel_capacity: usize,
    pub cors_origins: Arc<Vec<String>>,
}

impl GatewayState {
    pub fn new(
        pool: SqlitePool,
        authenticator: Authenticator,
        router: MessageRouter,
        registry: SubscriptionRegistry,
        config: &AppConfig,
    ) -> Self {
        Self {
            pool,
            authenticator,
            router,
            registry,
            channel_capacity: config.delivery.channel_capacity,
            cors_origins: Arc::new(config.http.cors_origins.clone()),
        }
    }

    pub fn dev_tokens(&self) -> bool {
        self.authenticator.dev_tokens_enabled()
    }

    pub async fn authenticate(&self, token: &str) -> GatewayResult<(User, AuthSession)> {
        Ok(self.authenticator.authenticate_token(token).await?)
    }
}
