use std::sync::Arc;

use anyhow::{Context, Result};
use buzzhub_auth::Authenticator;
use buzzhub_chats::{
    ConversationStore, DeliveryBus, MessageRouter, SqlConversationStore, SubscriptionRegistry,
};
use buzzhub_config::AppConfig;
use buzzhub_database::initialize_database;
use buzzhub_gateway::GatewayState;
use sqlx::SqlitePool;
use tracing::info;

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::TRACE)
            .with_env_filter(env_filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// The long-lived services behind the gateway, wired from configuration.
#[derive(Clone)]
pub struct BackendServices {
    pub db_pool: SqlitePool,
    pub authenticator: Authenticator,
    pub bus: DeliveryBus,
    pub registry: SubscriptionRegistry,
    pub router: MessageRouter,
}

impl BackendServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database)
            .await
            .context("failed to initialise database")?;

        let authenticator = Authenticator::new(db_pool.clone(), &config.auth);
        let purged = authenticator
            .purge_expired_sessions()
            .await
            .context("failed to purge expired sessions")?;

        let bus = DeliveryBus::new(config.delivery.bus_queue_capacity);
        let registry = SubscriptionRegistry::new(bus.clone());
        let store: Arc<dyn ConversationStore> =
            Arc::new(SqlConversationStore::new(db_pool.clone()));
        let router = MessageRouter::new(store, bus.clone(), config.delivery.max_message_length);

        info!(
            purged_sessions = purged,
            bus_queue_capacity = config.delivery.bus_queue_capacity,
            channel_capacity = config.delivery.channel_capacity,
            dev_tokens = config.auth.dev_tokens,
            "backend services ready"
        );

        Ok(Self {
            db_pool,
            authenticator,
            bus,
            registry,
            router,
        })
    }

    pub fn gateway_state(&self, config: &AppConfig) -> GatewayState {
        GatewayState::new(
            self.db_pool.clone(),
            self.authenticator.clone(),
            self.router.clone(),
            self.registry.clone(),
            config,
        )
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
