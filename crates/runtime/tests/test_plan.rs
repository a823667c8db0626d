use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use buzzhub_chats::delivery_channel;
use buzzhub_config::AppConfig;
use buzzhub_database::{CreateUserRequest, UserRepository};
use buzzhub_runtime::{self, BackendServices};
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}", path.to_string_lossy())
}

fn build_config(database_url: String, max_connections: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = database_url;
    config.database.max_connections = max_connections;
    config
}

async fn initialise(config: &AppConfig) -> Result<BackendServices> {
    BackendServices::initialise(config)
        .await
        .context("failed to initialise backend services")
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_runs_migrations() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("runtime/init.db");
    let config = build_config(sqlite_url(&db_path), 4);

    let services = initialise(&config).await?;
    let table: String = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'messages'",
    )
    .fetch_one(&services.db_pool)
    .await?;
    assert_eq!("messages", table);
    assert!(db_path.exists(), "sqlite database file should be created");

    drop(services);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_applies_database_settings() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("runtime/settings.db");
    let max_connections = 3;
    let config = build_config(sqlite_url(&db_path), max_connections);

    let services = initialise(&config).await?;
    assert_eq!(
        max_connections,
        services.db_pool.options().get_max_connections()
    );

    let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
        .fetch_one(&services.db_pool)
        .await?;
    assert_eq!(1, enabled, "foreign key enforcement must be enabled");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_rejects_non_sqlite_urls() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let target_dir = temp_dir.path().join("should_not_exist");
    let url = format!("postgres://{}/ignored.db", target_dir.to_string_lossy());
    let config = build_config(url, 1);

    let error = match BackendServices::initialise(&config).await {
        Ok(_) => panic!("expected initialisation to fail for a non-sqlite URL"),
        Err(error) => error,
    };
    assert!(!target_dir.exists());
    assert!(
        error.to_string().contains("failed to initialise database"),
        "unexpected error: {error:?}"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn services_route_messages_to_registered_connections() -> Result<()> {
    let config = build_config("sqlite::memory:".into(), 1);
    let services = initialise(&config).await?;

    let users = UserRepository::new(services.db_pool.clone());
    let alice = users
        .create(&CreateUserRequest {
            username: Some("alice".into()),
            ..Default::default()
        })
        .await?;

    let conversation = services.router.create_conversation(alice.id, &[]).await?;
    let (tx, mut rx) = delivery_channel(config.delivery.channel_capacity);
    services.registry.subscribe(&conversation.id, "s1", &tx);

    services.router.send(&conversation.id, alice.id, "hi").await?;
    let event = timeout(Duration::from_secs(2), rx.recv())
        .await?
        .context("delivery channel closed")?;
    assert_eq!(event.message.body, "hi");

    let state = services.gateway_state(&config);
    assert_eq!(state.channel_capacity, config.delivery.channel_capacity);
    assert_eq!(state.registry.subscription_count(&conversation.id), 1);
    Ok(())
}

#[test]
fn telemetry_init_tracing_sets_global_subscriber() {
    buzzhub_runtime::telemetry::init_tracing().expect("first initialisation should succeed");

    let second = buzzhub_runtime::telemetry::init_tracing();
    assert!(
        second.is_err(),
        "initialising telemetry twice should fail with global subscriber already set"
    );
}

#[tokio::test(flavor = "multi_thread")]
#[cfg_attr(not(unix), ignore = "requires Unix signal handling")]
async fn shutdown_signal_completes_on_ctrl_c_notification() -> Result<()> {
    let shutdown_task = tokio::spawn(async { buzzhub_runtime::shutdown_signal().await });

    sleep(Duration::from_millis(50)).await;
    #[cfg(unix)]
    unsafe {
        libc::raise(libc::SIGINT);
    }

    timeout(Duration::from_secs(2), shutdown_task).await??;
    Ok(())
}
