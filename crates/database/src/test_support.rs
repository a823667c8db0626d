//! Shared fixtures for repository tests.

use crate::connection::prepare_database;
use crate::migrations::run_migrations;
use buzzhub_config::DatabaseConfig;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// A migrated database in a fresh temporary directory.
///
/// Keep the returned `TempDir` alive for as long as the pool is used.
pub(crate) async fn test_pool() -> (SqlitePool, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let config = DatabaseConfig {
        url: format!("sqlite://{}", db_path.display()),
        max_connections: 4,
    };

    let pool = prepare_database(&config).await.unwrap();
    run_migrations(&pool).await.unwrap();
    (pool, temp_dir)
}
