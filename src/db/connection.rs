use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::config::EngineConfig;
use crate::errors::Result;

/// Build the database connection pool.
///
/// The pool is handed to the store constructors explicitly; there is no
/// process-wide pool.
pub async fn create_pool(config: &EngineConfig) -> Result<PgPool> {
    info!("initializing database connection pool");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .idle_timeout(Duration::from_secs(10))
        // Test connection on checkout to ensure it's still valid
        .test_before_acquire(true)
        .connect_lazy(&config.database_url)?;

    // Fail fast on an unreachable database.
    sqlx::query("SELECT 1").fetch_one(&pool).await?;

    info!("database connection pool initialized");
    Ok(pool)
}

/// Health check for the database connection.
pub async fn health_check(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await?;
    Ok(())
}
