/// Database layer for DocChase
///
/// Manages the Postgres connection pool and migrations, and provides the
/// typed records in [`models`].

pub mod models;

use crate::{
    config::DatabaseConfig,
    error::{ChaseError, ChaseResult},
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{error, info};

/// Create a Postgres connection pool
pub async fn create_pool(config: &DatabaseConfig) -> ChaseResult<PgPool> {
    info!("Connecting to PostgreSQL database...");
    info!("  Max connections: {}", config.max_connections);
    info!("  Min connections: {}", config.min_connections);

    let pool = build_pool_options(config)
        .connect(&config.url)
        .await
        .map_err(|e| {
            error!("Failed to connect to PostgreSQL: {}", e);
            ChaseError::Database(e)
        })?;

    info!("✓ PostgreSQL connection established");

    Ok(pool)
}

/// Create a pool that connects on first use
///
/// Used by router tests that never touch the database.
pub fn create_lazy_pool(config: &DatabaseConfig) -> ChaseResult<PgPool> {
    build_pool_options(config)
        .connect_lazy(&config.url)
        .map_err(ChaseError::Database)
}

fn build_pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout))
        .max_lifetime(Duration::from_secs(1800))
        .idle_timeout(Duration::from_secs(600))
}

/// Run migrations
/// Migrations are embedded at compile time from ./migrations directory
pub async fn run_migrations(pool: &PgPool) -> ChaseResult<()> {
    info!("Running PostgreSQL migrations...");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            error!("Failed to run migrations: {}", e);
            ChaseError::Internal(format!("Migration failed: {}", e))
        })?;

    info!("✓ Migrations completed");

    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &PgPool) -> ChaseResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    #[tokio::test]
    async fn test_lazy_pool_does_not_connect() {
        let config = ServerConfig::for_tests();
        let pool = create_lazy_pool(&config.database).unwrap();
        assert_eq!(pool.size(), 0);
    }
}
