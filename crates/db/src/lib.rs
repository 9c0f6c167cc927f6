//! Persistence layer for the organizational directory.
//!
//! Owns the `departments` table: sqlx models, the hierarchy repository
//! (row-locking reads, ancestor lookup, bulk descendant rewrite) and the
//! transactional move service.

pub mod config;
pub mod error;
pub mod models;
pub mod movement;
pub mod repositories;

pub use config::DbConfig;
pub use error::{StoreError, StoreResult};
pub use movement::{MoveOutcome, MovementService};

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str, config: &DbConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Verify the database is reachable.
pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
