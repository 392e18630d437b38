//! PostgreSQL pool and schema setup for the report store.

use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::str::FromStr;
use std::time::Duration;

/// Parse `database_url` and tag connections with this crate's name.
fn connect_options(database_url: &str) -> Result<PgConnectOptions> {
    Ok(PgConnectOptions::from_str(database_url)
        .context("Invalid DATABASE_URL")?
        .application_name(env!("CARGO_PKG_NAME")))
}

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let options = connect_options(database_url)?;

    // Attempts hold a connection only for single UPDATEs, never across model calls
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(300))
        .connect_with(options)
        .await
        .context("Failed to connect to PostgreSQL")?;

    tracing::info!(max_connections, "Report store pool established");
    Ok(pool)
}

/// Apply the bundled `roof_reports` migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run report store migrations")?;
    tracing::info!("Report store migrations applied");
    Ok(())
}

pub async fn health_check(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").fetch_one(pool).await.is_ok()
}
