//! Postgres persistence for arrangements.
//!
//! Pool construction, migrations, the [`models::arrangement::Arrangement`]
//! row type, and the zero-sized [`repositories::ArrangementRepo`].

use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

pub mod models;
pub mod repositories;

pub type DbPool = sqlx::PgPool;

/// Postgres NOTIFY channel written by the `arrangements` change trigger.
pub const CHANGE_CHANNEL: &str = "arrangement_changes";

/// Create a connection pool from a database URL.
///
/// `application_name` is recorded on every connection; the change trigger
/// copies it into each notification as the `origin` of the write.
pub async fn create_pool(database_url: &str, application_name: &str) -> Result<DbPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(database_url)?.application_name(application_name);
    PgPoolOptions::new()
        .max_connections(20)
        .connect_with(options)
        .await
}

/// Round-trip a trivial query to confirm the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply all pending migrations from `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
