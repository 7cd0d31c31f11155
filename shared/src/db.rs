//! Database connection management.

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::time::Duration;

use crate::secrets::DatabaseCredentials;
use crate::{Config, Error, Result};

/// Create a database connection pool.
pub async fn create_pool(config: &Config, credentials: &DatabaseCredentials) -> Result<PgPool> {
    let options = PgConnectOptions::new()
        .host(&config.db_host)
        .port(credentials.port.unwrap_or(5432))
        .username(&credentials.username)
        .password(&credentials.password)
        .database(&config.db_name);

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(3))
        .connect_with(options)
        .await
        .map_err(Error::Database)?;

    Ok(pool)
}
