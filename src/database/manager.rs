use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use tracing::info;

/// Errors from DatabaseManager and the metadata repository
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Corrupt metadata row: {0}")]
    CorruptRow(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Owns the Postgres pool that backs project and schema metadata
#[derive(Clone)]
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        connection_timeout: Duration,
    ) -> Result<Self, DatabaseError> {
        let url = url::Url::parse(database_url).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(DatabaseError::InvalidDatabaseUrl);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connection_timeout)
            .connect(database_url)
            .await?;

        info!(
            "Connected metadata database at {}{}",
            url.host_str().unwrap_or("localhost"),
            url.path()
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed metadata database pool");
    }
}
