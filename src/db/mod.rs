//! Postgres backend: connection pool, migrations, health check.
//!
//! One pool per process, created at startup and shared by every store
//! trait implementation and by the pgmq-backed job queue.

pub mod alchemist;
pub mod audit;
pub mod material;
pub mod mission;
pub mod pgmq;
pub mod transmutation;

use crate::error::{Error, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Database handle. Owns the connection pool.
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Clamp a caller-supplied limit to something Postgres accepts.
pub(crate) fn clamp_limit(limit: i64) -> i64 {
    limit.max(0)
}
