use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use reactor_core::config::DatabaseConfig;
use reactor_core::error::{ReactorError, Result};

/// Database connection wrapper providing connection pooling.
#[derive(Clone)]
pub struct Database {
    pool: Arc<PgPool>,

    config: DatabaseConfig,
}

impl Database {
    /// Connect to the target database from configuration.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self::pool_options(config)
            .connect(&config.url)
            .await
            .map_err(|e| ReactorError::Database(format!("Failed to connect: {}", e)))?;

        Ok(Self {
            pool: Arc::new(pool),
            config: config.clone(),
        })
    }

    /// Create a pool that connects on first use.
    ///
    /// Used when the database may not exist yet and a provisioner will create
    /// it before the first query.
    pub fn lazy(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self::pool_options(config)
            .connect_lazy(&config.url)
            .map_err(|e| ReactorError::Config(format!("Invalid database url: {}", e)))?;

        Ok(Self {
            pool: Arc::new(pool),
            config: config.clone(),
        })
    }

    fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.pool_timeout_secs))
    }

    /// Get the pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Close all connections gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// SQLSTATE raised when connecting to a database that does not exist.
const INVALID_CATALOG_NAME: &str = "3D000";

/// Whether `table` exists, without creating anything.
///
/// A database that does not exist yet has no tables, so the connection
/// failure for it reads as `false`.
pub async fn table_exists(pool: &PgPool, table: &str) -> std::result::Result<bool, sqlx::Error> {
    let exists = sqlx::query_scalar::<_, bool>("SELECT to_regclass($1) IS NOT NULL")
        .bind(table)
        .fetch_one(pool)
        .await;

    match exists {
        Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(INVALID_CATALOG_NAME) => {
            Ok(false)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lazy_pool_does_not_connect() {
        let config = DatabaseConfig {
            url: "postgres://nobody@127.0.0.1:1/missing".to_string(),
            pool_size: 1,
            ..Default::default()
        };

        let db = Database::lazy(&config).unwrap();
        assert_eq!(db.config().pool_size, 1);
        assert_eq!(db.pool().size(), 0);
    }

    #[tokio::test]
    async fn test_lazy_pool_rejects_bad_url() {
        let config = DatabaseConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            Database::lazy(&config),
            Err(ReactorError::Config(_))
        ));
    }
}
