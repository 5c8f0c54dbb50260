use std::str::FromStr;

use futures::future::BoxFuture;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use reactor_core::connection::DatabaseProvisioner;
use reactor_core::error::{ReactorError, Result};
use reactor_core::journal::check_cancelled;

/// Database used to issue `CREATE DATABASE`.
const MAINTENANCE_DATABASE: &str = "postgres";

/// Creates the target PostgreSQL database when it does not exist.
pub struct PgProvisioner {
    options: PgConnectOptions,
    database: String,
}

impl PgProvisioner {
    pub fn from_url(url: &str) -> Result<Self> {
        let options = PgConnectOptions::from_str(url)
            .map_err(|e| ReactorError::Config(format!("Invalid database url: {}", e)))?;
        let database = options
            .get_database()
            .map(str::to_string)
            .ok_or_else(|| ReactorError::Config("Database url names no database".into()))?;
        Ok(Self { options, database })
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}

impl DatabaseProvisioner for PgProvisioner {
    fn ensure_database_exists<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            let maintenance = self.options.clone().database(MAINTENANCE_DATABASE);
            let mut conn = PgConnection::connect_with(&maintenance).await.map_err(|e| {
                ReactorError::Database(format!("Failed to connect for provisioning: {}", e))
            })?;

            let exists: Option<i32> =
                sqlx::query_scalar("SELECT 1 FROM pg_database WHERE datname = $1")
                    .bind(&self.database)
                    .fetch_optional(&mut conn)
                    .await?;

            if exists.is_some() {
                debug!("Database {} already exists", self.database);
            } else {
                check_cancelled(cancel)?;
                info!("Creating database {}", self.database);
                sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&self.database)))
                    .execute(&mut conn)
                    .await
                    .map_err(|e| {
                        ReactorError::Database(format!(
                            "Failed to create database {}: {}",
                            self.database, e
                        ))
                    })?;
            }

            conn.close().await.ok();
            Ok(())
        })
    }
}

/// Quote an identifier for interpolation into DDL.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
