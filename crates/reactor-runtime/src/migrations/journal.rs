use futures::future::BoxFuture;
use sqlx::{PgPool, Row};
use tokio_util::sync::CancellationToken;

use reactor_core::config::validate_table_name;
use reactor_core::error::{ReactorError, Result};
use reactor_core::journal::{check_cancelled, MigrationJournal, MigrationJournalEntry};
use reactor_core::script::Migration;

use crate::db::table_exists;

/// Migration journal stored in a table of the migrated database.
pub struct PgMigrationJournal {
    pool: PgPool,
    table: String,
}

impl PgMigrationJournal {
    /// Create a journal over `table`, which must be a plain or schema-qualified
    /// identifier.
    pub fn new(pool: PgPool, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_table_name("migration journal table", &table)?;
        Ok(Self { pool, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl MigrationJournal for PgMigrationJournal {
    fn ensure_table_exists<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id BIGSERIAL PRIMARY KEY,
                    upgrade_script_hash VARCHAR(64) UNIQUE NOT NULL,
                    migration_name VARCHAR(255) NOT NULL,
                    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    success BOOLEAN NOT NULL DEFAULT TRUE
                )
                "#,
                self.table
            ))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                ReactorError::Journal(format!("Failed to create migration journal: {}", e))
            })?;
            Ok(())
        })
    }

    fn table_exists<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            table_exists(&self.pool, &self.table).await.map_err(|e| {
                ReactorError::Journal(format!("Failed to inspect migration journal: {}", e))
            })
        })
    }

    fn executed_migrations<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Vec<MigrationJournalEntry>>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            let rows = sqlx::query(&format!(
                r#"
                SELECT upgrade_script_hash, migration_name, applied_at, success
                FROM {}
                ORDER BY id ASC
                "#,
                self.table
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ReactorError::Journal(format!("Failed to read migration journal: {}", e)))?;

            rows.iter()
                .map(|row| {
                    Ok(MigrationJournalEntry {
                        upgrade_script_hash: row.try_get("upgrade_script_hash")?,
                        migration_name: row.try_get("migration_name")?,
                        applied_at: row.try_get("applied_at")?,
                        success: row.try_get("success")?,
                    })
                })
                .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
                .map_err(|e| ReactorError::Journal(format!("Malformed journal row: {}", e)))
        })
    }

    fn has_been_executed<'a>(
        &'a self,
        migration: &'a Migration,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            let count = sqlx::query_scalar::<_, i64>(&format!(
                "SELECT COUNT(*) FROM {} WHERE upgrade_script_hash = $1",
                self.table
            ))
            .bind(&migration.content_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ReactorError::Journal(format!("Failed to check migration: {}", e)))?;

            Ok(count > 0)
        })
    }

    fn store_executed_migration<'a>(
        &'a self,
        migration: &'a Migration,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            let entry = MigrationJournalEntry::applied(migration);
            sqlx::query(&format!(
                r#"
                INSERT INTO {} (upgrade_script_hash, migration_name, applied_at, success)
                VALUES ($1, $2, $3, $4)
                "#,
                self.table
            ))
            .bind(&entry.upgrade_script_hash)
            .bind(&entry.migration_name)
            .bind(entry.applied_at)
            .bind(entry.success)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                ReactorError::Journal(format!(
                    "Failed to record migration {}: {}",
                    migration.name, e
                ))
            })?;
            Ok(())
        })
    }

    fn remove_executed_migration<'a>(
        &'a self,
        upgrade_script_hash: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            sqlx::query(&format!(
                "DELETE FROM {} WHERE upgrade_script_hash = $1",
                self.table
            ))
            .bind(upgrade_script_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                ReactorError::Journal(format!("Failed to remove migration record: {}", e))
            })?;
            Ok(())
        })
    }
}
