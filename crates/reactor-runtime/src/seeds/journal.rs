use futures::future::BoxFuture;
use sqlx::{PgPool, Row};
use tokio_util::sync::CancellationToken;

use reactor_core::config::validate_table_name;
use reactor_core::error::{ReactorError, Result};
use reactor_core::journal::{check_cancelled, SeedJournal, SeedJournalEntry};
use reactor_core::script::SeedStrategy;

use crate::db::table_exists;

/// Seed journal stored in a table of the seeded database.
///
/// `run_always` rows accumulate; other strategies keep one row per seed.
pub struct PgSeedJournal {
    pool: PgPool,
    table: String,
}

impl PgSeedJournal {
    pub fn new(pool: PgPool, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_table_name("seed journal table", &table)?;
        Ok(Self { pool, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

fn journal_error(action: &str, e: sqlx::Error) -> ReactorError {
    ReactorError::Journal(format!("Failed to {} seed journal: {}", action, e))
}

impl SeedJournal for PgSeedJournal {
    fn ensure_table_exists<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id BIGSERIAL PRIMARY KEY,
                    seed_name VARCHAR(255) NOT NULL,
                    content_hash VARCHAR(64) NOT NULL,
                    strategy VARCHAR(32) NOT NULL,
                    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "#,
                self.table
            ))
            .execute(&self.pool)
            .await
            .map_err(|e| journal_error("create", e))?;
            Ok(())
        })
    }

    fn table_exists<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            table_exists(&self.pool, &self.table)
                .await
                .map_err(|e| journal_error("inspect", e))
        })
    }

    fn executed_seeds<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Vec<SeedJournalEntry>>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            let rows = sqlx::query(&format!(
                r#"
                SELECT seed_name, content_hash, strategy, applied_at
                FROM {}
                ORDER BY id ASC
                "#,
                self.table
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| journal_error("read", e))?;

            let mut entries = Vec::with_capacity(rows.len());
            for row in rows {
                let strategy: String = row.try_get("strategy").map_err(|e| journal_error("decode", e))?;
                entries.push(SeedJournalEntry {
                    seed_name: row.try_get("seed_name").map_err(|e| journal_error("decode", e))?,
                    content_hash: row
                        .try_get("content_hash")
                        .map_err(|e| journal_error("decode", e))?,
                    strategy: strategy.parse()?,
                    applied_at: row.try_get("applied_at").map_err(|e| journal_error("decode", e))?,
                });
            }
            Ok(entries)
        })
    }

    fn store_executed_seed<'a>(
        &'a self,
        entry: &'a SeedJournalEntry,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            let mut tx = self.pool.begin().await.map_err(|e| journal_error("update", e))?;

            if entry.strategy != SeedStrategy::RunAlways {
                sqlx::query(&format!("DELETE FROM {} WHERE seed_name = $1", self.table))
                    .bind(&entry.seed_name)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| journal_error("update", e))?;
            }

            sqlx::query(&format!(
                r#"
                INSERT INTO {} (seed_name, content_hash, strategy, applied_at)
                VALUES ($1, $2, $3, $4)
                "#,
                self.table
            ))
            .bind(&entry.seed_name)
            .bind(&entry.content_hash)
            .bind(entry.strategy.as_str())
            .bind(entry.applied_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| journal_error("update", e))?;

            tx.commit().await.map_err(|e| journal_error("update", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn test_rejects_unsafe_table_name() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        assert!(PgSeedJournal::new(pool.clone(), "seeds--").is_err());
        assert_eq!(
            PgSeedJournal::new(pool, "reactor_seeds").unwrap().table(),
            "reactor_seeds"
        );
    }
}
