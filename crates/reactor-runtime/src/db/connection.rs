use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::{PgPool, Postgres, Transaction};
use tokio_util::sync::CancellationToken;

use reactor_core::connection::{ConnectionManager, ScriptTransaction};
use reactor_core::error::{ReactorError, Result};
use reactor_core::journal::check_cancelled;

/// PostgreSQL connection manager backed by a sqlx pool.
#[derive(Clone)]
pub struct PgConnectionManager {
    pool: PgPool,
}

impl PgConnectionManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl ConnectionManager for PgConnectionManager {
    fn execute<'a>(
        &'a self,
        sql: &'a str,
        timeout: Duration,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            let done = with_timeout(timeout, sqlx::query(sql).execute(&self.pool)).await?;
            Ok(done.rows_affected())
        })
    }

    fn begin<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Box<dyn ScriptTransaction>>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            let tx = self.pool.begin().await.map_err(|e| {
                ReactorError::Database(format!("Failed to start transaction: {}", e))
            })?;
            let tx: Box<dyn ScriptTransaction> = Box::new(PgScriptTransaction { tx });
            Ok(tx)
        })
    }
}

/// Open sqlx transaction. Dropping it uncommitted rolls back.
struct PgScriptTransaction {
    tx: Transaction<'static, Postgres>,
}

impl ScriptTransaction for PgScriptTransaction {
    fn execute<'a>(&'a mut self, sql: &'a str, timeout: Duration) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let done = with_timeout(timeout, sqlx::query(sql).execute(&mut *self.tx)).await?;
            Ok(done.rows_affected())
        })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        let PgScriptTransaction { tx } = *self;
        Box::pin(async move {
            tx.commit()
                .await
                .map_err(|e| ReactorError::Database(format!("Failed to commit: {}", e)))
        })
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        let PgScriptTransaction { tx } = *self;
        Box::pin(async move {
            tx.rollback()
                .await
                .map_err(|e| ReactorError::Database(format!("Failed to roll back: {}", e)))
        })
    }
}

async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(ReactorError::Sql),
        Err(_) => Err(ReactorError::Timeout(format!(
            "statement exceeded {}s",
            timeout.as_secs()
        ))),
    }
}
