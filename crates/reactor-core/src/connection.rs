use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Executes SQL against the target database.
pub trait ConnectionManager: Send + Sync {
    /// Execute a single statement outside a transaction.
    fn execute<'a>(
        &'a self,
        sql: &'a str,
        timeout: Duration,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<u64>>;

    /// Open a transaction.
    ///
    /// Dropping the returned transaction without committing rolls it back.
    fn begin<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Box<dyn ScriptTransaction>>>;
}

/// An open transaction owned by the engine for one script.
///
/// Statements run to completion once started; cancellation is only observed
/// between scripts.
pub trait ScriptTransaction: Send {
    /// Execute a statement, returning the number of affected rows.
    fn execute<'a>(&'a mut self, sql: &'a str, timeout: Duration) -> BoxFuture<'a, Result<u64>>;

    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<()>>;

    fn rollback(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

/// Creates the target database before discovery when configured.
pub trait DatabaseProvisioner: Send + Sync {
    fn ensure_database_exists<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>>;
}
