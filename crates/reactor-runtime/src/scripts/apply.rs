use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use reactor_core::connection::ConnectionManager;
use reactor_core::error::{ReactorError, Result};

use super::split::split_statements;

/// Run one script inside its own transaction.
///
/// Every statement runs in the same transaction. On any failure the
/// transaction is rolled back and the error is reported against `name`.
pub async fn execute_in_transaction(
    connection: &dyn ConnectionManager,
    name: &str,
    sql: &str,
    timeout: Duration,
) -> Result<()> {
    // Once a script starts it runs to commit or rollback; cancellation is
    // checked by callers between scripts.
    let unit = CancellationToken::new();

    let statements = split_statements(sql);
    debug!("Executing {} ({} statements)", name, statements.len());

    let mut tx = connection
        .begin(&unit)
        .await
        .map_err(|e| ReactorError::execution_failed(name, e))?;

    for statement in &statements {
        if let Err(e) = tx.execute(statement, timeout).await {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Failed to roll back {}: {}", name, rollback_err);
            }
            return Err(ReactorError::execution_failed(name, e));
        }
    }

    tx.commit()
        .await
        .map_err(|e| ReactorError::execution_failed(name, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reactor_core::testing::MockConnection;

    #[tokio::test]
    async fn test_commits_all_statements() {
        let conn = MockConnection::new();
        execute_in_transaction(
            &conn,
            "0001_init",
            "CREATE TABLE a (id INT); CREATE TABLE b (id INT);",
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(
            conn.committed(),
            vec!["CREATE TABLE a (id INT)", "CREATE TABLE b (id INT)"]
        );
        assert_eq!(conn.rollbacks(), 0);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_whole_script() {
        let conn = MockConnection::new();
        conn.fail_on("CREATE TABLE b");

        let err = execute_in_transaction(
            &conn,
            "0001_init",
            "CREATE TABLE a (id INT); CREATE TABLE b (id INT);",
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

        match err {
            ReactorError::MigrationExecutionFailed { script, cause } => {
                assert_eq!(script, "0001_init");
                assert!(cause.contains("mock failure"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(conn.committed().is_empty());
        assert_eq!(conn.rollbacks(), 1);
    }
}
