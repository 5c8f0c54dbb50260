//! Mock connection manager for testing script execution.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::connection::{ConnectionManager, ScriptTransaction};
use crate::error::{ReactorError, Result};
use crate::journal::check_cancelled;

#[derive(Debug, Default)]
struct MockState {
    committed: Vec<String>,
    begins: usize,
    rollbacks: usize,
    fail_patterns: Vec<String>,
    cancel_triggers: Vec<(String, CancellationToken)>,
}

impl MockState {
    fn check(&self, sql: &str) -> Result<()> {
        match self.fail_patterns.iter().find(|p| sql.contains(p.as_str())) {
            Some(pattern) => Err(ReactorError::Database(format!(
                "mock failure on statement matching '{}'",
                pattern
            ))),
            None => Ok(()),
        }
    }

    fn fire_triggers(&self, sql: &str) {
        for (pattern, token) in &self.cancel_triggers {
            if sql.contains(pattern.as_str()) {
                token.cancel();
            }
        }
    }
}

/// In-memory connection that records statements instead of running them.
///
/// Statements executed inside a transaction become visible in
/// [`MockConnection::committed`] only once the transaction commits.
#[derive(Debug, Clone, Default)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every statement containing `pattern` fail.
    pub fn fail_on(&self, pattern: impl Into<String>) {
        self.state.lock().unwrap().fail_patterns.push(pattern.into());
    }

    /// Cancel `token` while a statement containing `pattern` executes.
    ///
    /// The statement itself still succeeds, which models a cancellation
    /// arriving in the middle of a script.
    pub fn cancel_on(&self, pattern: impl Into<String>, token: CancellationToken) {
        self.state
            .lock()
            .unwrap()
            .cancel_triggers
            .push((pattern.into(), token));
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().fail_patterns.clear();
    }

    /// Committed statements in execution order.
    pub fn committed(&self) -> Vec<String> {
        self.state.lock().unwrap().committed.clone()
    }

    pub fn transactions_started(&self) -> usize {
        self.state.lock().unwrap().begins
    }

    pub fn rollbacks(&self) -> usize {
        self.state.lock().unwrap().rollbacks
    }

    /// Assert that a statement containing `fragment` was committed.
    pub fn assert_committed(&self, fragment: &str) {
        let committed = self.committed();
        assert!(
            committed.iter().any(|s| s.contains(fragment)),
            "Expected a committed statement containing '{}', got {:?}",
            fragment,
            committed
        );
    }
}

impl ConnectionManager for MockConnection {
    fn execute<'a>(
        &'a self,
        sql: &'a str,
        _timeout: Duration,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            let mut state = self.state.lock().unwrap();
            state.check(sql)?;
            state.fire_triggers(sql);
            state.committed.push(sql.to_string());
            Ok(1)
        })
    }

    fn begin<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Box<dyn ScriptTransaction>>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            self.state.lock().unwrap().begins += 1;
            let tx: Box<dyn ScriptTransaction> = Box::new(MockTransaction {
                state: self.state.clone(),
                pending: Vec::new(),
                finished: false,
            });
            Ok(tx)
        })
    }
}

struct MockTransaction {
    state: Arc<Mutex<MockState>>,
    pending: Vec<String>,
    finished: bool,
}

impl ScriptTransaction for MockTransaction {
    fn execute<'a>(&'a mut self, sql: &'a str, _timeout: Duration) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            {
                let state = self.state.lock().unwrap();
                state.check(sql)?;
                state.fire_triggers(sql);
            }
            self.pending.push(sql.to_string());
            Ok(1)
        })
    }

    fn commit(mut self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            self.finished = true;
            let pending = std::mem::take(&mut self.pending);
            self.state.lock().unwrap().committed.extend(pending);
            Ok(())
        })
    }

    fn rollback(mut self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            self.finished = true;
            self.pending.clear();
            self.state.lock().unwrap().rollbacks += 1;
            Ok(())
        })
    }
}

impl Drop for MockTransaction {
    fn drop(&mut self) {
        if !self.finished {
            if let Ok(mut state) = self.state.lock() {
                state.rollbacks += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_publishes_statements() {
        let conn = MockConnection::new();
        let cancel = CancellationToken::new();

        let mut tx = conn.begin(&cancel).await.unwrap();
        tx.execute("CREATE TABLE a (id INT)", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(conn.committed().is_empty());

        tx.commit().await.unwrap();
        conn.assert_committed("CREATE TABLE a");
        assert_eq!(conn.transactions_started(), 1);
    }

    #[tokio::test]
    async fn test_failure_and_rollback() {
        let conn = MockConnection::new();
        conn.fail_on("BROKEN");
        let cancel = CancellationToken::new();

        let mut tx = conn.begin(&cancel).await.unwrap();
        tx.execute("SELECT 1", Duration::from_secs(1)).await.unwrap();
        let err = tx
            .execute("BROKEN STATEMENT", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ReactorError::Database(_)));

        tx.rollback().await.unwrap();
        assert!(conn.committed().is_empty());
        assert_eq!(conn.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_counts_as_rollback() {
        let conn = MockConnection::new();
        let cancel = CancellationToken::new();
        {
            let mut tx = conn.begin(&cancel).await.unwrap();
            tx.execute("SELECT 1", Duration::from_secs(1)).await.unwrap();
        }
        assert_eq!(conn.rollbacks(), 1);
        assert!(conn.committed().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_on_fires_mid_transaction() {
        let conn = MockConnection::new();
        let run = CancellationToken::new();
        conn.cancel_on("SLOW", run.clone());

        let mut tx = conn.begin(&CancellationToken::new()).await.unwrap();
        tx.execute("SELECT 1", Duration::from_secs(1)).await.unwrap();
        assert!(!run.is_cancelled());
        tx.execute("SLOW UPDATE", Duration::from_secs(1)).await.unwrap();
        assert!(run.is_cancelled());

        tx.commit().await.unwrap();
        conn.assert_committed("SLOW UPDATE");
    }

    #[tokio::test]
    async fn test_begin_observes_cancellation() {
        let conn = MockConnection::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            conn.begin(&cancel).await,
            Err(ReactorError::Cancelled)
        ));
    }
}
