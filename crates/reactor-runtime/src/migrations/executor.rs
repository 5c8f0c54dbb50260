//! Migration execution.
//!
//! Migrations are discovered from every provider, rendered, sorted by name and
//! applied one at a time. Each migration runs in its own transaction and is
//! journaled only after it commits. The first failure stops the run; whatever
//! committed before it stays applied and journaled.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use reactor_core::connection::ConnectionManager;
use reactor_core::error::{ReactorError, Result};
use reactor_core::journal::{check_cancelled, MigrationJournal, MigrationJournalEntry};
use reactor_core::provider::{DowngradeResolver, ScriptProvider};
use reactor_core::result::{
    AppliedMigration, Direction, DowngradeMode, DryRunBuilder, DryRunResult, MigrationStatus,
    RunProgress, RunResult,
};
use reactor_core::script::{order_sources, Migration};
use reactor_core::variables::Variables;

use crate::scripts::execute_in_transaction;

/// A reverted migration, resolved and rendered before anything executes.
struct DowngradeStep {
    name: String,
    upgrade_script_hash: String,
    sql: String,
}

/// Applies and reverts migrations.
pub struct MigrationExecutor {
    connection: Arc<dyn ConnectionManager>,
    journal: Arc<dyn MigrationJournal>,
    providers: Vec<Arc<dyn ScriptProvider>>,
    downgrade_resolver: Option<Arc<dyn DowngradeResolver>>,
    variables: Variables,
    timeout: Duration,
}

impl MigrationExecutor {
    /// Create a new migration executor.
    pub fn new(
        connection: Arc<dyn ConnectionManager>,
        journal: Arc<dyn MigrationJournal>,
        variables: Variables,
        timeout: Duration,
    ) -> Self {
        Self {
            connection,
            journal,
            providers: Vec::new(),
            downgrade_resolver: None,
            variables,
            timeout,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn ScriptProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_downgrade_resolver(mut self, resolver: Arc<dyn DowngradeResolver>) -> Self {
        self.downgrade_resolver = Some(resolver);
        self
    }

    pub fn supports_downgrades(&self) -> bool {
        self.downgrade_resolver.is_some()
    }

    /// Discover, render and sort every migration.
    ///
    /// Rendering failures (e.g. a missing required variable) surface here,
    /// before any script executes.
    pub async fn discover(&self) -> Result<Vec<Migration>> {
        self.render_all()
            .await?
            .into_iter()
            .map(|(_, migration)| migration)
            .collect()
    }

    /// Apply all pending migrations.
    pub async fn upgrade(&self, cancel: &CancellationToken) -> RunResult {
        let rendered = match self.prepare_upgrade(cancel).await {
            Ok(rendered) => rendered,
            Err(e) => {
                error!("Migration run aborted: {}", e);
                return RunResult::aborted(e);
            }
        };

        let mut progress = RunProgress::start();

        for (name, migration) in rendered {
            if cancel.is_cancelled() {
                warn!("Cancelled before applying {}", name);
                return progress.fail(ReactorError::Cancelled, None);
            }

            let migration = match migration {
                Ok(migration) => migration,
                Err(e) => {
                    error!("Migration {} could not be generated: {}", name, e);
                    return progress.fail(e, Some(name));
                }
            };

            match self.journal.has_been_executed(&migration, cancel).await {
                Ok(true) => {
                    debug!("Skipping already applied migration {}", name);
                    progress.skipped(&name);
                    continue;
                }
                Ok(false) => {}
                Err(e) => return progress.fail(e, None),
            }

            info!("Applying migration: {}", name);
            if let Err(e) = execute_in_transaction(
                self.connection.as_ref(),
                &name,
                &migration.upgrade_sql,
                self.timeout,
            )
            .await
            {
                error!("Migration {} failed: {}", name, e);
                return progress.fail(e, Some(name));
            }

            // The script committed; the journal write belongs to the same unit.
            let unit = CancellationToken::new();
            if let Err(e) = self.journal.store_executed_migration(&migration, &unit).await {
                error!("Migration {} committed but could not be journaled: {}", name, e);
                return progress.fail(e, Some(name));
            }

            info!("Migration applied: {}", name);
            progress.applied(&name);
        }

        progress.finish()
    }

    /// Predict what [`upgrade`](Self::upgrade) would do without executing
    /// scripts or writing to the journal.
    ///
    /// The journal is read but never created, so a fresh database stays
    /// untouched and every migration shows as pending.
    pub async fn preview_upgrade(&self, cancel: &CancellationToken) -> Result<DryRunResult> {
        check_cancelled(cancel)?;
        let migrations = self.discover().await?;
        let journal = self.read_journal(cancel).await?;
        let applied = applied_hashes(&journal);

        let mut preview = DryRunBuilder::new();
        for migration in &migrations {
            if applied.contains(migration.content_hash.as_str()) {
                preview.skipped(&migration.name);
            } else {
                preview.pending(&migration.name, Direction::Upgrade);
            }
        }
        Ok(preview.build())
    }

    /// Revert the last or all applied migrations, newest first.
    pub async fn downgrade(&self, mode: DowngradeMode, cancel: &CancellationToken) -> RunResult {
        let steps = match self.prepare_downgrade(mode, cancel).await {
            Ok(steps) => steps,
            Err(e) => {
                error!("Downgrade aborted: {}", e);
                return RunResult::aborted(e);
            }
        };

        let mut progress = RunProgress::start();

        for step in &steps {
            if cancel.is_cancelled() {
                warn!("Cancelled before reverting {}", step.name);
                return progress.fail(ReactorError::Cancelled, None);
            }

            info!("Reverting migration: {}", step.name);
            if let Err(e) =
                execute_in_transaction(self.connection.as_ref(), &step.name, &step.sql, self.timeout)
                    .await
            {
                error!("Downgrade of {} failed: {}", step.name, e);
                return progress.fail(e, Some(step.name.clone()));
            }

            let unit = CancellationToken::new();
            if let Err(e) = self
                .journal
                .remove_executed_migration(&step.upgrade_script_hash, &unit)
                .await
            {
                error!(
                    "Migration {} reverted but journal entry remains: {}",
                    step.name, e
                );
                return progress.fail(e, Some(step.name.clone()));
            }

            info!("Migration reverted: {}", step.name);
            progress.applied(&step.name);
        }

        progress.finish()
    }

    /// Predict what [`downgrade`](Self::downgrade) would do.
    pub async fn preview_downgrade(
        &self,
        mode: DowngradeMode,
        cancel: &CancellationToken,
    ) -> Result<DryRunResult> {
        let resolver = self.resolver()?;
        check_cancelled(cancel)?;
        let migrations = self.discover().await?;
        let entries = self.read_journal(cancel).await?;
        let steps = self.plan_downgrade(resolver, mode, &migrations, &entries)?;
        let reverted: HashSet<&str> = steps.iter().map(|s| s.name.as_str()).collect();

        let mut preview = DryRunBuilder::new();
        for step in &steps {
            preview.pending(&step.name, Direction::Downgrade(mode));
        }
        for migration in &migrations {
            if !reverted.contains(migration.name.as_str()) {
                preview.skipped(&migration.name);
            }
        }
        Ok(preview.build())
    }

    /// Applied and pending migrations. Read-only, like the previews.
    pub async fn status(&self, cancel: &CancellationToken) -> Result<MigrationStatus> {
        check_cancelled(cancel)?;
        let migrations = self.discover().await?;
        let entries = self.read_journal(cancel).await?;

        let by_hash: HashMap<&str, &Migration> = migrations
            .iter()
            .map(|m| (m.content_hash.as_str(), m))
            .collect();

        let applied = entries
            .iter()
            .map(|entry| {
                let migration = by_hash.get(entry.upgrade_script_hash.as_str());
                AppliedMigration {
                    name: entry.migration_name.clone(),
                    applied_at: entry.applied_at,
                    has_down: match (migration, &self.downgrade_resolver) {
                        (Some(m), Some(resolver)) => resolver.resolve(m).is_some(),
                        _ => false,
                    },
                    discovered: migration.is_some(),
                }
            })
            .collect();

        let applied_hashes = applied_hashes(&entries);
        let pending = migrations
            .iter()
            .filter(|m| !applied_hashes.contains(m.content_hash.as_str()))
            .map(|m| m.name.clone())
            .collect();

        Ok(MigrationStatus { applied, pending })
    }

    /// Render every source in name order.
    ///
    /// Validation failures abort the whole run. Any other generator failure
    /// is kept next to its name and raised when that migration's turn comes,
    /// so the migrations before it still apply.
    async fn render_all(&self) -> Result<Vec<(String, Result<Migration>)>> {
        let mut sources = Vec::new();
        for provider in &self.providers {
            sources.extend(provider.discover().await?);
        }

        let mut rendered = Vec::new();
        for source in order_sources(sources, "migration")? {
            match Migration::prepare(&source, &self.variables) {
                Err(e) if e.is_eager() => return Err(e),
                migration => rendered.push((source.name, migration)),
            }
        }

        reject_shared_content(rendered.iter().filter_map(|(_, m)| m.as_ref().ok()))?;
        Ok(rendered)
    }

    /// Render everything, then make sure the journal exists.
    async fn prepare_upgrade(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<(String, Result<Migration>)>> {
        check_cancelled(cancel)?;
        let rendered = self.render_all().await?;
        debug!("Discovered {} migrations", rendered.len());
        self.journal.ensure_table_exists(cancel).await?;
        Ok(rendered)
    }

    async fn prepare_downgrade(
        &self,
        mode: DowngradeMode,
        cancel: &CancellationToken,
    ) -> Result<Vec<DowngradeStep>> {
        let resolver = self.resolver()?;
        check_cancelled(cancel)?;
        let migrations = self.discover().await?;
        self.journal.ensure_table_exists(cancel).await?;
        let entries = self.journal.executed_migrations(cancel).await?;
        self.plan_downgrade(resolver, mode, &migrations, &entries)
    }

    fn resolver(&self) -> Result<&Arc<dyn DowngradeResolver>> {
        self.downgrade_resolver.as_ref().ok_or_else(|| {
            ReactorError::Config(
                "Downgrades requested but no downgrade resolver is configured".into(),
            )
        })
    }

    /// Journal entries, or none when the journal was never created.
    async fn read_journal(&self, cancel: &CancellationToken) -> Result<Vec<MigrationJournalEntry>> {
        if self.journal.table_exists(cancel).await? {
            self.journal.executed_migrations(cancel).await
        } else {
            debug!("Migration journal does not exist yet");
            Ok(Vec::new())
        }
    }

    /// Resolve and render every downgrade the mode targets.
    ///
    /// Any target without a downgrade script fails the whole plan, so nothing
    /// is reverted when one of them cannot be.
    fn plan_downgrade(
        &self,
        resolver: &Arc<dyn DowngradeResolver>,
        mode: DowngradeMode,
        migrations: &[Migration],
        entries: &[MigrationJournalEntry],
    ) -> Result<Vec<DowngradeStep>> {
        let targets: Vec<_> = match mode {
            DowngradeMode::Last => entries.last().into_iter().collect(),
            DowngradeMode::All => entries.iter().rev().collect(),
        };

        let by_hash: HashMap<&str, &Migration> = migrations
            .iter()
            .map(|m| (m.content_hash.as_str(), m))
            .collect();

        let mut steps = Vec::with_capacity(targets.len());
        for entry in targets {
            let migration = by_hash
                .get(entry.upgrade_script_hash.as_str())
                .ok_or_else(|| ReactorError::DowngradeUnsupported(entry.migration_name.clone()))?;
            let script = resolver
                .resolve(migration)
                .ok_or_else(|| ReactorError::DowngradeUnsupported(migration.name.clone()))?;
            let rendered = script.render(&migration.name, &self.variables)?;
            steps.push(DowngradeStep {
                name: migration.name.clone(),
                upgrade_script_hash: entry.upgrade_script_hash.clone(),
                sql: rendered.sql,
            });
        }

        Ok(steps)
    }
}

fn applied_hashes(entries: &[MigrationJournalEntry]) -> HashSet<&str> {
    entries
        .iter()
        .map(|e| e.upgrade_script_hash.as_str())
        .collect()
}

/// Two migrations with the same upgrade content would share one journal
/// entry, so the second could never apply.
fn reject_shared_content<'a>(migrations: impl Iterator<Item = &'a Migration>) -> Result<()> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for migration in migrations {
        if let Some(first) = seen.insert(&migration.content_hash, &migration.name) {
            return Err(ReactorError::Validation(format!(
                "Migrations '{}' and '{}' have identical upgrade content",
                first, migration.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reactor_core::provider::{PairedDowngradeResolver, StaticScriptProvider};
    use reactor_core::script::{Script, ScriptSource};
    use reactor_core::testing::{MemoryMigrationJournal, MockConnection};

    struct Harness {
        connection: MockConnection,
        journal: Arc<MemoryMigrationJournal>,
        provider: Arc<StaticScriptProvider>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                connection: MockConnection::new(),
                journal: Arc::new(MemoryMigrationJournal::new()),
                provider: Arc::new(StaticScriptProvider::new()),
            }
        }

        fn reversible(self) -> (Self, MigrationExecutor) {
            let executor = self
                .executor()
                .with_downgrade_resolver(Arc::new(PairedDowngradeResolver));
            (self, executor)
        }

        fn executor(&self) -> MigrationExecutor {
            MigrationExecutor::new(
                Arc::new(self.connection.clone()),
                self.journal.clone(),
                Variables::new([("Schema", "app")]),
                Duration::from_secs(5),
            )
            .with_provider(self.provider.clone())
        }

        fn add(&self, name: &str, sql: &str) {
            self.provider.push(ScriptSource::text(name, sql));
        }

        fn add_reversible(&self, name: &str, up: &str, down: &str) {
            self.provider
                .push(ScriptSource::text(name, up).with_downgrade(Script::text(down)));
        }
    }

    #[tokio::test]
    async fn test_upgrade_applies_in_name_order() {
        let h = Harness::new();
        h.add("0003_c", "CREATE TABLE c (id INT)");
        h.add("0001_a", "CREATE TABLE ${Schema}.a (id INT)");
        h.add("0002_b", "CREATE TABLE b (id INT)");

        let result = h.executor().upgrade(&CancellationToken::new()).await;

        assert!(result.successful, "{:?}", result.error);
        assert_eq!(result.applied_scripts, vec!["0001_a", "0002_b", "0003_c"]);
        assert_eq!(h.journal.names(), vec!["0001_a", "0002_b", "0003_c"]);
        assert_eq!(h.connection.committed()[0], "CREATE TABLE app.a (id INT)");
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let h = Harness::new();
        h.add("0001_a", "CREATE TABLE a (id INT)");
        h.add("0002_b", "CREATE TABLE b (id INT)");
        let executor = h.executor();
        let cancel = CancellationToken::new();

        assert!(executor.upgrade(&cancel).await.successful);
        let writes = h.journal.writes();
        let statements = h.connection.committed().len();

        let second = executor.upgrade(&cancel).await;
        assert!(second.successful);
        assert!(second.applied_scripts.is_empty());
        assert_eq!(second.skipped_scripts, vec!["0001_a", "0002_b"]);
        assert_eq!(h.journal.writes(), writes);
        assert_eq!(h.connection.committed().len(), statements);
    }

    #[tokio::test]
    async fn test_changed_content_becomes_pending_again() {
        let h = Harness::new();
        h.add("0001_a", "CREATE TABLE a (id INT)");
        h.add("0002_b", "CREATE TABLE b (id INT)");
        let executor = h.executor();
        let cancel = CancellationToken::new();
        assert!(executor.upgrade(&cancel).await.successful);

        h.provider
            .replace(ScriptSource::text("0002_b", "CREATE TABLE b (id BIGINT)"));

        let preview = executor.preview_upgrade(&cancel).await.unwrap();
        assert_eq!(preview.pending_names(), vec!["0002_b"]);
        assert_eq!(preview.skipped, vec!["0001_a"]);

        let result = executor.upgrade(&cancel).await;
        assert_eq!(result.applied_scripts, vec!["0002_b"]);
        assert_eq!(h.journal.len(), 3);
    }

    #[tokio::test]
    async fn test_failure_stops_the_run() {
        let h = Harness::new();
        h.add("0001_a", "CREATE TABLE a (id INT)");
        h.add("0002_b", "CREATE TABLE b (id INT)");
        h.add("0003_c", "CREATE TABLE c (id INT); BROKEN");
        h.add("0004_d", "CREATE TABLE d (id INT)");
        h.add("0005_e", "CREATE TABLE e (id INT)");
        h.connection.fail_on("BROKEN");

        let result = h.executor().upgrade(&CancellationToken::new()).await;

        assert!(!result.successful);
        assert_eq!(result.applied_scripts, vec!["0001_a", "0002_b"]);
        assert_eq!(result.failed_script.as_deref(), Some("0003_c"));
        assert!(result.error_message().unwrap().contains("0003_c"));
        assert_eq!(h.journal.names(), vec!["0001_a", "0002_b"]);
        assert_eq!(h.connection.rollbacks(), 1);
        assert!(!h.connection.committed().iter().any(|s| s.contains("TABLE c")));
        assert!(!h.connection.committed().iter().any(|s| s.contains("TABLE d")));
    }

    #[tokio::test]
    async fn test_journal_failure_fails_the_run() {
        let h = Harness::new();
        h.add("0001_a", "CREATE TABLE a (id INT)");
        h.add("0002_b", "CREATE TABLE b (id INT)");
        h.journal.fail_writes(true);

        let result = h.executor().upgrade(&CancellationToken::new()).await;

        assert!(!result.successful);
        assert!(matches!(result.error, Some(ReactorError::Journal(_))));
        assert_eq!(result.failed_script.as_deref(), Some("0001_a"));
        assert!(h.journal.is_empty());
    }

    #[tokio::test]
    async fn test_render_failure_executes_nothing() {
        let h = Harness::new();
        h.add("0001_a", "CREATE TABLE a (id INT)");
        h.provider.push(ScriptSource::new(
            "0002_b",
            Script::code(|vars| Ok(format!("SELECT {}", vars.require_int("Missing")?))),
        ));

        let result = h.executor().upgrade(&CancellationToken::new()).await;

        assert!(!result.successful);
        assert_eq!(h.connection.transactions_started(), 0);
        assert!(h.journal.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_between_scripts() {
        let h = Harness::new();
        h.add("0001_a", "CREATE TABLE a (id INT)");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = h.executor().upgrade(&cancel).await;

        assert!(!result.successful);
        assert!(matches!(result.error, Some(ReactorError::Cancelled)));
        assert!(h.journal.is_empty());
    }

    #[tokio::test]
    async fn test_generator_error_fails_at_its_turn() {
        let h = Harness::new();
        h.add("0001_a", "CREATE TABLE a (id INT)");
        h.add("0002_b", "CREATE TABLE b (id INT)");
        h.provider.push(ScriptSource::new(
            "0003_c",
            Script::code(|_| Err(ReactorError::Database("tenant lookup failed".into()))),
        ));
        h.add("0004_d", "CREATE TABLE d (id INT)");
        h.add("0005_e", "CREATE TABLE e (id INT)");

        let result = h.executor().upgrade(&CancellationToken::new()).await;

        assert!(!result.successful);
        assert_eq!(result.applied_scripts, vec!["0001_a", "0002_b"]);
        assert_eq!(result.failed_script.as_deref(), Some("0003_c"));
        assert!(matches!(
            result.error,
            Some(ReactorError::MigrationExecutionFailed { ref script, .. }) if script == "0003_c"
        ));
        assert_eq!(h.journal.names(), vec!["0001_a", "0002_b"]);
        assert_eq!(h.connection.transactions_started(), 2);
    }

    #[tokio::test]
    async fn test_identical_content_is_rejected() {
        let h = Harness::new();
        h.add("0001_a", "UPDATE t SET x = 1");
        h.add("0002_b", "UPDATE t SET x = 1");
        let executor = h.executor();
        let cancel = CancellationToken::new();

        let err = executor.preview_upgrade(&cancel).await.unwrap_err();
        assert!(matches!(err, ReactorError::Validation(_)));
        assert!(err.to_string().contains("0002_b"));

        let result = executor.upgrade(&cancel).await;
        assert!(!result.successful);
        assert!(result.applied_scripts.is_empty());
        assert_eq!(h.connection.transactions_started(), 0);
        assert!(h.journal.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_script_finishes_that_script_only() {
        let h = Harness::new();
        h.add("0001_a", "CREATE TABLE a (id INT)");
        h.add("0002_b", "CREATE TABLE b (id INT)");
        h.add("0003_c", "CREATE TABLE c (id INT)");
        let cancel = CancellationToken::new();
        h.connection.cancel_on("TABLE a", cancel.clone());

        let result = h.executor().upgrade(&cancel).await;

        assert!(!result.successful);
        assert!(matches!(result.error, Some(ReactorError::Cancelled)));
        assert_eq!(result.applied_scripts, vec!["0001_a"]);
        assert_eq!(h.journal.names(), vec!["0001_a"]);
        assert_eq!(h.connection.transactions_started(), 1);
        assert_eq!(h.connection.committed(), vec!["CREATE TABLE a (id INT)"]);
    }

    #[tokio::test]
    async fn test_preview_and_status_do_not_create_journal() {
        let (h, executor) = Harness::new().reversible();
        h.add_reversible("0001_a", "CREATE TABLE a (id INT)", "DROP TABLE a");
        let cancel = CancellationToken::new();

        let preview = executor.preview_upgrade(&cancel).await.unwrap();
        assert_eq!(preview.pending_names(), vec!["0001_a"]);

        let status = executor.status(&cancel).await.unwrap();
        assert!(status.applied.is_empty());
        assert_eq!(status.pending, vec!["0001_a"]);

        let downgrade = executor
            .preview_downgrade(DowngradeMode::All, &cancel)
            .await
            .unwrap();
        assert_eq!(downgrade.pending_migrations, 0);

        assert!(!h.journal.table_created());
        assert_eq!(h.connection.transactions_started(), 0);
    }

    #[tokio::test]
    async fn test_preview_matches_next_run() {
        let h = Harness::new();
        h.add("0001_a", "CREATE TABLE a (id INT)");
        let executor = h.executor();
        let cancel = CancellationToken::new();
        assert!(executor.upgrade(&cancel).await.successful);

        h.add("0003_c", "CREATE TABLE c (id INT)");
        h.add("0002_b", "CREATE TABLE b (id INT)");

        let preview = executor.preview_upgrade(&cancel).await.unwrap();
        assert_eq!(preview.total_migrations, 3);
        assert_eq!(
            preview.pending_migrations + preview.skipped_migrations,
            preview.total_migrations
        );
        assert_eq!(
            preview.pending_upgrades + preview.pending_downgrades,
            preview.pending_migrations
        );
        assert_eq!(h.journal.len(), 1);

        let result = executor.upgrade(&cancel).await;
        assert_eq!(result.applied_scripts, preview.pending_names());
    }

    #[tokio::test]
    async fn test_downgrade_last_reverts_newest() {
        let (h, executor) = Harness::new().reversible();
        h.add_reversible("0001_a", "CREATE TABLE a (id INT)", "DROP TABLE a");
        h.add_reversible("0002_b", "CREATE TABLE b (id INT)", "DROP TABLE b");
        let cancel = CancellationToken::new();
        assert!(executor.upgrade(&cancel).await.successful);

        let result = executor.downgrade(DowngradeMode::Last, &cancel).await;

        assert!(result.successful, "{:?}", result.error);
        assert_eq!(result.applied_scripts, vec!["0002_b"]);
        assert_eq!(h.journal.names(), vec!["0001_a"]);
        h.connection.assert_committed("DROP TABLE b");
    }

    #[tokio::test]
    async fn test_downgrade_all_reverts_in_reverse_order() {
        let (h, executor) = Harness::new().reversible();
        h.add_reversible("0001_a", "CREATE TABLE a (id INT)", "DROP TABLE a");
        h.add_reversible("0002_b", "CREATE TABLE b (id INT)", "DROP TABLE b");
        h.add_reversible("0003_c", "CREATE TABLE c (id INT)", "DROP TABLE c");
        let cancel = CancellationToken::new();
        assert!(executor.upgrade(&cancel).await.successful);

        let preview = executor
            .preview_downgrade(DowngradeMode::All, &cancel)
            .await
            .unwrap();
        assert_eq!(preview.pending_names(), vec!["0003_c", "0002_b", "0001_a"]);
        assert_eq!(preview.pending_downgrades, 3);
        assert_eq!(preview.pending_upgrades, 0);

        let result = executor.downgrade(DowngradeMode::All, &cancel).await;
        assert_eq!(result.applied_scripts, preview.pending_names());
        assert!(h.journal.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_downgrade_changes_nothing() {
        let (h, executor) = Harness::new().reversible();
        h.add("0001_a", "CREATE TABLE a (id INT)");
        h.add_reversible("0002_b", "CREATE TABLE b (id INT)", "DROP TABLE b");
        let cancel = CancellationToken::new();
        assert!(executor.upgrade(&cancel).await.successful);
        let statements = h.connection.committed().len();

        let result = executor.downgrade(DowngradeMode::All, &cancel).await;

        assert!(!result.successful);
        assert!(matches!(
            result.error,
            Some(ReactorError::DowngradeUnsupported(ref name)) if name == "0001_a"
        ));
        assert_eq!(h.journal.names(), vec!["0001_a", "0002_b"]);
        assert_eq!(h.connection.committed().len(), statements);
    }

    #[tokio::test]
    async fn test_downgrade_without_resolver_is_rejected() {
        let h = Harness::new();
        h.add_reversible("0001_a", "CREATE TABLE a (id INT)", "DROP TABLE a");
        let executor = h.executor();
        let cancel = CancellationToken::new();
        assert!(executor.upgrade(&cancel).await.successful);

        let result = executor.downgrade(DowngradeMode::Last, &cancel).await;
        assert!(matches!(result.error, Some(ReactorError::Config(_))));
        assert_eq!(h.journal.len(), 1);
    }

    #[tokio::test]
    async fn test_status_reports_applied_and_pending() {
        let (h, executor) = Harness::new().reversible();
        h.add_reversible("0001_a", "CREATE TABLE a (id INT)", "DROP TABLE a");
        let cancel = CancellationToken::new();
        assert!(executor.upgrade(&cancel).await.successful);
        h.add("0002_b", "CREATE TABLE b (id INT)");

        let status = executor.status(&cancel).await.unwrap();
        assert_eq!(status.applied.len(), 1);
        assert!(status.applied[0].has_down);
        assert!(status.applied[0].discovered);
        assert_eq!(status.pending, vec!["0002_b"]);
    }
}
