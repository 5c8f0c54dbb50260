//! Reactor - migration and seed execution engine
//!
//! Applies versioned schema migrations and data seeds to a database, keeping
//! a journal in the same database so that every run is safe to repeat.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use reactor_core::config::ReactorConfig;
use reactor_core::connection::{ConnectionManager, DatabaseProvisioner};
use reactor_core::error::{ReactorError, Result};
use reactor_core::journal::{MigrationJournal, SeedJournal};
use reactor_core::provider::{
    DowngradeResolver, PairedDowngradeResolver, ScriptProvider, StaticScriptProvider,
};
use reactor_core::result::{
    DowngradeMode, DryRunResult, MigrationStatus, RunResult, SeedPreview,
};
use reactor_core::script::{ScriptSource, SeedStrategy};
use reactor_core::variables::Variables;
use reactor_runtime::db::{Database, PgConnectionManager, PgProvisioner};
use reactor_runtime::migrations::{MigrationExecutor, PgMigrationJournal};
use reactor_runtime::scripts::DirectoryScriptProvider;
use reactor_runtime::seeds::{PgSeedJournal, SeedExecutor, StrategyChain, StrategyResolver};

/// Prelude module for common imports.
pub mod prelude {
    pub use chrono::{DateTime, Utc};

    pub use reactor_core::config::ReactorConfig;
    pub use reactor_core::error::{ReactorError, Result};
    pub use reactor_core::result::{
        DowngradeMode, DryRunResult, ExecutionReason, MigrationStatus, RunResult, SeedPreview,
    };
    pub use reactor_core::script::{Script, ScriptSource, SeedStrategy};
    pub use reactor_core::variables::Variables;
    pub use reactor_core::CancellationToken;

    pub use crate::{Reactor, ReactorBuilder};
}

/// Default upper bound for a single statement.
const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(300);

/// Migration and seed engine.
pub struct Reactor {
    migrations: MigrationExecutor,
    seeds: Option<SeedExecutor>,
    provisioner: Option<Arc<dyn DatabaseProvisioner>>,
    provisioned: OnceCell<()>,
    database: Option<Database>,
}

impl Reactor {
    /// Create a new builder for configuring the engine.
    pub fn builder() -> ReactorBuilder {
        ReactorBuilder::new()
    }

    /// Apply all pending migrations.
    pub async fn run(&self, cancel: &CancellationToken) -> RunResult {
        if let Err(e) = self.provision(cancel).await {
            return RunResult::aborted(e);
        }
        let result = self.migrations.upgrade(cancel).await;
        log_outcome("Migrations", &result);
        result
    }

    /// Classify migrations as pending or skipped without changing anything.
    ///
    /// Previews never provision: against a database that does not exist yet,
    /// everything reads as pending.
    pub async fn run_preview(&self, cancel: &CancellationToken) -> Result<DryRunResult> {
        self.migrations.preview_upgrade(cancel).await
    }

    /// Revert applied migrations.
    pub async fn downgrade(&self, mode: DowngradeMode, cancel: &CancellationToken) -> RunResult {
        if let Err(e) = self.provision(cancel).await {
            return RunResult::aborted(e);
        }
        let result = self.migrations.downgrade(mode, cancel).await;
        log_outcome("Downgrade", &result);
        result
    }

    pub async fn preview_downgrade(
        &self,
        mode: DowngradeMode,
        cancel: &CancellationToken,
    ) -> Result<DryRunResult> {
        self.migrations.preview_downgrade(mode, cancel).await
    }

    /// Applied and pending migrations.
    pub async fn status(&self, cancel: &CancellationToken) -> Result<MigrationStatus> {
        self.migrations.status(cancel).await
    }

    /// Run seeds according to their strategies.
    ///
    /// Without seed providers this succeeds without doing anything.
    pub async fn execute_seeds(&self, cancel: &CancellationToken) -> RunResult {
        let Some(seeds) = &self.seeds else {
            return RunResult::succeeded(Vec::new(), Vec::new(), 0);
        };
        if let Err(e) = self.provision(cancel).await {
            return RunResult::aborted(e);
        }
        let result = seeds.execute(cancel).await;
        log_outcome("Seeds", &result);
        result
    }

    pub async fn preview_seeds(&self, cancel: &CancellationToken) -> Result<SeedPreview> {
        let Some(seeds) = &self.seeds else {
            return Ok(SeedPreview::default());
        };
        seeds.preview(cancel).await
    }

    pub fn supports_downgrades(&self) -> bool {
        self.migrations.supports_downgrades()
    }

    /// Close the connection pool, if the engine owns one.
    pub async fn close(&self) {
        if let Some(db) = &self.database {
            db.close().await;
        }
    }

    /// Create the database once, before the first discovery.
    async fn provision(&self, cancel: &CancellationToken) -> Result<()> {
        let Some(provisioner) = &self.provisioner else {
            return Ok(());
        };
        self.provisioned
            .get_or_try_init(|| provisioner.ensure_database_exists(cancel))
            .await
            .map(|_| ())
    }
}

fn log_outcome(what: &str, result: &RunResult) {
    match &result.error {
        None => info!(
            "{} complete: {} applied, {} skipped in {}ms",
            what,
            result.applied_scripts.len(),
            result.skipped_scripts.len(),
            result.execution_time_ms
        ),
        Some(e) => warn!(
            "{} stopped after {} applied: {}",
            what,
            result.applied_scripts.len(),
            e
        ),
    }
}

/// Builder for configuring the engine.
pub struct ReactorBuilder {
    connection: Option<Arc<dyn ConnectionManager>>,
    migration_journal: Option<Arc<dyn MigrationJournal>>,
    seed_journal: Option<Arc<dyn SeedJournal>>,
    migration_providers: Vec<Arc<dyn ScriptProvider>>,
    seed_providers: Vec<Arc<dyn ScriptProvider>>,
    inline_migrations: StaticScriptProvider,
    inline_seeds: StaticScriptProvider,
    downgrade_resolver: Option<Arc<dyn DowngradeResolver>>,
    provisioner: Option<Arc<dyn DatabaseProvisioner>>,
    variables: Variables,
    strategies: StrategyChain,
    script_timeout: Duration,
    database: Option<Database>,
}

impl ReactorBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            connection: None,
            migration_journal: None,
            seed_journal: None,
            migration_providers: Vec::new(),
            seed_providers: Vec::new(),
            inline_migrations: StaticScriptProvider::new(),
            inline_seeds: StaticScriptProvider::new(),
            downgrade_resolver: None,
            provisioner: None,
            variables: Variables::default(),
            strategies: StrategyChain::default(),
            script_timeout: DEFAULT_SCRIPT_TIMEOUT,
            database: None,
        }
    }

    /// Wire a PostgreSQL engine from configuration.
    ///
    /// The pool connects lazily so that a configured provisioner can create
    /// the database first. Further providers and scripts may still be added.
    pub fn from_config(config: &ReactorConfig) -> Result<Self> {
        config.validate()?;

        let database = Database::lazy(&config.database)?;
        let pool = database.pool().clone();

        let mut builder = Self::new()
            .connection(Arc::new(PgConnectionManager::new(pool.clone())))
            .migration_journal(Arc::new(PgMigrationJournal::new(
                pool.clone(),
                &config.migrations.journal_table,
            )?))
            .seed_journal(Arc::new(PgSeedJournal::new(
                pool,
                &config.seeds.journal_table,
            )?))
            .migrations_dir(&config.migrations.dir)
            .seeds_dir(&config.seeds.dir)
            .variables(config.variables())
            .strategies(StrategyChain::from_config(&config.seeds))
            .script_timeout(config.database.statement_timeout());

        if config.migrations.allow_downgrades {
            builder = builder.downgrade_resolver(Arc::new(PairedDowngradeResolver));
        }
        if config.database.create_if_missing {
            builder = builder.provisioner(Arc::new(PgProvisioner::from_url(&config.database.url)?));
        }

        builder.database = Some(database);
        Ok(builder)
    }

    pub fn connection(mut self, connection: Arc<dyn ConnectionManager>) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn migration_journal(mut self, journal: Arc<dyn MigrationJournal>) -> Self {
        self.migration_journal = Some(journal);
        self
    }

    pub fn seed_journal(mut self, journal: Arc<dyn SeedJournal>) -> Self {
        self.seed_journal = Some(journal);
        self
    }

    /// Load migrations from a directory.
    ///
    /// Migration files should be named like:
    /// - `0001_create_users.sql`
    /// - `0001_create_users.down.sql` (optional)
    pub fn migrations_dir(self, path: impl Into<PathBuf>) -> Self {
        self.migration_provider(Arc::new(DirectoryScriptProvider::migrations(path)))
    }

    /// Load seeds from a directory tree.
    pub fn seeds_dir(self, path: impl Into<PathBuf>) -> Self {
        self.seed_provider(Arc::new(DirectoryScriptProvider::seeds(path)))
    }

    pub fn migration_provider(mut self, provider: Arc<dyn ScriptProvider>) -> Self {
        self.migration_providers.push(provider);
        self
    }

    pub fn seed_provider(mut self, provider: Arc<dyn ScriptProvider>) -> Self {
        self.seed_providers.push(provider);
        self
    }

    /// Add a migration programmatically.
    ///
    /// Use this for migrations generated in code. For most cases, use
    /// migration files instead.
    pub fn migration(self, source: ScriptSource) -> Self {
        self.inline_migrations.push(source);
        self
    }

    /// Add a seed programmatically.
    pub fn seed(self, source: ScriptSource) -> Self {
        self.inline_seeds.push(source);
        self
    }

    pub fn downgrade_resolver(mut self, resolver: Arc<dyn DowngradeResolver>) -> Self {
        self.downgrade_resolver = Some(resolver);
        self
    }

    /// Create the database before the first run if it does not exist.
    pub fn provisioner(mut self, provisioner: Arc<dyn DatabaseProvisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    /// Replace the seed strategy chain.
    pub fn strategies(mut self, strategies: StrategyChain) -> Self {
        self.strategies = strategies;
        self
    }

    /// Append a seed strategy resolver after those already configured.
    pub fn strategy_resolver(mut self, resolver: impl StrategyResolver + 'static) -> Self {
        self.strategies = self.strategies.with(resolver);
        self
    }

    /// Start an empty strategy chain with the given fallback.
    pub fn fallback_strategy(mut self, fallback: SeedStrategy) -> Self {
        self.strategies = StrategyChain::new(fallback);
        self
    }

    pub fn script_timeout(mut self, timeout: Duration) -> Self {
        self.script_timeout = timeout;
        self
    }

    /// Build the engine.
    pub fn build(self) -> Result<Reactor> {
        let connection = self
            .connection
            .ok_or_else(|| ReactorError::Config("A connection manager is required".to_string()))?;
        let migration_journal = self
            .migration_journal
            .ok_or_else(|| ReactorError::Config("A migration journal is required".to_string()))?;
        if self.script_timeout.is_zero() {
            return Err(ReactorError::Config(
                "Script timeout must be greater than zero".to_string(),
            ));
        }

        let mut migrations = MigrationExecutor::new(
            connection.clone(),
            migration_journal,
            self.variables.clone(),
            self.script_timeout,
        )
        .with_provider(Arc::new(self.inline_migrations));
        for provider in self.migration_providers {
            migrations = migrations.with_provider(provider);
        }
        if let Some(resolver) = self.downgrade_resolver {
            migrations = migrations.with_downgrade_resolver(resolver);
        }

        let seeds = match self.seed_journal {
            Some(journal) => {
                let mut seeds = SeedExecutor::new(
                    connection,
                    journal,
                    self.strategies,
                    self.variables,
                    self.script_timeout,
                )
                .with_provider(Arc::new(self.inline_seeds));
                for provider in self.seed_providers {
                    seeds = seeds.with_provider(provider);
                }
                Some(seeds)
            }
            None if self.seed_providers.is_empty() && self.inline_seeds.is_empty() => None,
            None => {
                return Err(ReactorError::Config(
                    "Seed providers are configured but no seed journal is".to_string(),
                ))
            }
        };

        Ok(Reactor {
            migrations,
            seeds,
            provisioner: self.provisioner,
            provisioned: OnceCell::new(),
            database: self.database,
        })
    }
}

impl Default for ReactorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::BoxFuture;
    use reactor_core::script::Script;
    use reactor_core::testing::{MemoryMigrationJournal, MemorySeedJournal, MockConnection};

    #[derive(Default)]
    struct CountingProvisioner {
        calls: AtomicUsize,
    }

    impl DatabaseProvisioner for CountingProvisioner {
        fn ensure_database_exists<'a>(
            &'a self,
            _cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    fn engine(conn: &MockConnection) -> ReactorBuilder {
        Reactor::builder()
            .connection(Arc::new(conn.clone()))
            .migration_journal(Arc::new(MemoryMigrationJournal::new()))
            .seed_journal(Arc::new(MemorySeedJournal::new()))
    }

    #[test]
    fn test_builder_requires_connection() {
        let result = ReactorBuilder::new()
            .migration_journal(Arc::new(MemoryMigrationJournal::new()))
            .build();
        assert!(matches!(result, Err(ReactorError::Config(_))));
    }

    #[test]
    fn test_builder_requires_seed_journal_for_seed_providers() {
        let result = ReactorBuilder::new()
            .connection(Arc::new(MockConnection::new()))
            .migration_journal(Arc::new(MemoryMigrationJournal::new()))
            .seed_provider(Arc::new(StaticScriptProvider::new()))
            .build();
        assert!(matches!(result, Err(ReactorError::Config(_))));
    }

    #[test]
    fn test_builder_requires_seed_journal_for_inline_seeds() {
        let result = ReactorBuilder::new()
            .connection(Arc::new(MockConnection::new()))
            .migration_journal(Arc::new(MemoryMigrationJournal::new()))
            .seed(ScriptSource::text("001_admin", "INSERT INTO users VALUES (1)"))
            .build();
        assert!(matches!(result, Err(ReactorError::Config(_))));
    }

    #[test]
    fn test_builder_rejects_zero_timeout() {
        let result = engine(&MockConnection::new())
            .script_timeout(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_from_config_wires_postgres() {
        let mut config = ReactorConfig::default_with_database_url("postgres://localhost/app");
        config.migrations.allow_downgrades = true;
        let reactor = ReactorBuilder::from_config(&config).unwrap().build().unwrap();
        assert!(reactor.supports_downgrades());
    }

    #[tokio::test]
    async fn test_run_then_seed() {
        let conn = MockConnection::new();
        let reactor = engine(&conn)
            .variables(Variables::new([("Owner", "app")]))
            .migration(ScriptSource::text(
                "0001_users",
                "CREATE TABLE users (id INT); ALTER TABLE users OWNER TO ${Owner}",
            ))
            .seed(ScriptSource::text("001_admin", "INSERT INTO users VALUES (1)"))
            .build()
            .unwrap();
        let cancel = CancellationToken::new();

        let preview = reactor.run_preview(&cancel).await.unwrap();
        assert_eq!(preview.pending_names(), vec!["0001_users"]);

        let result = reactor.run(&cancel).await;
        assert!(result.successful);
        assert_eq!(result.applied_scripts, vec!["0001_users"]);
        conn.assert_committed("OWNER TO app");

        let seeds = reactor.execute_seeds(&cancel).await;
        assert_eq!(seeds.applied_scripts, vec!["001_admin"]);
        assert!(reactor.execute_seeds(&cancel).await.applied_scripts.is_empty());
    }

    #[tokio::test]
    async fn test_downgrade_without_resolver_fails_before_executing() {
        let conn = MockConnection::new();
        let reactor = engine(&conn)
            .migration(
                ScriptSource::text("0001_a", "CREATE TABLE a (id INT)")
                    .with_downgrade(Script::text("DROP TABLE a")),
            )
            .build()
            .unwrap();
        let cancel = CancellationToken::new();
        assert!(reactor.run(&cancel).await.successful);
        let before = conn.transactions_started();

        let result = reactor.downgrade(DowngradeMode::Last, &cancel).await;
        assert!(!result.successful);
        assert_eq!(conn.transactions_started(), before);
    }

    #[tokio::test]
    async fn test_provisioner_runs_once() {
        let provisioner = Arc::new(CountingProvisioner::default());
        let reactor = engine(&MockConnection::new())
            .provisioner(provisioner.clone())
            .build()
            .unwrap();
        let cancel = CancellationToken::new();

        assert!(reactor.run(&cancel).await.successful);
        assert!(reactor.execute_seeds(&cancel).await.successful);
        reactor.status(&cancel).await.unwrap();

        assert_eq!(provisioner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_previews_do_not_provision() {
        let provisioner = Arc::new(CountingProvisioner::default());
        let conn = MockConnection::new();
        let reactor = engine(&conn)
            .provisioner(provisioner.clone())
            .migration(ScriptSource::text("0001_a", "CREATE TABLE a (id INT)"))
            .seed(ScriptSource::text("001_admin", "INSERT INTO users VALUES (1)"))
            .build()
            .unwrap();
        let cancel = CancellationToken::new();

        let preview = reactor.run_preview(&cancel).await.unwrap();
        assert_eq!(preview.pending_names(), vec!["0001_a"]);
        assert_eq!(reactor.status(&cancel).await.unwrap().pending, vec!["0001_a"]);
        assert_eq!(reactor.preview_seeds(&cancel).await.unwrap().would_run().count(), 1);

        assert_eq!(provisioner.calls.load(Ordering::SeqCst), 0);
        assert_eq!(conn.transactions_started(), 0);
    }

    #[tokio::test]
    async fn test_seed_strategy_from_resolver() {
        let reactor = engine(&MockConnection::new())
            .fallback_strategy(SeedStrategy::RunIfChanged)
            .strategy_resolver(|source: &ScriptSource| {
                source
                    .name
                    .ends_with("_log")
                    .then_some(SeedStrategy::RunAlways)
            })
            .seed(ScriptSource::text("001_audit_log", "INSERT INTO audit VALUES (1)"))
            .seed(ScriptSource::text("002_lookup", "INSERT INTO lookup VALUES (1)"))
            .build()
            .unwrap();

        let preview = reactor.preview_seeds(&CancellationToken::new()).await.unwrap();
        let strategies: Vec<_> = preview.seeds.iter().map(|s| s.strategy).collect();
        assert_eq!(
            strategies,
            vec![SeedStrategy::RunAlways, SeedStrategy::RunIfChanged]
        );
    }
}
