//! Journal contracts.
//!
//! The journals live in the database being migrated and are the only state
//! that outlives a run. Every operation takes a cancellation token and checks
//! it before touching the database, never in the middle of a write.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{ReactorError, Result};
use crate::script::{Migration, Seed, SeedStrategy};

/// Record of a successfully applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationJournalEntry {
    pub upgrade_script_hash: String,
    pub migration_name: String,
    pub applied_at: DateTime<Utc>,
    pub success: bool,
}

impl MigrationJournalEntry {
    /// Entry for a migration applied now.
    pub fn applied(migration: &Migration) -> Self {
        Self {
            upgrade_script_hash: migration.content_hash.clone(),
            migration_name: migration.name.clone(),
            applied_at: Utc::now(),
            success: true,
        }
    }
}

/// Record of one seed execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedJournalEntry {
    pub seed_name: String,
    pub content_hash: String,
    pub strategy: SeedStrategy,
    pub applied_at: DateTime<Utc>,
}

impl SeedJournalEntry {
    /// Entry for a seed executed now.
    pub fn executed(seed: &Seed) -> Self {
        Self {
            seed_name: seed.name.clone(),
            content_hash: seed.content_hash.clone(),
            strategy: seed.strategy,
            applied_at: Utc::now(),
        }
    }
}

/// Durable record of applied migrations.
pub trait MigrationJournal: Send + Sync {
    /// Create the journal storage if missing. Safe to call on every run.
    fn ensure_table_exists<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<()>>;

    /// Whether the journal storage exists. Dry runs read through this instead
    /// of creating the storage; a database that does not exist yet has none.
    fn table_exists<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<bool>>;

    /// All entries in the order they were applied.
    fn executed_migrations<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Vec<MigrationJournalEntry>>>;

    /// Whether an entry exists for the migration's upgrade hash.
    fn has_been_executed<'a>(
        &'a self,
        migration: &'a Migration,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<bool>>;

    /// Record a migration after its transaction committed.
    fn store_executed_migration<'a>(
        &'a self,
        migration: &'a Migration,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>>;

    /// Forget a migration so that a later run considers it pending again.
    fn remove_executed_migration<'a>(
        &'a self,
        upgrade_script_hash: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Durable record of seed executions.
///
/// `RunOnce` and `RunIfChanged` entries are upserted by seed name; `RunAlways`
/// entries are appended as an execution log.
pub trait SeedJournal: Send + Sync {
    fn ensure_table_exists<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<()>>;

    fn table_exists<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<bool>>;

    /// All entries in the order they were written.
    fn executed_seeds<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Vec<SeedJournalEntry>>>;

    fn store_executed_seed<'a>(
        &'a self,
        entry: &'a SeedJournalEntry,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Fail with [`ReactorError::Cancelled`] if cancellation was requested.
pub fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(ReactorError::Cancelled)
    } else {
        Ok(())
    }
}
