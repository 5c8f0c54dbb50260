//! In-memory journals for testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::{ReactorError, Result};
use crate::journal::{
    check_cancelled, MigrationJournal, MigrationJournalEntry, SeedJournal, SeedJournalEntry,
};
use crate::script::{Migration, SeedStrategy};

/// Migration journal backed by a vector.
#[derive(Debug, Default)]
pub struct MemoryMigrationJournal {
    entries: RwLock<Vec<MigrationJournalEntry>>,
    created: AtomicBool,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryMigrationJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent stores and removals fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful stores and removals.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Whether `ensure_table_exists` was ever called.
    pub fn table_created(&self) -> bool {
        self.created.load(Ordering::SeqCst)
    }

    pub fn entries(&self) -> Vec<MigrationJournalEntry> {
        self.entries.read().unwrap().clone()
    }

    /// Journaled migration names in apply order.
    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .map(|e| e.migration_name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ReactorError::Journal("journal write rejected".into()));
        }
        Ok(())
    }
}

impl MigrationJournal for MemoryMigrationJournal {
    fn ensure_table_exists<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            self.created.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn table_exists<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            Ok(self.table_created() || !self.entries.read().unwrap().is_empty())
        })
    }

    fn executed_migrations<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Vec<MigrationJournalEntry>>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            Ok(self.entries())
        })
    }

    fn has_been_executed<'a>(
        &'a self,
        migration: &'a Migration,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            Ok(self
                .entries
                .read()
                .unwrap()
                .iter()
                .any(|e| e.upgrade_script_hash == migration.content_hash))
        })
    }

    fn store_executed_migration<'a>(
        &'a self,
        migration: &'a Migration,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            self.check_writable()?;
            let mut entries = self.entries.write().unwrap();
            if entries
                .iter()
                .any(|e| e.upgrade_script_hash == migration.content_hash)
            {
                return Err(ReactorError::Journal(format!(
                    "Migration '{}' is already journaled",
                    migration.name
                )));
            }
            entries.push(MigrationJournalEntry::applied(migration));
            self.writes.fetch_add(1, Ordering::SeqCst);
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
            self.check_writable()?;
            self.entries
                .write()
                .unwrap()
                .retain(|e| e.upgrade_script_hash != upgrade_script_hash);
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Seed journal backed by a vector.
#[derive(Debug, Default)]
pub struct MemorySeedJournal {
    entries: RwLock<Vec<SeedJournalEntry>>,
    created: AtomicBool,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemorySeedJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn table_created(&self) -> bool {
        self.created.load(Ordering::SeqCst)
    }

    pub fn entries(&self) -> Vec<SeedJournalEntry> {
        self.entries.read().unwrap().clone()
    }

    /// Entries recorded for one seed.
    pub fn entries_for(&self, seed_name: &str) -> Vec<SeedJournalEntry> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.seed_name == seed_name)
            .cloned()
            .collect()
    }
}

impl SeedJournal for MemorySeedJournal {
    fn ensure_table_exists<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            self.created.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn table_exists<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            Ok(self.table_created() || !self.entries.read().unwrap().is_empty())
        })
    }

    fn executed_seeds<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Vec<SeedJournalEntry>>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            Ok(self.entries())
        })
    }

    fn store_executed_seed<'a>(
        &'a self,
        entry: &'a SeedJournalEntry,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            check_cancelled(cancel)?;
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(ReactorError::Journal("journal write rejected".into()));
            }
            let mut entries = self.entries.write().unwrap();
            if entry.strategy != SeedStrategy::RunAlways {
                entries.retain(|e| e.seed_name != entry.seed_name);
            }
            entries.push(entry.clone());
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}
