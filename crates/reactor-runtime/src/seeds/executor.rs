//! Seed execution.
//!
//! Seeds run after migrations, in name order, one transaction each. Whether a
//! seed runs depends on its strategy and on the latest journal entry for its
//! name.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use reactor_core::connection::ConnectionManager;
use reactor_core::error::{ReactorError, Result};
use reactor_core::journal::{check_cancelled, SeedJournal, SeedJournalEntry};
use reactor_core::provider::ScriptProvider;
use reactor_core::result::{ExecutionReason, RunProgress, RunResult, SeedPreview, SeedPreviewEntry};
use reactor_core::script::{order_sources, Seed, SeedStrategy};
use reactor_core::variables::Variables;

use super::strategy::StrategyChain;
use crate::scripts::execute_in_transaction;

/// Decide whether `seed` runs given the latest journal entry for its name.
pub fn classify(seed: &Seed, latest: Option<&SeedJournalEntry>) -> ExecutionReason {
    match (seed.strategy, latest) {
        (SeedStrategy::RunAlways, _) => ExecutionReason::AlwaysRuns,
        (_, None) => ExecutionReason::NeverExecuted,
        (SeedStrategy::RunOnce, Some(entry)) => ExecutionReason::AlreadyExecuted {
            applied_at: entry.applied_at,
        },
        (SeedStrategy::RunIfChanged, Some(entry)) if entry.content_hash == seed.content_hash => {
            ExecutionReason::ContentUnchanged
        }
        (SeedStrategy::RunIfChanged, Some(entry)) => ExecutionReason::ContentChanged {
            previous_hash: entry.content_hash.clone(),
        },
    }
}

/// Applies seeds according to their strategies.
pub struct SeedExecutor {
    connection: Arc<dyn ConnectionManager>,
    journal: Arc<dyn SeedJournal>,
    providers: Vec<Arc<dyn ScriptProvider>>,
    strategies: StrategyChain,
    variables: Variables,
    timeout: Duration,
}

impl SeedExecutor {
    pub fn new(
        connection: Arc<dyn ConnectionManager>,
        journal: Arc<dyn SeedJournal>,
        strategies: StrategyChain,
        variables: Variables,
        timeout: Duration,
    ) -> Self {
        Self {
            connection,
            journal,
            providers: Vec::new(),
            strategies,
            variables,
            timeout,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn ScriptProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Discover, resolve strategies for, and render every seed.
    pub async fn discover(&self) -> Result<Vec<Seed>> {
        self.render_all()
            .await?
            .into_iter()
            .map(|(_, seed)| seed)
            .collect()
    }

    /// Run every seed whose strategy says it should run.
    pub async fn execute(&self, cancel: &CancellationToken) -> RunResult {
        let (rendered, mut latest) = match self.prepare(cancel).await {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("Seed run aborted: {}", e);
                return RunResult::aborted(e);
            }
        };

        let mut progress = RunProgress::start();

        for (name, seed) in rendered {
            if cancel.is_cancelled() {
                warn!("Cancelled before seed {}", name);
                return progress.fail(ReactorError::Cancelled, None);
            }

            let seed = match seed {
                Ok(seed) => seed,
                Err(e) => {
                    error!("Seed {} could not be generated: {}", name, e);
                    return progress.fail(e, Some(name));
                }
            };

            let reason = classify(&seed, latest.get(&name));
            if !reason.will_execute() {
                debug!("Skipping seed {}: {}", name, reason);
                progress.skipped(&name);
                continue;
            }

            info!("Running seed {} ({}): {}", name, seed.strategy, reason);
            if let Err(e) =
                execute_in_transaction(self.connection.as_ref(), &name, &seed.sql, self.timeout)
                    .await
            {
                error!("Seed {} failed: {}", name, e);
                return progress.fail(e, Some(name));
            }

            let entry = SeedJournalEntry::executed(&seed);
            let unit = CancellationToken::new();
            if let Err(e) = self.journal.store_executed_seed(&entry, &unit).await {
                error!("Seed {} committed but could not be journaled: {}", name, e);
                return progress.fail(e, Some(name));
            }
            latest.insert(entry.seed_name.clone(), entry);

            progress.applied(&name);
        }

        progress.finish()
    }

    /// Classify every seed without executing any.
    ///
    /// The journal is read but never created.
    pub async fn preview(&self, cancel: &CancellationToken) -> Result<SeedPreview> {
        check_cancelled(cancel)?;
        let seeds = self.discover().await?;
        let latest = if self.journal.table_exists(cancel).await? {
            latest_entries(self.journal.executed_seeds(cancel).await?)
        } else {
            HashMap::new()
        };

        let seeds = seeds
            .into_iter()
            .map(|seed| SeedPreviewEntry {
                reason: classify(&seed, latest.get(&seed.name)),
                name: seed.name,
                strategy: seed.strategy,
            })
            .collect();

        Ok(SeedPreview { seeds })
    }

    /// Render every source in name order. Validation failures abort; other
    /// generator failures wait for that seed's turn.
    async fn render_all(&self) -> Result<Vec<(String, Result<Seed>)>> {
        let mut sources = Vec::new();
        for provider in &self.providers {
            sources.extend(provider.discover().await?);
        }

        let mut rendered = Vec::new();
        for source in order_sources(sources, "seed")? {
            let strategy = self.strategies.resolve(&source);
            match Seed::prepare(&source, strategy, &self.variables) {
                Err(e) if e.is_eager() => return Err(e),
                seed => rendered.push((source.name, seed)),
            }
        }
        Ok(rendered)
    }

    /// Rendered seeds plus the latest journal entry per seed name.
    async fn prepare(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(Vec<(String, Result<Seed>)>, HashMap<String, SeedJournalEntry>)> {
        check_cancelled(cancel)?;
        let rendered = self.render_all().await?;
        debug!("Discovered {} seeds", rendered.len());

        self.journal.ensure_table_exists(cancel).await?;
        let latest = latest_entries(self.journal.executed_seeds(cancel).await?);

        Ok((rendered, latest))
    }
}

/// Latest entry per seed name; entries arrive oldest first.
fn latest_entries(entries: Vec<SeedJournalEntry>) -> HashMap<String, SeedJournalEntry> {
    entries
        .into_iter()
        .map(|entry| (entry.seed_name.clone(), entry))
        .collect()
}
