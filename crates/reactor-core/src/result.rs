//! Outcomes reported by the engine.

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ReactorError;
use crate::script::SeedStrategy;

/// Which applied migrations a downgrade reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DowngradeMode {
    /// Only the most recently applied migration.
    Last,
    /// Every applied migration, newest first.
    All,
}

/// Direction of a run or preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Upgrade,
    Downgrade(DowngradeMode),
}

/// Outcome of applying or reverting a batch of scripts.
///
/// A failed run still reports the scripts that committed before the failure.
#[derive(Debug, Default)]
pub struct RunResult {
    pub successful: bool,
    pub error: Option<ReactorError>,
    /// Scripts executed and journaled, in execution order.
    pub applied_scripts: Vec<String>,
    /// Scripts the journal said not to run.
    pub skipped_scripts: Vec<String>,
    /// Script that raised the error, if one did.
    pub failed_script: Option<String>,
    pub execution_time_ms: u128,
}

impl RunResult {
    pub fn succeeded(
        applied_scripts: Vec<String>,
        skipped_scripts: Vec<String>,
        execution_time_ms: u128,
    ) -> Self {
        Self {
            successful: true,
            error: None,
            applied_scripts,
            skipped_scripts,
            failed_script: None,
            execution_time_ms,
        }
    }

    /// A run that stopped before executing anything.
    pub fn aborted(error: ReactorError) -> Self {
        Self {
            successful: false,
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    pub fn applied_count(&self) -> usize {
        self.applied_scripts.len()
    }
}

/// Accumulates a [`RunResult`] while scripts execute.
#[derive(Debug)]
pub struct RunProgress {
    started: Instant,
    applied: Vec<String>,
    skipped: Vec<String>,
}

impl RunProgress {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            applied: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn applied(&mut self, name: impl Into<String>) {
        self.applied.push(name.into());
    }

    pub fn skipped(&mut self, name: impl Into<String>) {
        self.skipped.push(name.into());
    }

    pub fn finish(self) -> RunResult {
        let elapsed = self.started.elapsed().as_millis();
        RunResult::succeeded(self.applied, self.skipped, elapsed)
    }

    /// Stop the run, keeping what already committed.
    pub fn fail(self, error: ReactorError, failed_script: Option<String>) -> RunResult {
        RunResult {
            successful: false,
            error: Some(error),
            applied_scripts: self.applied,
            skipped_scripts: self.skipped,
            failed_script,
            execution_time_ms: self.started.elapsed().as_millis(),
        }
    }
}

/// A script a dry run expects to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingScript {
    pub name: String,
    pub direction: Direction,
}

/// Side-effect-free prediction of a migration run.
///
/// `pending_migrations + skipped_migrations == total_migrations`, and every
/// pending migration counts toward exactly one of `pending_upgrades` or
/// `pending_downgrades`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DryRunResult {
    pub total_migrations: usize,
    pub pending_migrations: usize,
    pub skipped_migrations: usize,
    pub pending_upgrades: usize,
    pub pending_downgrades: usize,
    /// Pending scripts in the order a real run would execute them.
    pub pending: Vec<PendingScript>,
    pub skipped: Vec<String>,
}

impl DryRunResult {
    /// Names of pending scripts in execution order.
    pub fn pending_names(&self) -> Vec<String> {
        self.pending.iter().map(|p| p.name.clone()).collect()
    }

    pub(crate) fn push_pending(&mut self, name: String, direction: Direction) {
        match direction {
            Direction::Upgrade => self.pending_upgrades += 1,
            Direction::Downgrade(_) => self.pending_downgrades += 1,
        }
        self.pending_migrations += 1;
        self.total_migrations += 1;
        self.pending.push(PendingScript { name, direction });
    }

    pub(crate) fn push_skipped(&mut self, name: String) {
        self.skipped_migrations += 1;
        self.total_migrations += 1;
        self.skipped.push(name);
    }
}

/// Builds a [`DryRunResult`] while keeping its counters consistent.
#[derive(Debug, Default)]
pub struct DryRunBuilder {
    result: DryRunResult,
}

impl DryRunBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&mut self, name: impl Into<String>, direction: Direction) -> &mut Self {
        self.result.push_pending(name.into(), direction);
        self
    }

    pub fn skipped(&mut self, name: impl Into<String>) -> &mut Self {
        self.result.push_skipped(name.into());
        self
    }

    pub fn build(self) -> DryRunResult {
        self.result
    }
}

/// Why a seed would or would not execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionReason {
    NeverExecuted,
    AlreadyExecuted { applied_at: DateTime<Utc> },
    ContentChanged { previous_hash: String },
    ContentUnchanged,
    AlwaysRuns,
}

impl ExecutionReason {
    pub fn will_execute(&self) -> bool {
        matches!(
            self,
            Self::NeverExecuted | Self::ContentChanged { .. } | Self::AlwaysRuns
        )
    }
}

impl fmt::Display for ExecutionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NeverExecuted => f.write_str("Not executed before"),
            Self::AlreadyExecuted { applied_at } => write!(
                f,
                "Already executed at {}",
                applied_at.format("%Y-%m-%d %H:%M:%S")
            ),
            Self::ContentChanged { .. } => f.write_str("Content changed since last execution"),
            Self::ContentUnchanged => f.write_str("Content unchanged since last execution"),
            Self::AlwaysRuns => f.write_str("Runs on every execution"),
        }
    }
}

/// Preview of a single seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedPreviewEntry {
    pub name: String,
    pub strategy: SeedStrategy,
    pub reason: ExecutionReason,
}

impl SeedPreviewEntry {
    pub fn will_execute(&self) -> bool {
        self.reason.will_execute()
    }
}

/// Classification of every discovered seed without executing any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedPreview {
    /// Entries in execution order.
    pub seeds: Vec<SeedPreviewEntry>,
}

impl SeedPreview {
    pub fn would_run(&self) -> impl Iterator<Item = &SeedPreviewEntry> {
        self.seeds.iter().filter(|s| s.will_execute())
    }

    pub fn would_skip(&self) -> impl Iterator<Item = &SeedPreviewEntry> {
        self.seeds.iter().filter(|s| !s.will_execute())
    }
}

/// An applied migration as reported by status.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedMigration {
    pub name: String,
    pub applied_at: DateTime<Utc>,
    pub has_down: bool,
    /// False when the journal names a migration no provider supplies.
    pub discovered: bool,
}

/// Applied and pending migrations.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationStatus {
    pub applied: Vec<AppliedMigration>,
    pub pending: Vec<String>,
}
