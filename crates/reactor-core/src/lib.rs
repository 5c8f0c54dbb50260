pub mod config;
pub mod connection;
pub mod error;
pub mod journal;
pub mod provider;
pub mod result;
pub mod script;
pub mod variables;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::ReactorConfig;
pub use connection::{ConnectionManager, DatabaseProvisioner, ScriptTransaction};
pub use error::{ReactorError, Result};
pub use journal::{MigrationJournal, MigrationJournalEntry, SeedJournal, SeedJournalEntry};
pub use provider::{DowngradeResolver, PairedDowngradeResolver, ScriptProvider, StaticScriptProvider};
pub use result::{
    Direction, DowngradeMode, DryRunBuilder, DryRunResult, ExecutionReason, MigrationStatus,
    RunProgress, RunResult, SeedPreview, SeedPreviewEntry,
};
pub use script::{Migration, Script, ScriptSource, Seed, SeedStrategy};
pub use variables::Variables;

pub use tokio_util::sync::CancellationToken;
