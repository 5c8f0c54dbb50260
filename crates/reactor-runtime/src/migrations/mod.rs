//! Schema migrations.

mod executor;
mod journal;

pub use executor::MigrationExecutor;
pub use journal::PgMigrationJournal;
