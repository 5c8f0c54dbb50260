//! Data seeds.

mod executor;
mod journal;
mod strategy;

pub use executor::{classify, SeedExecutor};
pub use journal::PgSeedJournal;
pub use strategy::{FolderConvention, NamingConvention, StrategyChain, StrategyResolver};
