pub mod db;
pub mod migrations;
pub mod scripts;
pub mod seeds;

pub use db::{Database, PgConnectionManager, PgProvisioner};
pub use migrations::{MigrationExecutor, PgMigrationJournal};
pub use scripts::{execute_in_transaction, load_scripts_from_dir, split_statements, DirectoryScriptProvider};
pub use seeds::{
    FolderConvention, NamingConvention, PgSeedJournal, SeedExecutor, StrategyChain,
    StrategyResolver,
};
