mod apply;
mod directory;
mod split;

pub use apply::execute_in_transaction;
pub use directory::{load_scripts_from_dir, DirectoryScriptProvider};
pub use split::split_statements;
