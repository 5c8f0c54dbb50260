use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::script::SeedStrategy;

/// Migration discovery and journal configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationsConfig {
    /// Directory holding `NNNN_name.sql` and optional `NNNN_name.down.sql` files.
    #[serde(default = "default_migrations_dir")]
    pub dir: PathBuf,

    /// Journal table name.
    #[serde(default = "default_migrations_table")]
    pub journal_table: String,

    /// Install the paired downgrade resolver.
    #[serde(default)]
    pub allow_downgrades: bool,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: default_migrations_dir(),
            journal_table: default_migrations_table(),
            allow_downgrades: false,
        }
    }
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_migrations_table() -> String {
    "reactor_migrations".to_string()
}

/// Seed discovery, strategy and journal configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedsConfig {
    /// Root directory, walked recursively.
    #[serde(default = "default_seeds_dir")]
    pub dir: PathBuf,

    /// Journal table name.
    #[serde(default = "default_seeds_table")]
    pub journal_table: String,

    /// Strategy applied when no resolver matches.
    #[serde(default)]
    pub fallback_strategy: SeedStrategy,

    /// Resolver chain, evaluated in order.
    #[serde(default = "default_resolvers")]
    pub resolvers: Vec<ResolverKind>,
}

impl Default for SeedsConfig {
    fn default() -> Self {
        Self {
            dir: default_seeds_dir(),
            journal_table: default_seeds_table(),
            fallback_strategy: SeedStrategy::default(),
            resolvers: default_resolvers(),
        }
    }
}

fn default_seeds_dir() -> PathBuf {
    PathBuf::from("seeds")
}

fn default_seeds_table() -> String {
    "reactor_seeds".to_string()
}

fn default_resolvers() -> Vec<ResolverKind> {
    vec![ResolverKind::Folder, ResolverKind::Naming]
}

/// Built-in seed strategy conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    /// Strategy from a folder name such as `run-always/`.
    Folder,
    /// Strategy from a file name suffix such as `countries.always.sql`.
    Naming,
}
