mod database;
mod scripts;

pub use database::DatabaseConfig;
pub use scripts::{MigrationsConfig, ResolverKind, SeedsConfig};

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ReactorError, Result};
use crate::variables::Variables;

/// Root configuration for reactor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactorConfig {
    /// Database configuration.
    pub database: DatabaseConfig,

    /// Migration configuration.
    #[serde(default)]
    pub migrations: MigrationsConfig,

    /// Seed configuration.
    #[serde(default)]
    pub seeds: SeedsConfig,

    /// Values for `${Key}` tokens and generated scripts.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl ReactorConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ReactorError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        // Substitute environment variables
        let content = substitute_env_vars(content);

        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with defaults.
    pub fn default_with_database_url(url: &str) -> Self {
        Self {
            database: DatabaseConfig {
                url: url.to_string(),
                ..Default::default()
            },
            migrations: MigrationsConfig::default(),
            seeds: SeedsConfig::default(),
            variables: BTreeMap::new(),
        }
    }

    /// Reject settings that would only fail once scripts start running.
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(ReactorError::Config("database.url is required".into()));
        }
        if self.database.pool_size == 0 {
            return Err(ReactorError::Config(
                "database.pool_size must be at least 1".into(),
            ));
        }
        if self.database.statement_timeout_secs == 0 {
            return Err(ReactorError::Config(
                "database.statement_timeout_secs must be positive".into(),
            ));
        }
        validate_table_name("migrations.journal_table", &self.migrations.journal_table)?;
        validate_table_name("seeds.journal_table", &self.seeds.journal_table)?;
        if self.migrations.journal_table == self.seeds.journal_table {
            return Err(ReactorError::Config(
                "migrations and seeds must use different journal tables".into(),
            ));
        }
        Ok(())
    }

    /// The configured variables as an immutable set.
    pub fn variables(&self) -> Variables {
        Variables::new(self.variables.clone())
    }
}

/// Accept `table` or `schema.table` made of identifier characters.
pub fn validate_table_name(field: &str, name: &str) -> Result<()> {
    let re = regex_lite::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").unwrap();
    if re.is_match(name) {
        Ok(())
    } else {
        Err(ReactorError::Config(format!(
            "{} '{}' is not a valid table name",
            field, name
        )))
    }
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}
