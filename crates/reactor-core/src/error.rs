use thiserror::Error;

/// Core error type for reactor operations.
#[derive(Error, Debug)]
pub enum ReactorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Script '{script}' failed: {cause}")]
    MigrationExecutionFailed { script: String, cause: String },

    #[error("Migration '{0}' does not support downgrade")]
    DowngradeUnsupported(String),

    #[error("Journal error: {0}")]
    Journal(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ReactorError {
    /// Wrap an error raised while applying a script, keeping the script name.
    pub fn execution_failed(script: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        ReactorError::MigrationExecutionFailed {
            script: script.into(),
            cause: cause.to_string(),
        }
    }

    /// Whether this error was raised before any script executed.
    pub fn is_eager(&self) -> bool {
        matches!(self, ReactorError::Config(_) | ReactorError::Validation(_))
    }
}

impl From<toml::de::Error> for ReactorError {
    fn from(e: toml::de::Error) -> Self {
        ReactorError::Config(format!("Failed to parse config: {}", e))
    }
}

/// Result type alias using ReactorError.
pub type Result<T> = std::result::Result<T, ReactorError>;
