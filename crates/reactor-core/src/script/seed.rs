use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ScriptSource;
use crate::error::{ReactorError, Result};
use crate::variables::Variables;

/// Policy governing whether a seed re-executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedStrategy {
    /// Execute once; later runs skip by name regardless of content.
    RunOnce,
    /// Execute again whenever the content hash differs from the journal.
    RunIfChanged,
    /// Execute on every run.
    RunAlways,
}

impl Default for SeedStrategy {
    fn default() -> Self {
        Self::RunOnce
    }
}

impl SeedStrategy {
    /// Get the journal representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunOnce => "run_once",
            Self::RunIfChanged => "run_if_changed",
            Self::RunAlways => "run_always",
        }
    }

    /// Lenient match used by folder and naming conventions.
    ///
    /// Case, `-` and `_` are ignored, and the `run` prefix is optional, so
    /// `RunOnce`, `run-once`, `run_once` and `once` all match.
    pub fn from_convention(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        let normalized = normalized.strip_prefix("run").unwrap_or(&normalized);
        match normalized {
            "once" => Some(Self::RunOnce),
            "ifchanged" | "changed" | "onchange" => Some(Self::RunIfChanged),
            "always" => Some(Self::RunAlways),
            _ => None,
        }
    }
}

impl fmt::Display for SeedStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeedStrategy {
    type Err = ReactorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_convention(s)
            .ok_or_else(|| ReactorError::Validation(format!("Unknown seed strategy '{}'", s)))
    }
}

/// A seed ready to execute.
#[derive(Debug, Clone)]
pub struct Seed {
    pub name: String,
    pub folder: Option<String>,
    pub sql: String,
    pub content_hash: String,
    pub strategy: SeedStrategy,
}

impl Seed {
    /// Render a discovered source with an already resolved strategy.
    pub fn prepare(
        source: &ScriptSource,
        strategy: SeedStrategy,
        variables: &Variables,
    ) -> Result<Self> {
        let rendered = source.upgrade.render(&source.name, variables)?;
        Ok(Self {
            name: source.name.clone(),
            folder: source.folder.clone(),
            sql: rendered.sql,
            content_hash: rendered.content_hash,
            strategy,
        })
    }
}
