//! Script model shared by migrations and seeds.
//!
//! A provider hands the engine [`ScriptSource`]s. Each source carries its
//! upgrade script and an optional downgrade script, each of which is either
//! plain text with `${Key}` tokens or a generator closure evaluated against the
//! run's [`Variables`].

mod migration;
mod seed;

pub use migration::Migration;
pub use seed::{Seed, SeedStrategy};

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{ReactorError, Result};
use crate::variables::Variables;

/// Closure producing SQL from the run's variables.
pub type ScriptGenerator = Arc<dyn Fn(&Variables) -> Result<String> + Send + Sync>;

/// A script body, either literal text or generated by code.
#[derive(Clone)]
pub enum Script {
    Text(String),
    Code(ScriptGenerator),
}

impl Script {
    pub fn text(sql: impl Into<String>) -> Self {
        Script::Text(sql.into())
    }

    pub fn code<F>(generator: F) -> Self
    where
        F: Fn(&Variables) -> Result<String> + Send + Sync + 'static,
    {
        Script::Code(Arc::new(generator))
    }

    /// Produce the final SQL and its content hash.
    ///
    /// Text scripts are hashed on their template so that changing a variable
    /// value does not make an applied script look new. Generated scripts have
    /// no template and are hashed on their output.
    pub fn render(&self, name: &str, variables: &Variables) -> Result<RenderedScript> {
        match self {
            Script::Text(template) => {
                let unresolved = variables.unresolved(template);
                if !unresolved.is_empty() {
                    debug!("Script '{}' keeps unresolved tokens: {:?}", name, unresolved);
                }
                Ok(RenderedScript {
                    sql: variables.substitute(template),
                    content_hash: content_hash(template),
                })
            }
            Script::Code(generator) => {
                let sql = generator(variables).map_err(|e| match e {
                    ReactorError::Validation(msg) => {
                        ReactorError::Validation(format!("Script '{}': {}", name, msg))
                    }
                    other => ReactorError::execution_failed(name, other),
                })?;
                let content_hash = content_hash(&sql);
                Ok(RenderedScript { sql, content_hash })
            }
        }
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Script::Text(sql) => f.debug_tuple("Text").field(sql).finish(),
            Script::Code(_) => f.write_str("Code(<generator>)"),
        }
    }
}

/// Output of [`Script::render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedScript {
    pub sql: String,
    pub content_hash: String,
}

/// A discovered script before rendering.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    /// Stable name, usually the file stem (e.g. "0001_create_users").
    pub name: String,
    /// Folder the script was found in, relative to the provider root.
    pub folder: Option<String>,
    pub upgrade: Script,
    pub downgrade: Option<Script>,
}

impl ScriptSource {
    pub fn new(name: impl Into<String>, upgrade: Script) -> Self {
        Self {
            name: name.into(),
            folder: None,
            upgrade,
            downgrade: None,
        }
    }

    /// Shorthand for a text upgrade script.
    pub fn text(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::new(name, Script::text(sql))
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn with_downgrade(mut self, downgrade: Script) -> Self {
        self.downgrade = Some(downgrade);
        self
    }
}

/// SHA-256 of the script text, hex encoded.
pub fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// Sort sources by name and reject duplicates.
pub fn order_sources(mut sources: Vec<ScriptSource>, category: &str) -> Result<Vec<ScriptSource>> {
    sources.sort_by(|a, b| a.name.cmp(&b.name));
    if let Some(pair) = sources.windows(2).find(|w| w[0].name == w[1].name) {
        return Err(ReactorError::Validation(format!(
            "Duplicate {} name '{}'",
            category, pair[0].name
        )));
    }
    Ok(sources)
}
