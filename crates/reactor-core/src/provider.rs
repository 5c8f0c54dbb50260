use std::sync::RwLock;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::script::{Migration, Script, ScriptSource};

/// Supplies the scripts of one category (migrations or seeds).
pub trait ScriptProvider: Send + Sync {
    /// Discover scripts. Order is not significant; the engine sorts by name.
    fn discover(&self) -> BoxFuture<'_, Result<Vec<ScriptSource>>>;
}

/// Locates the downgrade script for an applied migration.
pub trait DowngradeResolver: Send + Sync {
    fn resolve(&self, migration: &Migration) -> Option<Script>;
}

/// Resolves the downgrade script discovered alongside the migration.
#[derive(Debug, Clone, Copy, Default)]
pub struct PairedDowngradeResolver;

impl DowngradeResolver for PairedDowngradeResolver {
    fn resolve(&self, migration: &Migration) -> Option<Script> {
        migration.downgrade.clone()
    }
}

/// Scripts registered in code, including generated ones.
///
/// # Example
///
/// ```ignore
/// let provider = StaticScriptProvider::new()
///     .script(ScriptSource::text("0001_init", "CREATE TABLE t (id INT)"))
///     .script(ScriptSource::new(
///         "0002_fill",
///         Script::code(|vars| Ok(format!("INSERT INTO t VALUES ({})", vars.require_int("Start")?))),
///     ));
/// ```
#[derive(Debug, Default)]
pub struct StaticScriptProvider {
    scripts: RwLock<Vec<ScriptSource>>,
}

impl StaticScriptProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, source: ScriptSource) -> Self {
        self.push(source);
        self
    }

    /// Register a script on a shared provider.
    pub fn push(&self, source: ScriptSource) {
        self.scripts.write().unwrap().push(source);
    }

    /// Replace the script registered under `source.name`, or add it.
    pub fn replace(&self, source: ScriptSource) {
        let mut scripts = self.scripts.write().unwrap();
        scripts.retain(|s| s.name != source.name);
        scripts.push(source);
    }

    pub fn remove(&self, name: &str) {
        self.scripts.write().unwrap().retain(|s| s.name != name);
    }

    pub fn len(&self) -> usize {
        self.scripts.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ScriptProvider for StaticScriptProvider {
    fn discover(&self) -> BoxFuture<'_, Result<Vec<ScriptSource>>> {
        let scripts = self.scripts.read().unwrap().clone();
        Box::pin(async move { Ok(scripts) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider_replace() {
        let provider = StaticScriptProvider::new()
            .script(ScriptSource::text("0001_a", "SELECT 1"))
            .script(ScriptSource::text("0002_b", "SELECT 2"));
        provider.replace(ScriptSource::text("0001_a", "SELECT 10"));

        assert_eq!(provider.len(), 2);
        let scripts = provider.discover().await.unwrap();
        assert_eq!(scripts.len(), 2);
        let a = scripts.iter().find(|s| s.name == "0001_a").unwrap();
        assert!(matches!(&a.upgrade, Script::Text(sql) if sql == "SELECT 10"));
    }

    #[test]
    fn test_paired_resolver() {
        let plain = Migration::new("0001_a", "CREATE TABLE a (id INT)");
        assert!(PairedDowngradeResolver.resolve(&plain).is_none());

        let reversible = plain.with_downgrade(Script::text("DROP TABLE a"));
        assert!(PairedDowngradeResolver.resolve(&reversible).is_some());
    }
}
