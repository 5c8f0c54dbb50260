use super::{Script, ScriptSource};
use crate::error::Result;
use crate::variables::Variables;

/// A migration ready to apply.
///
/// Identity is the content hash of the upgrade script, not the name: editing
/// the body of an applied migration yields a new, pending migration.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Unique name (e.g., "0001_create_users").
    pub name: String,
    /// Rendered upgrade SQL.
    pub upgrade_sql: String,
    /// Hash of the upgrade script.
    pub content_hash: String,
    /// Downgrade script as discovered, rendered only when a downgrade runs.
    pub downgrade: Option<Script>,
}

impl Migration {
    /// Build a migration from a text upgrade script.
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        let upgrade_sql = sql.into();
        Self {
            name: name.into(),
            content_hash: super::content_hash(&upgrade_sql),
            upgrade_sql,
            downgrade: None,
        }
    }

    /// Render a discovered source against the run's variables.
    pub fn prepare(source: &ScriptSource, variables: &Variables) -> Result<Self> {
        let rendered = source.upgrade.render(&source.name, variables)?;
        Ok(Self {
            name: source.name.clone(),
            upgrade_sql: rendered.sql,
            content_hash: rendered.content_hash,
            downgrade: source.downgrade.clone(),
        })
    }

    pub fn with_downgrade(mut self, downgrade: Script) -> Self {
        self.downgrade = Some(downgrade);
        self
    }

    /// Whether the provider supplied a downgrade script.
    pub fn supports_downgrade(&self) -> bool {
        self.downgrade.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_new() {
        let m = Migration::new("test", "SELECT 1");
        assert_eq!(m.name, "test");
        assert_eq!(m.upgrade_sql, "SELECT 1");
        assert_eq!(m.content_hash, super::super::content_hash("SELECT 1"));
        assert!(!m.supports_downgrade());
    }

    #[test]
    fn test_prepare_substitutes_and_keeps_downgrade() {
        let source = ScriptSource::text("0001_init", "CREATE TABLE ${Schema}.t (id INT)")
            .with_downgrade(Script::text("DROP TABLE ${Schema}.t"));
        let vars = Variables::new([("Schema", "app")]);

        let m = Migration::prepare(&source, &vars).unwrap();
        assert_eq!(m.upgrade_sql, "CREATE TABLE app.t (id INT)");
        assert!(m.supports_downgrade());
    }
}
