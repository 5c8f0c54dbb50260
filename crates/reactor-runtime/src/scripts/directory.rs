use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use tracing::debug;

use reactor_core::error::{ReactorError, Result};
use reactor_core::provider::ScriptProvider;
use reactor_core::script::{Script, ScriptSource};

/// Suffix marking a downgrade script, e.g. `0002_add_posts.down.sql`.
const DOWN_SUFFIX: &str = ".down";

/// Loads `*.sql` scripts from a directory.
pub struct DirectoryScriptProvider {
    root: PathBuf,
    recursive: bool,
}

impl DirectoryScriptProvider {
    /// Flat directory of migrations.
    pub fn migrations(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recursive: false,
        }
    }

    /// Directory tree of seeds; each script's folder is kept as metadata.
    pub fn seeds(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recursive: true,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ScriptProvider for DirectoryScriptProvider {
    fn discover(&self) -> BoxFuture<'_, Result<Vec<ScriptSource>>> {
        Box::pin(async move { load_scripts_from_dir(&self.root, self.recursive) })
    }
}

/// Load scripts from a directory.
///
/// Scripts should be named like:
/// - `0001_create_users.sql`
/// - `0002_add_posts.sql`
/// - `0002_add_posts.down.sql` (optional downgrade for `0002_add_posts`)
///
/// They are returned sorted by name. A missing directory yields no scripts.
pub fn load_scripts_from_dir(dir: &Path, recursive: bool) -> Result<Vec<ScriptSource>> {
    if !dir.exists() {
        debug!("Script directory does not exist: {:?}", dir);
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    collect_sql_files(dir, recursive, &mut files)?;

    let mut upgrades: BTreeMap<String, ScriptSource> = BTreeMap::new();
    let mut downgrades: Vec<(String, PathBuf, String)> = Vec::new();

    for path in files {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ReactorError::Config(format!("Invalid script filename: {:?}", path)))?
            .to_string();
        let sql = std::fs::read_to_string(&path)?;

        if let Some(name) = stem.strip_suffix(DOWN_SUFFIX) {
            downgrades.push((name.to_string(), path.clone(), sql));
            continue;
        }

        let mut source = ScriptSource::text(stem.clone(), sql);
        if let Some(folder) = relative_folder(dir, &path) {
            source = source.with_folder(folder);
        }
        if let Some(existing) = upgrades.insert(stem.clone(), source) {
            return Err(ReactorError::Validation(format!(
                "Duplicate script name '{}' (also in {:?})",
                existing.name,
                existing.folder.as_deref().unwrap_or(".")
            )));
        }
    }

    for (name, path, sql) in downgrades {
        let upgrade = upgrades.get_mut(&name).ok_or_else(|| {
            ReactorError::Validation(format!(
                "Downgrade script {:?} has no matching upgrade script",
                path
            ))
        })?;
        upgrade.downgrade = Some(Script::text(sql));
    }

    let scripts: Vec<ScriptSource> = upgrades.into_values().collect();
    debug!("Loaded {} scripts from {:?}", scripts.len(), dir);
    Ok(scripts)
}

fn collect_sql_files(dir: &Path, recursive: bool, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_dir() {
            if recursive {
                collect_sql_files(&path, recursive, files)?;
            }
        } else if path.extension().map(|e| e == "sql").unwrap_or(false) {
            files.push(path);
        }
    }
    Ok(())
}

/// Folder of `path` relative to `root`, `/`-separated; `None` at the root.
fn relative_folder(root: &Path, path: &Path) -> Option<String> {
    let parent = path.parent()?.strip_prefix(root).ok()?;
    let parts: Vec<String> = parent
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
