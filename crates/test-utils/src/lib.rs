//! Hangar test utilities.
//!
//! Helpers for integration testing: plugin directory fixtures, migration
//! file writers, and a sample plugin that journals its hook calls.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::bail;
use hangar_sdk::prelude::*;
use parking_lot::Mutex;
use serde::Serialize;

/// Descriptor file contents, as written to `<name>.info.toml`.
#[derive(Debug, Serialize)]
struct InfoFile<'a> {
    name: &'a str,
    version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    entry: Option<&'a str>,
    migrations: &'a str,
    namespaces: &'a BTreeMap<String, String>,
}

/// Builder for a plugin directory under a search root.
#[derive(Debug, Clone)]
pub struct PluginFixture {
    root: PathBuf,
    name: String,
    version: String,
    entry: Option<String>,
    migrations: String,
    namespaces: BTreeMap<String, String>,
}

impl PluginFixture {
    /// A plugin `name` at version 1.0.0 whose namespace is its own name.
    pub fn new(root: impl AsRef<Path>, name: &str) -> Self {
        let mut namespaces = BTreeMap::new();
        namespaces.insert(name.to_string(), "src".to_string());
        Self {
            root: root.as_ref().to_path_buf(),
            name: name.to_string(),
            version: "1.0.0".to_string(),
            entry: None,
            migrations: "migrations".to_string(),
            namespaces,
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Set the identity the loader instantiates.
    pub fn with_entry(mut self, entry: &str) -> Self {
        self.entry = Some(entry.to_string());
        self
    }

    /// Relative migration directory (default: `migrations`).
    pub fn with_migrations_dir(mut self, dir: &str) -> Self {
        self.migrations = dir.to_string();
        self
    }

    /// Drop all namespace mappings, leaving the identity unresolvable.
    pub fn without_namespaces(mut self) -> Self {
        self.namespaces.clear();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity the kernel will key the plugin's record on.
    pub fn identity(&self) -> String {
        self.entry
            .clone()
            .unwrap_or_else(|| format!("{0}::{0}", self.name))
    }

    pub fn dir(&self) -> PathBuf {
        self.root.join(&self.name)
    }

    pub fn migration_dir(&self) -> PathBuf {
        self.dir().join(&self.migrations)
    }

    /// Write (or overwrite) the descriptor and create the migration directory.
    pub fn write(&self) -> io::Result<PathBuf> {
        let dir = self.dir();
        std::fs::create_dir_all(self.migration_dir())?;

        let info = InfoFile {
            name: &self.name,
            version: &self.version,
            entry: self.entry.as_deref(),
            migrations: &self.migrations,
            namespaces: &self.namespaces,
        };
        let content = toml::to_string(&info).map_err(io::Error::other)?;
        std::fs::write(dir.join(format!("{}.info.toml", self.name)), content)?;
        Ok(dir)
    }

    /// Write a migration unit into this plugin's migration directory.
    pub fn migration(&self, file: &str, up: &str, down: &str) -> io::Result<PathBuf> {
        write_migration(&self.migration_dir(), file, up, down)
    }

    /// Write a unit creating `table` and dropping it on rollback.
    pub fn table_migration(&self, file: &str, table: &str) -> io::Result<PathBuf> {
        create_table_migration(&self.migration_dir(), file, table)
    }
}

/// Write a migration file with up and down sections.
pub fn write_migration(dir: &Path, file: &str, up: &str, down: &str) -> io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(file);
    std::fs::write(
        &path,
        format!("-- migrate:up\n{up}\n-- migrate:down\n{down}\n"),
    )?;
    Ok(path)
}

/// Write a migration creating `table` (`id BIGINT PRIMARY KEY`).
pub fn create_table_migration(dir: &Path, file: &str, table: &str) -> io::Result<PathBuf> {
    write_migration(
        dir,
        file,
        &format!("CREATE TABLE {table} (id BIGINT PRIMARY KEY);"),
        &format!("DROP TABLE {table};"),
    )
}

/// Shared record of hook calls, in call order.
///
/// Entries look like `sample:register@1.0.0`.
#[derive(Debug, Clone, Default)]
pub struct HookJournal(Arc<Mutex<Vec<String>>>);

impl HookJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Hooks called for one plugin, without the version suffix.
    pub fn hooks_for(&self, plugin: &str) -> Vec<String> {
        let prefix = format!("{plugin}:");
        self.0
            .lock()
            .iter()
            .filter_map(|e| e.strip_prefix(&prefix))
            .map(|e| e.split('@').next().unwrap_or(e).to_string())
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    fn push(&self, plugin: &str, hook: &str, version: &str) {
        self.0.lock().push(format!("{plugin}:{hook}@{version}"));
    }
}

/// Service interface every sample plugin binds as `sample.<name>`.
pub fn sample_service(plugin: &str) -> String {
    format!("sample.{plugin}")
}

/// A plugin that binds a service, mounts one route and one view namespace
/// under its own name, and journals every hook call.
pub struct SamplePlugin {
    name: String,
    version: String,
    dir: PathBuf,
    journal: HookJournal,
    fail_on: Option<&'static str>,
}

impl SamplePlugin {
    pub fn factory(journal: HookJournal) -> PluginFactory {
        Self::build(journal, None)
    }

    /// A sample plugin whose `hook` returns an error.
    pub fn failing_factory(journal: HookJournal, hook: &'static str) -> PluginFactory {
        Self::build(journal, Some(hook))
    }

    fn build(journal: HookJournal, fail_on: Option<&'static str>) -> PluginFactory {
        Box::new(move |ctx: &PluginContext| -> Box<dyn Plugin> {
            Box::new(SamplePlugin {
                name: ctx.name.clone(),
                version: ctx.version.clone(),
                dir: ctx.base_path.clone(),
                journal: journal.clone(),
                fail_on,
            })
        })
    }

    fn enter(&self, hook: &'static str) -> anyhow::Result<()> {
        self.journal.push(&self.name, hook, &self.version);
        if self.fail_on == Some(hook) {
            bail!("{} refused to {hook}", self.name);
        }
        Ok(())
    }
}

impl Plugin for SamplePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn register(&self, host: &mut Host) -> anyhow::Result<()> {
        self.enter("register")?;
        host.services
            .bind(sample_service(&self.name), format!("{}@{}", self.name, self.version));
        Ok(())
    }

    fn boot(&self, host: &mut Host) -> anyhow::Result<()> {
        self.enter("boot")?;
        host.routes
            .mount(&self.name, &self.name, [Route::get("/", "index")]);
        host.views.add_namespace(&self.name, self.dir.join("views"));
        Ok(())
    }

    fn unregister(&self, host: &mut Host) -> anyhow::Result<()> {
        self.enter("unregister")?;
        host.detach_namespace(&self.name);
        host.services.restore_default(&sample_service(&self.name));
        Ok(())
    }
}
