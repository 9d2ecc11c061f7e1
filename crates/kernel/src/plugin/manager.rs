//! Plugin lifecycle manager.
//!
//! Owns the registry, the loader, the host tables and the in-memory list of
//! loaded plugin instances, and drives install / uninstall / version change
//! by composing the migration runner with the record store.
//!
//! Operations take `&mut self`, so one manager never runs two lifecycle
//! operations at once. Hosts that share a manager across tasks wrap it in a
//! mutex.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hangar_sdk::{Host, Plugin};
use tracing::{debug, error, info, warn};

use crate::schema::SchemaExecutor;
use crate::store::{MigrateStatus, PluginRecord, PluginStore, RecordUpdate};

use super::error::{PluginError, PluginResult};
use super::info_parser::PluginDescriptor;
use super::ledger::Ledger;
use super::loader::PluginLoader;
use super::migration::{MigrationRunner, MigrationStatusRow};
use super::registry::PluginRegistry;
use super::status::PluginState;
use super::version;

/// Process-wide plugin policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Directories scanned for plugin directories.
    pub search_paths: Vec<PathBuf>,
    /// New records start active, and `start` migrates loaded plugins.
    pub auto_activate: bool,
    /// Uninstall removes the plugin's base path from disk.
    pub delete_on_uninstall: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            search_paths: vec![PathBuf::from("./plugins")],
            auto_activate: false,
            delete_on_uninstall: false,
        }
    }
}

/// One row of `hangar plugin list`: a descriptor, a record, or both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginOverview {
    pub name: String,
    pub identity: String,
    /// Version declared by the descriptor, if one is present on disk.
    pub declared_version: Option<String>,
    /// Version stored in the record.
    pub installed_version: Option<String>,
    pub state: PluginState,
    pub loaded: bool,
}

struct LoadedPlugin {
    version: String,
    instance: Box<dyn Plugin>,
}

pub struct PluginManager {
    config: ManagerConfig,
    store: Arc<dyn PluginStore>,
    runner: MigrationRunner,
    registry: PluginRegistry,
    loader: PluginLoader,
    host: Host,
    /// Keyed by plugin name; iteration order is hook order.
    loaded: BTreeMap<String, LoadedPlugin>,
}

impl PluginManager {
    pub fn new(
        config: ManagerConfig,
        store: Arc<dyn PluginStore>,
        schema: Arc<dyn SchemaExecutor>,
        loader: PluginLoader,
        host: Host,
    ) -> Self {
        let runner = MigrationRunner::new(Ledger::new(store.clone()), schema);
        let registry = PluginRegistry::new(config.search_paths.clone());
        Self {
            config,
            store,
            runner,
            registry,
            loader,
            host,
            loaded: BTreeMap::new(),
        }
    }

    /// Scan the search paths without loading anything or touching records.
    ///
    /// Enough for commands that only read descriptors or run migrations.
    pub fn discover(&mut self) -> usize {
        self.registry.scan(&mut self.loader)
    }

    /// Scan the search paths and bring up every active plugin.
    ///
    /// Records are created on first sight with the auto-activate policy.
    /// Plugins that cannot be instantiated are skipped with a warning; with
    /// auto-activate on, a plugin whose migrations fail is marked failed and
    /// unloaded. Every remaining plugin is registered, then booted.
    pub async fn start(&mut self) -> PluginResult<()> {
        self.host.reset();
        self.loaded.clear();
        self.registry.scan(&mut self.loader);

        let names: Vec<String> = self.registry.names().map(str::to_string).collect();
        for name in &names {
            match self.load(name).await {
                Ok(_) => {}
                Err(e @ PluginError::Store(_)) => return Err(e),
                Err(e) => warn!(plugin = %name, error = %e, "plugin not loaded"),
            }
        }

        if self.config.auto_activate {
            let loaded: Vec<String> = self.loaded.keys().cloned().collect();
            for name in &loaded {
                match self.activate(name).await {
                    Ok(()) => {}
                    Err(e @ PluginError::Store(_)) => return Err(e),
                    Err(e) => error!(plugin = %name, error = %e, "plugin activation failed"),
                }
            }
        }

        self.register_plugins(None)?;
        self.boot_plugins(None)?;
        info!(
            discovered = self.registry.len(),
            loaded = self.loaded.len(),
            "plugin manager started"
        );
        Ok(())
    }

    /// Load the plugin's instance when its record is active.
    ///
    /// Creates the record if this is the first time the plugin is seen.
    /// Returns whether an instance is now loaded.
    pub async fn load(&mut self, name: &str) -> PluginResult<bool> {
        let descriptor = self.registry.require(name)?;
        let record = self
            .store
            .ensure_record(&descriptor.identity, self.config.auto_activate)
            .await?;

        if !record.active {
            debug!(plugin = %name, "plugin inactive, not loading");
            return Ok(false);
        }
        if record.migrate_status == MigrateStatus::Failed {
            warn!(plugin = %name, "last migration failed, not loading");
            return Ok(false);
        }

        self.instantiate(name)?;
        Ok(true)
    }

    /// Call `register` on every loaded plugin, or on `name` only.
    pub fn register_plugins(&mut self, name: Option<&str>) -> PluginResult<()> {
        for (plugin, loaded) in &self.loaded {
            if name.is_some_and(|n| n != plugin.as_str()) {
                continue;
            }
            loaded
                .instance
                .register(&mut self.host)
                .map_err(|e| PluginError::hook_failed(plugin, "register", e))?;
            debug!(plugin = %plugin, "registered plugin");
        }
        Ok(())
    }

    /// Call `boot` on every loaded plugin, or on `name` only.
    pub fn boot_plugins(&mut self, name: Option<&str>) -> PluginResult<()> {
        for (plugin, loaded) in &self.loaded {
            if name.is_some_and(|n| n != plugin.as_str()) {
                continue;
            }
            loaded
                .instance
                .boot(&mut self.host)
                .map_err(|e| PluginError::hook_failed(plugin, "boot", e))?;
            debug!(plugin = %plugin, "booted plugin");
        }
        Ok(())
    }

    /// Activate a plugin and run its pending migrations.
    ///
    /// A migration failure marks the record `failed`, drops any instance
    /// and returns the error. Hooks run only after migrations succeed.
    pub async fn install(&mut self, name: &str) -> PluginResult<()> {
        let descriptor = self.registry.require(name)?.clone();
        let record = self.store.find_record(&descriptor.identity).await?;
        if PluginState::from_record(record.as_ref()) == PluginState::Active {
            return Err(PluginError::AlreadyInstalled {
                plugin: name.to_string(),
            });
        }

        self.store
            .upsert_record(&descriptor.identity, true, Some(&descriptor.version))
            .await?;

        if let Some(stale) = self.loaded.remove(name) {
            stale
                .instance
                .unregister(&mut self.host)
                .map_err(|e| PluginError::hook_failed(name, "unregister", e))?;
        }

        if let Err(e) = self.install_steps(name, &descriptor).await {
            error!(plugin = %name, error = %e, "plugin install failed");
            self.loaded.remove(name);
            self.store
                .update_record(
                    &descriptor.identity,
                    &RecordUpdate::new().status(MigrateStatus::Failed),
                )
                .await?;
            return Err(e);
        }

        self.register_plugins(Some(name))?;
        self.boot_plugins(Some(name))?;
        info!(plugin = %name, version = %descriptor.version, "plugin installed");
        Ok(())
    }

    async fn install_steps(&mut self, name: &str, descriptor: &PluginDescriptor) -> PluginResult<()> {
        self.instantiate(name)?;
        self.runner
            .migrate(name, &descriptor.migration_dir, &descriptor.version)
            .await?;
        self.store
            .update_record(
                &descriptor.identity,
                &RecordUpdate::new().status(MigrateStatus::Success),
            )
            .await?;
        Ok(())
    }

    /// Deactivate a plugin and roll back all of its migrations.
    ///
    /// `unregister` runs before anything else; if it fails nothing else
    /// happens. Ledger entries whose unit file is gone are left behind.
    pub async fn uninstall(&mut self, name: &str) -> PluginResult<()> {
        let descriptor = self.registry.require(name)?.clone();
        if self.config.delete_on_uninstall && !descriptor.base_path.starts_with(&descriptor.dir) {
            return Err(PluginError::invalid_manifest(
                name,
                format!(
                    "base path '{}' is outside the plugin directory",
                    descriptor.base_path.display()
                ),
            ));
        }

        if let Some(loaded) = self.loaded.get(name) {
            loaded
                .instance
                .unregister(&mut self.host)
                .map_err(|e| PluginError::hook_failed(name, "unregister", e))?;
        }

        let reverted = self
            .runner
            .rollback_all(name, &descriptor.migration_dir)
            .await?;

        if self.config.delete_on_uninstall {
            if descriptor.base_path.exists() {
                std::fs::remove_dir_all(&descriptor.base_path)
                    .map_err(|e| PluginError::io(name, &descriptor.base_path, e))?;
                info!(plugin = %name, path = %descriptor.base_path.display(), "plugin code deleted");
            }
            self.registry.remove(name);
        }

        self.loaded.remove(name);
        self.store
            .update_record(
                &descriptor.identity,
                &RecordUpdate::new()
                    .active(false)
                    .status(MigrateStatus::Rollback),
            )
            .await?;

        info!(plugin = %name, reverted = reverted.len(), "plugin uninstalled");
        Ok(())
    }

    /// Move an installed plugin to `target`, migrating up or rolling back.
    ///
    /// The record writes run inside a store transaction that is rolled back
    /// on any failure. Schema changes and ledger writes are not part of that
    /// transaction, and the in-memory instance list is not restored.
    pub async fn change_version(&mut self, name: &str, target: &str) -> PluginResult<()> {
        let previous = self.registry.require(name)?.clone();
        let record = self
            .store
            .find_record(&previous.identity)
            .await?
            .ok_or_else(|| PluginError::NotInstalled {
                plugin: name.to_string(),
            })?;

        let current = record
            .version
            .clone()
            .unwrap_or_else(|| previous.version.clone());
        let target = target.trim();
        if version::compare(name, &current, target)?.is_eq() {
            return Err(PluginError::AlreadyAtVersion {
                plugin: name.to_string(),
                version: current,
            });
        }
        let upgrade = version::is_upgrade(name, &current, target)?;

        self.store.begin().await?;
        match self
            .change_version_steps(name, &previous, &current, target, upgrade)
            .await
        {
            Ok(()) => {
                self.store.commit().await?;
                info!(plugin = %name, from = %current, to = %target, upgrade, "plugin version changed");
                Ok(())
            }
            Err(e) => {
                error!(plugin = %name, from = %current, to = %target, error = %e, "plugin version change failed");
                if let Err(rollback) = self.store.rollback().await {
                    error!(plugin = %name, error = %rollback, "record rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn change_version_steps(
        &mut self,
        name: &str,
        previous: &PluginDescriptor,
        current: &str,
        target: &str,
        upgrade: bool,
    ) -> PluginResult<()> {
        self.store
            .update_record(
                &previous.identity,
                &RecordUpdate::new()
                    .version(target)
                    .status(MigrateStatus::Pending),
            )
            .await?;

        if let Some(old) = self.loaded.remove(name) {
            old.instance
                .unregister(&mut self.host)
                .map_err(|e| PluginError::hook_failed(name, "unregister", e))?;
        }

        let descriptor = self.registry.reload(name, &mut self.loader)?.clone();
        if version::compare(name, &descriptor.version, target)?.is_ne() {
            warn!(
                plugin = %name,
                declared = %descriptor.version,
                to = %target,
                "deployed descriptor declares a different version"
            );
        }
        self.instantiate(name)?;

        if upgrade {
            self.runner
                .migrate(name, &descriptor.migration_dir, target)
                .await?;
        } else {
            self.runner
                .rollback(name, &previous.migration_dir, Some(current))
                .await?;
        }

        self.register_plugins(Some(name))?;
        self.boot_plugins(Some(name))?;

        self.store
            .update_record(
                &previous.identity,
                &RecordUpdate::new()
                    .active(true)
                    .status(MigrateStatus::Success),
            )
            .await?;
        Ok(())
    }

    /// Run pending migrations for one plugin or all of them, outside the
    /// lifecycle. Records are not touched.
    ///
    /// `version` labels the new ledger entries (default: the declared
    /// version); `path` overrides the migration directory.
    pub async fn migrate(
        &mut self,
        name: Option<&str>,
        version: Option<&str>,
        path: Option<&Path>,
    ) -> PluginResult<BTreeMap<String, Vec<String>>> {
        let mut applied = BTreeMap::new();
        for descriptor in self.targets(name)? {
            let dir = path.unwrap_or(descriptor.migration_dir.as_path());
            let label = version.unwrap_or(descriptor.version.as_str());
            let units = self.runner.migrate(&descriptor.name, dir, label).await?;
            applied.insert(descriptor.name, units);
        }
        Ok(applied)
    }

    /// Roll back the latest batch of one plugin or all of them, outside the
    /// lifecycle. The version filter defaults to the declared version.
    pub async fn rollback(
        &mut self,
        name: Option<&str>,
        version: Option<&str>,
        path: Option<&Path>,
    ) -> PluginResult<BTreeMap<String, Vec<String>>> {
        let mut reverted = BTreeMap::new();
        for descriptor in self.targets(name)? {
            let dir = path.unwrap_or(descriptor.migration_dir.as_path());
            let filter = version.unwrap_or(descriptor.version.as_str());
            let units = self
                .runner
                .rollback(&descriptor.name, dir, Some(filter))
                .await?;
            reverted.insert(descriptor.name, units);
        }
        Ok(reverted)
    }

    /// Ran/pending status of each migration file of a plugin.
    pub async fn migration_status(
        &self,
        name: &str,
        path: Option<&Path>,
    ) -> PluginResult<Vec<MigrationStatusRow>> {
        let descriptor = self.registry.require(name)?;
        let dir = path.unwrap_or(descriptor.migration_dir.as_path());
        if !dir.is_dir() {
            return Err(PluginError::io(
                name,
                dir,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "migration path does not exist",
                ),
            ));
        }
        self.runner.status(name, dir).await
    }

    fn targets(&self, name: Option<&str>) -> PluginResult<Vec<PluginDescriptor>> {
        match name {
            Some(name) => Ok(vec![self.registry.require(name)?.clone()]),
            None => Ok(self.registry.iter().cloned().collect()),
        }
    }

    fn instantiate(&mut self, name: &str) -> PluginResult<()> {
        let descriptor = self.registry.require(name)?;
        let instance = self.loader.instantiate(descriptor)?;
        debug!(plugin = %name, identity = %descriptor.identity, "plugin loaded");
        self.loaded.insert(
            name.to_string(),
            LoadedPlugin {
                version: descriptor.version.clone(),
                instance,
            },
        );
        Ok(())
    }

    /// Run pending migrations for a loaded plugin and mark it active.
    async fn activate(&mut self, name: &str) -> PluginResult<()> {
        let descriptor = self.registry.require(name)?.clone();
        let record = self.store.find_record(&descriptor.identity).await?;

        if let Err(e) = self
            .runner
            .migrate(name, &descriptor.migration_dir, &descriptor.version)
            .await
        {
            self.loaded.remove(name);
            self.store
                .update_record(
                    &descriptor.identity,
                    &RecordUpdate::new().status(MigrateStatus::Failed),
                )
                .await?;
            return Err(e);
        }

        let mut update = RecordUpdate::new()
            .active(true)
            .status(MigrateStatus::Success);
        if record.is_none_or(|r| r.version.is_none()) {
            update = update.version(descriptor.version.clone());
        }
        self.store.update_record(&descriptor.identity, &update).await?;
        debug!(plugin = %name, "plugin activated");
        Ok(())
    }

    // ---- queries ----

    pub async fn state(&self, name: &str) -> PluginResult<PluginState> {
        let descriptor = self.registry.require(name)?;
        let record = self.store.find_record(&descriptor.identity).await?;
        Ok(PluginState::from_record(record.as_ref()))
    }

    pub async fn record(&self, name: &str) -> PluginResult<Option<PluginRecord>> {
        let descriptor = self.registry.require(name)?;
        Ok(self.store.find_record(&descriptor.identity).await?)
    }

    pub async fn records(&self) -> PluginResult<Vec<PluginRecord>> {
        Ok(self.store.list_records().await?)
    }

    /// Every known plugin: discovered descriptors plus orphaned records.
    pub async fn overview(&self) -> PluginResult<Vec<PluginOverview>> {
        let mut records: BTreeMap<String, PluginRecord> = self
            .store
            .list_records()
            .await?
            .into_iter()
            .map(|r| (r.identity.clone(), r))
            .collect();

        let mut rows: Vec<PluginOverview> = self
            .registry
            .iter()
            .map(|descriptor| {
                let record = records.remove(&descriptor.identity);
                PluginOverview {
                    name: descriptor.name.clone(),
                    identity: descriptor.identity.clone(),
                    declared_version: Some(descriptor.version.clone()),
                    installed_version: record.as_ref().and_then(|r| r.version.clone()),
                    state: PluginState::from_record(record.as_ref()),
                    loaded: self.loaded.contains_key(&descriptor.name),
                }
            })
            .collect();

        rows.extend(records.into_values().map(|record| PluginOverview {
            name: record
                .identity
                .rsplit("::")
                .next()
                .unwrap_or(&record.identity)
                .to_string(),
            state: PluginState::from_record(Some(&record)),
            identity: record.identity,
            declared_version: None,
            installed_version: record.version,
            loaded: false,
        }));
        Ok(rows)
    }

    pub fn loaded_names(&self) -> Vec<&str> {
        self.loaded.keys().map(String::as_str).collect()
    }

    /// Version the loaded instance was built from.
    pub fn loaded_version(&self, name: &str) -> Option<&str> {
        self.loaded.get(name).map(|l| l.version.as_str())
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains_key(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<&PluginDescriptor> {
        self.registry.get(name)
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn ledger(&self) -> &Ledger {
        self.runner.ledger()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }
}
