#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]
//! Shared harness for kernel integration tests.
//!
//! Builds a [`PluginManager`] over the in-memory store and schema, with a
//! temporary search root and [`SamplePlugin`] factories registered for the
//! requested plugin names.

use std::sync::Arc;

use hangar_kernel::plugin::{ManagerConfig, PluginLoader, PluginManager};
use hangar_kernel::schema::MemorySchema;
use hangar_kernel::store::{MemoryStore, MigrationEntry, PluginRecord, PluginStore};
use hangar_sdk::{Host, ServiceRegistry};
use hangar_test_utils::{HookJournal, PluginFixture, SamplePlugin};
use tempfile::TempDir;

pub const PLAN_SERVICE: &str = "plan";
pub const SIMPLE_PLAN: &str = "hangar::SimplePlanService";

#[derive(Default)]
pub struct HarnessBuilder {
    plugins: Vec<(String, Option<&'static str>)>,
    auto_activate: bool,
    delete_on_uninstall: bool,
}

impl HarnessBuilder {
    /// Register a sample plugin factory for `name::name`.
    pub fn plugin(mut self, name: &str) -> Self {
        self.plugins.push((name.to_string(), None));
        self
    }

    /// Register a sample plugin whose `hook` fails.
    pub fn failing_plugin(mut self, name: &str, hook: &'static str) -> Self {
        self.plugins.push((name.to_string(), Some(hook)));
        self
    }

    pub fn auto_activate(mut self) -> Self {
        self.auto_activate = true;
        self
    }

    pub fn delete_on_uninstall(mut self) -> Self {
        self.delete_on_uninstall = true;
        self
    }

    pub fn build(self) -> Harness {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let schema = Arc::new(MemorySchema::new());
        let journal = HookJournal::new();
        let config = ManagerConfig {
            search_paths: vec![root.path().to_path_buf()],
            auto_activate: self.auto_activate,
            delete_on_uninstall: self.delete_on_uninstall,
        };
        let manager = new_manager(&config, &self.plugins, &store, &schema, &journal);
        Harness {
            root,
            store,
            schema,
            journal,
            config,
            plugins: self.plugins,
            manager,
        }
    }
}

pub struct Harness {
    pub root: TempDir,
    pub store: Arc<MemoryStore>,
    pub schema: Arc<MemorySchema>,
    pub journal: HookJournal,
    pub config: ManagerConfig,
    plugins: Vec<(String, Option<&'static str>)>,
    pub manager: PluginManager,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// Fixture for a plugin directory under this harness's search root.
    pub fn fixture(&self, name: &str) -> PluginFixture {
        PluginFixture::new(self.root.path(), name)
    }

    /// Replace the manager with a fresh one over the same store, schema and
    /// search root, as a new process would see them. Does not call `start`.
    pub fn restart(&mut self) {
        self.manager = new_manager(
            &self.config,
            &self.plugins,
            &self.store,
            &self.schema,
            &self.journal,
        );
    }

    pub async fn record(&self, name: &str) -> Option<PluginRecord> {
        self.store
            .find_record(&format!("{name}::{name}"))
            .await
            .unwrap()
    }

    /// Ledger entries for a plugin, oldest first.
    pub async fn entries(&self, plugin: &str) -> Vec<MigrationEntry> {
        let mut entries = self.store.list_entries(plugin, None).await.unwrap();
        entries.reverse();
        entries
    }

    pub async fn entry_names(&self, plugin: &str) -> Vec<String> {
        self.entries(plugin)
            .await
            .into_iter()
            .map(|e| e.migration)
            .collect()
    }
}

fn new_manager(
    config: &ManagerConfig,
    plugins: &[(String, Option<&'static str>)],
    store: &Arc<MemoryStore>,
    schema: &Arc<MemorySchema>,
    journal: &HookJournal,
) -> PluginManager {
    let mut loader = PluginLoader::new();
    for (name, fail_on) in plugins {
        let factory = match fail_on {
            Some(hook) => SamplePlugin::failing_factory(journal.clone(), hook),
            None => SamplePlugin::factory(journal.clone()),
        };
        loader.register(format!("{name}::{name}"), factory);
    }

    PluginManager::new(
        config.clone(),
        store.clone(),
        schema.clone(),
        loader,
        Host::new(ServiceRegistry::new().with_default(PLAN_SERVICE, SIMPLE_PLAN)),
    )
}
