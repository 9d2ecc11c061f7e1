//! Plugin catalog: descriptors discovered under the configured search roots.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::error::{PluginError, PluginResult};
use super::info_parser::PluginDescriptor;
use super::loader::PluginLoader;

/// Descriptors keyed by plugin name (directory name).
#[derive(Debug, Default)]
pub struct PluginRegistry {
    roots: Vec<PathBuf>,
    descriptors: BTreeMap<String, PluginDescriptor>,
}

impl PluginRegistry {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            descriptors: BTreeMap::new(),
        }
    }

    /// Scan every search root, replacing the current catalog.
    ///
    /// Directories without a usable descriptor are skipped with a warning.
    /// When two roots hold the same plugin name, the first root wins.
    /// Namespace mappings of every accepted descriptor are registered with
    /// `loader`.
    pub fn scan(&mut self, loader: &mut PluginLoader) -> usize {
        self.descriptors.clear();

        for root in &self.roots {
            for dir in plugin_dirs(root) {
                let descriptor = match PluginDescriptor::parse(&dir) {
                    Ok(descriptor) => descriptor,
                    Err(e) => {
                        warn!(dir = %dir.display(), error = %e, "skipping plugin directory");
                        continue;
                    }
                };

                if self.descriptors.contains_key(&descriptor.name) {
                    warn!(
                        plugin = %descriptor.name,
                        dir = %dir.display(),
                        "plugin already discovered in an earlier root, skipping"
                    );
                    continue;
                }

                register_namespaces(loader, &descriptor);
                debug!(plugin = %descriptor.name, version = %descriptor.version, "descriptor loaded");
                self.descriptors.insert(descriptor.name.clone(), descriptor);
            }
        }

        info!(count = self.descriptors.len(), "plugin descriptors discovered");
        self.descriptors.len()
    }

    /// Re-read one plugin's descriptor from disk, replacing only that entry.
    pub fn reload(&mut self, name: &str, loader: &mut PluginLoader) -> PluginResult<&PluginDescriptor> {
        let dir = match self.descriptors.get(name) {
            Some(existing) => existing.dir.clone(),
            None => self
                .roots
                .iter()
                .map(|root| root.join(name))
                .find(|dir| dir.is_dir())
                .ok_or_else(|| PluginError::not_found(name))?,
        };

        let descriptor = PluginDescriptor::parse(&dir)?;
        register_namespaces(loader, &descriptor);
        debug!(plugin = %name, version = %descriptor.version, "descriptor reloaded");

        self.descriptors.insert(name.to_string(), descriptor);
        self.require(name)
    }

    pub fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.descriptors.get(name)
    }

    /// Like [`get`](Self::get), failing with `DescriptorNotFound`.
    pub fn require(&self, name: &str) -> PluginResult<&PluginDescriptor> {
        self.descriptors
            .get(name)
            .ok_or_else(|| PluginError::not_found(name))
    }

    pub fn remove(&mut self, name: &str) -> Option<PluginDescriptor> {
        self.descriptors.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.descriptors.values()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn register_namespaces(loader: &mut PluginLoader, descriptor: &PluginDescriptor) {
    for (namespace, path) in &descriptor.namespaces {
        loader.map_namespace(namespace, path);
    }
}

/// Immediate subdirectories of a search root, sorted by name.
fn plugin_dirs(root: &Path) -> Vec<PathBuf> {
    if !root.exists() {
        info!(root = %root.display(), "plugin search root does not exist, nothing to discover");
        return Vec::new();
    }

    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "failed to read plugin search root");
            return Vec::new();
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn write_plugin(root: &Path, name: &str, version: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(format!("{name}.info.toml")),
            format!("version = \"{version}\"\n[namespaces]\n{name} = \"src\"\n"),
        )
        .unwrap();
    }

    #[test]
    fn scan_collects_valid_plugins_and_maps_namespaces() {
        let root = tempfile::tempdir().unwrap();
        write_plugin(root.path(), "alpha", "1.0.0");
        write_plugin(root.path(), "beta", "0.2.0");
        std::fs::create_dir_all(root.path().join("empty")).unwrap();
        std::fs::write(root.path().join("stray.txt"), "not a plugin").unwrap();

        let mut loader = PluginLoader::new();
        let mut registry = PluginRegistry::new(vec![root.path().to_path_buf()]);
        assert_eq!(registry.scan(&mut loader), 2);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["alpha", "beta"]);
        assert_eq!(
            loader.namespace_path("alpha"),
            Some(root.path().join("alpha/src").as_path())
        );
    }

    #[test]
    fn first_root_wins_on_duplicate_names() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        write_plugin(first.path(), "alpha", "1.0.0");
        write_plugin(second.path(), "alpha", "9.0.0");

        let mut registry =
            PluginRegistry::new(vec![first.path().to_path_buf(), second.path().to_path_buf()]);
        registry.scan(&mut PluginLoader::new());
        assert_eq!(registry.require("alpha").unwrap().version, "1.0.0");
    }

    #[test]
    fn missing_root_is_not_an_error() {
        let mut registry = PluginRegistry::new(vec![PathBuf::from("/definitely/not/here")]);
        assert_eq!(registry.scan(&mut PluginLoader::new()), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn reload_replaces_only_one_descriptor() {
        let root = tempfile::tempdir().unwrap();
        write_plugin(root.path(), "alpha", "1.0.0");
        write_plugin(root.path(), "beta", "1.0.0");

        let mut loader = PluginLoader::new();
        let mut registry = PluginRegistry::new(vec![root.path().to_path_buf()]);
        registry.scan(&mut loader);

        write_plugin(root.path(), "alpha", "2.0.0");
        write_plugin(root.path(), "beta", "3.0.0");
        let reloaded = registry.reload("alpha", &mut loader).unwrap();
        assert_eq!(reloaded.version, "2.0.0");
        assert_eq!(registry.require("beta").unwrap().version, "1.0.0");
    }

    #[test]
    fn unknown_plugin_is_descriptor_not_found() {
        let root = tempfile::tempdir().unwrap();
        let mut registry = PluginRegistry::new(vec![root.path().to_path_buf()]);
        let err = registry.reload("ghost", &mut PluginLoader::new()).unwrap_err();
        assert!(matches!(err, PluginError::DescriptorNotFound { .. }));
        assert!(registry.require("ghost").is_err());
    }
}
