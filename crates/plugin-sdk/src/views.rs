//! View namespaces registered by plugins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Maps a view namespace to the directory holding its templates.
///
/// Views are addressed as `namespace::dotted.name`; `plans.index` in
/// namespace `ext` resolves to `<dir>/plans/index.html`.
#[derive(Debug, Default)]
pub struct ViewTable {
    namespaces: BTreeMap<String, PathBuf>,
}

impl ViewTable {
    pub fn add_namespace(&mut self, namespace: impl Into<String>, dir: impl AsRef<Path>) {
        self.namespaces
            .insert(namespace.into(), dir.as_ref().to_path_buf());
    }

    pub fn remove_namespace(&mut self, namespace: &str) -> Option<PathBuf> {
        self.namespaces.remove(namespace)
    }

    /// Template path for a qualified view name, if its namespace is registered.
    pub fn resolve(&self, view: &str) -> Option<PathBuf> {
        let (namespace, name) = view.split_once("::")?;
        let dir = self.namespaces.get(namespace)?;
        let mut path = dir.clone();
        for part in name.split('.') {
            path.push(part);
        }
        path.set_extension("html");
        Some(path)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.namespaces.clear();
    }
}
