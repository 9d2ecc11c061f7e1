//! Explicit plugin loader.
//!
//! Plugins are compiled into the host and registered here by identity.
//! Descriptors contribute namespace mappings while the registry scans; an
//! identity only resolves once its namespace has been mapped by a
//! descriptor and a factory exists for it.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use hangar_sdk::{Plugin, PluginContext, PluginFactory};
use tracing::debug;

use super::error::{PluginError, PluginResult};
use super::info_parser::PluginDescriptor;

#[derive(Default)]
pub struct PluginLoader {
    factories: HashMap<String, PluginFactory>,
    namespaces: BTreeMap<String, PathBuf>,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the constructor for a plugin identity.
    pub fn register(&mut self, identity: impl Into<String>, factory: PluginFactory) {
        self.factories.insert(identity.into(), factory);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, identity: impl Into<String>, factory: PluginFactory) -> Self {
        self.register(identity, factory);
        self
    }

    /// Map a logical namespace to a source directory. Remapping replaces.
    pub fn map_namespace(&mut self, namespace: impl Into<String>, path: impl AsRef<Path>) {
        let namespace = namespace.into();
        let path = path.as_ref().to_path_buf();
        debug!(namespace = %namespace, path = %path.display(), "namespace mapped");
        self.namespaces.insert(namespace, path);
    }

    pub fn namespace_path(&self, namespace: &str) -> Option<&Path> {
        self.namespaces.get(namespace).map(PathBuf::as_path)
    }

    /// Construct the plugin object for a descriptor.
    pub fn instantiate(&self, descriptor: &PluginDescriptor) -> PluginResult<Box<dyn Plugin>> {
        let unresolvable = |details: String| PluginError::Unresolvable {
            plugin: descriptor.name.clone(),
            identity: descriptor.identity.clone(),
            details,
        };

        let namespace = descriptor.namespace();
        let Some(source) = self.namespace_path(namespace) else {
            return Err(unresolvable(format!("namespace '{namespace}' is not mapped")));
        };
        let factory = self
            .factories
            .get(&descriptor.identity)
            .ok_or_else(|| unresolvable("no factory registered".to_string()))?;

        let ctx = PluginContext {
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            base_path: descriptor.dir.clone(),
        };
        debug!(
            plugin = %descriptor.name,
            namespace,
            source = %source.display(),
            "instantiating plugin"
        );
        Ok(factory(&ctx))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use hangar_sdk::Host;

    struct Nop(String);

    impl Plugin for Nop {
        fn name(&self) -> &str {
            &self.0
        }
        fn register(&self, _host: &mut Host) -> anyhow::Result<()> {
            Ok(())
        }
        fn boot(&self, _host: &mut Host) -> anyhow::Result<()> {
            Ok(())
        }
        fn unregister(&self, _host: &mut Host) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn nop_factory() -> PluginFactory {
        Box::new(|ctx: &PluginContext| -> Box<dyn Plugin> { Box::new(Nop(ctx.name.clone())) })
    }

    fn descriptor() -> PluginDescriptor {
        PluginDescriptor::parse_str(
            "version = \"1.0.0\"\nentry = \"sample::Sample\"\n[namespaces]\nsample = \"src\"",
            Path::new("/p/sample"),
        )
        .unwrap()
    }

    #[test]
    fn instantiate_requires_mapping_and_factory() {
        let desc = descriptor();
        let mut loader = PluginLoader::new();

        let err = loader.instantiate(&desc).err().unwrap();
        assert!(err.to_string().contains("namespace 'sample' is not mapped"));

        loader.map_namespace("sample", "/p/sample/src");
        let err = loader.instantiate(&desc).err().unwrap();
        assert!(err.to_string().contains("no factory"));

        loader.register("sample::Sample", nop_factory());
        let plugin = loader.instantiate(&desc).unwrap();
        assert_eq!(plugin.name(), "sample");
    }

    #[test]
    fn remapping_replaces_path() {
        let mut loader = PluginLoader::new();
        loader.map_namespace("sample", "/old");
        loader.map_namespace("sample", "/new");
        assert_eq!(loader.namespace_path("sample"), Some(Path::new("/new")));
    }
}
