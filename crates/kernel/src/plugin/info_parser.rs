//! Parser for plugin `.info.toml` descriptor files.
//!
//! Each plugin directory holds exactly one `{name}.info.toml` declaring:
//! - version (required) and an optional description
//! - `entry`, the identity the loader instantiates and the record store keys on
//! - where the migrations and the deletable base path live
//! - namespace mappings registered with the loader

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use super::error::{PluginError, PluginResult};
use super::version::parse_version;

const MANIFEST_SUFFIX: &str = ".info.toml";

/// On-disk shape of the descriptor file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InfoFile {
    name: Option<String>,
    description: Option<String>,
    version: String,
    entry: Option<String>,
    base_path: Option<PathBuf>,
    migrations: Option<PathBuf>,
    #[serde(default)]
    namespaces: BTreeMap<String, PathBuf>,
}

/// A parsed plugin descriptor. Paths are resolved against the plugin directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    /// Plugin machine name (the directory name).
    pub name: String,
    pub description: Option<String>,
    /// Declared version, as written in the file.
    pub version: String,
    /// Fully-qualified identity, e.g. `extended_plan::ExtendedPlan`.
    pub identity: String,
    /// Directory the descriptor was read from.
    pub dir: PathBuf,
    /// Directory removed when code is deleted on uninstall.
    pub base_path: PathBuf,
    pub migration_dir: PathBuf,
    /// Logical namespace -> source directory.
    pub namespaces: BTreeMap<String, PathBuf>,
}

impl PluginDescriptor {
    /// Locate and parse the descriptor inside `dir`.
    pub fn parse(dir: &Path) -> PluginResult<Self> {
        let manifest = find_manifest(dir)?;
        let content = std::fs::read_to_string(&manifest)
            .map_err(|e| PluginError::io(dir_name(dir), &manifest, e))?;
        Self::parse_str(&content, dir)
    }

    /// Parse descriptor TOML for a plugin living in `dir`.
    pub fn parse_str(content: &str, dir: &Path) -> PluginResult<Self> {
        let name = dir_name(dir);
        let info: InfoFile = toml::from_str(content)
            .map_err(|e| PluginError::invalid_manifest(&name, e.to_string()))?;

        Self::validate(&name, &info)?;

        let identity = info.entry.unwrap_or_else(|| format!("{name}::{name}"));
        let base_path = match info.base_path {
            Some(path) => dir.join(path),
            None => dir.to_path_buf(),
        };
        let migration_dir = dir.join(info.migrations.unwrap_or_else(|| PathBuf::from("migrations")));
        let namespaces = info
            .namespaces
            .into_iter()
            .map(|(ns, path)| (ns, dir.join(path)))
            .collect();

        Ok(Self {
            name,
            description: info.description,
            version: info.version.trim().to_string(),
            identity,
            dir: dir.to_path_buf(),
            base_path,
            migration_dir,
            namespaces,
        })
    }

    fn validate(name: &str, info: &InfoFile) -> PluginResult<()> {
        if let Some(declared) = &info.name
            && declared != name
        {
            return Err(PluginError::invalid_manifest(
                name,
                format!("'name' is '{declared}' but the directory is '{name}'"),
            ));
        }

        if info.version.trim().is_empty() {
            return Err(PluginError::invalid_manifest(name, "empty 'version' field"));
        }
        parse_version(name, &info.version)?;

        if let Some(entry) = &info.entry {
            let valid = entry
                .rsplit_once("::")
                .is_some_and(|(ns, class)| !ns.is_empty() && !class.is_empty())
                && !entry.contains(char::is_whitespace);
            if !valid {
                return Err(PluginError::invalid_manifest(
                    name,
                    format!("'entry' must look like 'namespace::Name', got '{entry}'"),
                ));
            }
        }

        if info.namespaces.keys().any(|ns| ns.trim().is_empty()) {
            return Err(PluginError::invalid_manifest(name, "empty namespace key"));
        }

        let paths = info
            .base_path
            .iter()
            .map(|p| ("base_path", p))
            .chain(info.migrations.iter().map(|p| ("migrations", p)))
            .chain(info.namespaces.values().map(|p| ("namespaces", p)));
        for (field, path) in paths {
            if !is_contained(path) {
                return Err(PluginError::invalid_manifest(
                    name,
                    format!(
                        "'{field}' path '{}' must stay inside the plugin directory",
                        path.display()
                    ),
                ));
            }
        }

        Ok(())
    }

    /// Namespace of the identity: everything before the last `::`.
    pub fn namespace(&self) -> &str {
        self.identity
            .rsplit_once("::")
            .map_or(self.identity.as_str(), |(ns, _)| ns)
    }
}

/// Find the single `.info.toml` file in a plugin directory.
pub fn find_manifest(dir: &Path) -> PluginResult<PathBuf> {
    let entries = std::fs::read_dir(dir).map_err(|e| PluginError::io(dir_name(dir), dir, e))?;

    let mut manifests: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(MANIFEST_SUFFIX))
        })
        .collect();

    match manifests.len() {
        0 => Err(PluginError::missing_manifest(dir)),
        1 => Ok(manifests.remove(0)),
        _ => Err(PluginError::MultipleManifests {
            path: dir.display().to_string(),
        }),
    }
}

/// Relative, with no `..` components.
fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}
