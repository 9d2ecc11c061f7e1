//! Plugin lifecycle error types.
//!
//! Every variant names the plugin (or path) involved so the message that
//! reaches the operator is enough to locate the problem.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::schema::SchemaError;
use crate::store::StoreError;

/// Errors raised by the registry, the migration runner and the lifecycle
/// manager.
#[derive(Debug, Error)]
pub enum PluginError {
    /// No descriptor is registered under the requested name.
    #[error("plugin configuration not found: {plugin}")]
    DescriptorNotFound { plugin: String },

    /// Plugin directory is missing the .info.toml manifest file.
    #[error("plugin '{plugin}': no .info.toml manifest found in {path}")]
    MissingManifest { plugin: String, path: String },

    /// Multiple .info.toml files found in plugin directory.
    #[error("plugin directory '{path}': multiple .info.toml files found, expected exactly one")]
    MultipleManifests { path: String },

    /// The .info.toml file could not be parsed or failed validation.
    #[error("plugin '{plugin}': invalid manifest: {details}")]
    InvalidManifest { plugin: String, details: String },

    /// A version string is not a dotted `major.minor.patch` triplet.
    #[error("plugin '{plugin}': invalid version '{version}': {details}")]
    InvalidVersion {
        plugin: String,
        version: String,
        details: String,
    },

    #[error("plugin '{plugin}' is already installed")]
    AlreadyInstalled { plugin: String },

    #[error("plugin '{plugin}' is not installed")]
    NotInstalled { plugin: String },

    #[error("plugin '{plugin}' is already at version {version}")]
    AlreadyAtVersion { plugin: String, version: String },

    /// A migration unit's forward or reverse action failed.
    #[error("plugin '{plugin}': migration '{migration}' failed: {source}")]
    MigrationFailed {
        plugin: String,
        migration: String,
        #[source]
        source: SchemaError,
    },

    /// The ledger already holds an applied entry for this unit.
    #[error("plugin '{plugin}': migration '{migration}' is already recorded")]
    DuplicateMigrationEntry { plugin: String, migration: String },

    /// No factory, or no namespace mapping, for the plugin's identity.
    #[error("plugin '{plugin}': cannot resolve '{identity}': {details}")]
    Unresolvable {
        plugin: String,
        identity: String,
        details: String,
    },

    /// A register/boot/unregister hook returned an error.
    #[error("plugin '{plugin}': {hook} hook failed: {source}")]
    HookFailed {
        plugin: String,
        hook: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("plugin '{plugin}': i/o error at {}: {source}", .path.display())]
    Io {
        plugin: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type PluginResult<T> = Result<T, PluginError>;

impl PluginError {
    pub fn not_found(plugin: impl Into<String>) -> Self {
        Self::DescriptorNotFound {
            plugin: plugin.into(),
        }
    }

    /// Create a missing manifest error.
    pub fn missing_manifest(path: &Path) -> Self {
        let plugin = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        Self::MissingManifest {
            plugin,
            path: path.display().to_string(),
        }
    }

    pub fn invalid_manifest(plugin: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidManifest {
            plugin: plugin.into(),
            details: details.into(),
        }
    }

    pub fn migration_failed(
        plugin: impl Into<String>,
        migration: impl Into<String>,
        source: SchemaError,
    ) -> Self {
        Self::MigrationFailed {
            plugin: plugin.into(),
            migration: migration.into(),
            source,
        }
    }

    pub fn hook_failed(plugin: impl Into<String>, hook: &'static str, source: anyhow::Error) -> Self {
        Self::HookFailed {
            plugin: plugin.into(),
            hook,
            source: source.into(),
        }
    }

    pub fn io(plugin: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            plugin: plugin.into(),
            path: path.into(),
            source,
        }
    }

    /// Configuration and state errors leave every record untouched.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::DescriptorNotFound { .. }
                | Self::MissingManifest { .. }
                | Self::MultipleManifests { .. }
                | Self::InvalidManifest { .. }
                | Self::InvalidVersion { .. }
                | Self::AlreadyInstalled { .. }
                | Self::NotInstalled { .. }
                | Self::AlreadyAtVersion { .. }
        )
    }
}
