//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use crate::plugin::ManagerConfig;

/// Smallest pool that can run a version change.
const MIN_CONNECTIONS: u32 = 2;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: Option<String>,

    /// Maximum database connections in pool (default: 5).
    pub database_max_connections: u32,

    /// Plugin search roots (comma-separated `PLUGIN_PATHS`, default: ./plugins).
    pub plugin_paths: Vec<PathBuf>,

    /// Activate newly discovered plugins on first sight (default: false).
    pub plugin_auto_activate: bool,

    /// Remove a plugin's code directory on uninstall (default: false).
    pub plugin_delete_on_uninstall: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value
    /// if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());

        let database_max_connections: u32 = lookup("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "5".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;
        // A version change holds one connection for the record transaction
        // while ledger writes need another.
        if database_max_connections < MIN_CONNECTIONS {
            bail!(
                "DATABASE_MAX_CONNECTIONS must be at least {MIN_CONNECTIONS}, got {database_max_connections}: \
                 version changes hold a record transaction while writing the migration ledger"
            );
        }

        let plugin_paths: Vec<PathBuf> = lookup("PLUGIN_PATHS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();
        let plugin_paths = if plugin_paths.is_empty() {
            vec![PathBuf::from("./plugins")]
        } else {
            plugin_paths
        };

        let plugin_auto_activate = match lookup("PLUGIN_AUTO_ACTIVATE") {
            Some(v) => parse_bool(&v).context("PLUGIN_AUTO_ACTIVATE must be a boolean")?,
            None => false,
        };

        let plugin_delete_on_uninstall = match lookup("PLUGIN_DELETE_ON_UNINSTALL") {
            Some(v) => parse_bool(&v).context("PLUGIN_DELETE_ON_UNINSTALL must be a boolean")?,
            None => false,
        };

        Ok(Self {
            database_url,
            database_max_connections,
            plugin_paths,
            plugin_auto_activate,
            plugin_delete_on_uninstall,
        })
    }

    /// The database URL, required by anything that touches the store.
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL environment variable is required")
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            search_paths: self.plugin_paths.clone(),
            auto_activate: self.plugin_auto_activate,
            delete_on_uninstall: self.plugin_delete_on_uninstall,
        }
    }
}

/// Parse the usual spellings of a boolean flag.
pub fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("'{other}' is not a boolean"),
    }
}
