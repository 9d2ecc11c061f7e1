//! Plugin system for Hangar.
//!
//! This module handles:
//! - Parsing plugin descriptors from `.info.toml` files
//! - Discovering plugins under the configured search paths
//! - Resolving plugin identities to compiled-in factories
//! - Applying and reverting plugin migrations through the ledger
//! - Driving install, uninstall and version changes

pub mod cli;
mod error;
mod info_parser;
mod ledger;
mod loader;
mod manager;
mod migration;
mod registry;
mod status;
pub mod version;

pub use error::{PluginError, PluginResult};
pub use info_parser::{PluginDescriptor, find_manifest};
pub use ledger::Ledger;
pub use loader::PluginLoader;
pub use manager::{ManagerConfig, PluginManager, PluginOverview};
pub use migration::{
    MigrationRunner, MigrationStatus, MigrationStatusRow, MigrationUnit, migration_files,
};
pub use registry::PluginRegistry;
pub use status::PluginState;
