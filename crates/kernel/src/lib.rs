//! Hangar Kernel Library
//!
//! Plugin discovery, the plugin record store, the migration ledger and the
//! lifecycle manager. The `hangar` binary is a thin CLI over this crate.

pub mod config;
pub mod db;
pub mod plugin;
pub mod schema;
pub mod store;
