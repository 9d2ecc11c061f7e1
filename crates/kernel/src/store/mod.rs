//! Persistent plugin state: the `plugins` record table and the
//! `plugin_migrations` ledger table.
//!
//! Every read and write goes through [`PluginStore`], so the lifecycle code
//! runs unchanged against PostgreSQL ([`PgStore`]) or the in-process
//! [`MemoryStore`].
//!
//! # Transactions
//!
//! `begin`/`commit`/`rollback` scope **record** writes only. Ledger writes
//! always commit immediately, because the schema changes they describe are
//! not transactional in the host database either.

mod memory;
mod postgres;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("transaction error: {0}")]
    Transaction(&'static str),

    #[error("corrupt row in '{table}': {details}")]
    Corrupt { table: &'static str, details: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Migration status of a plugin record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrateStatus {
    Pending,
    Success,
    Failed,
    Rollback,
}

impl MigrateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Rollback => "rollback",
        }
    }
}

impl fmt::Display for MigrateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrateStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "rollback" => Ok(Self::Rollback),
            other => Err(StoreError::Corrupt {
                table: "plugins",
                details: format!("unknown migrate_status '{other}'"),
            }),
        }
    }
}

/// A row from the `plugins` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRecord {
    pub id: i64,
    /// Fully-qualified plugin identity (unique).
    pub identity: String,
    pub version: Option<String>,
    pub active: bool,
    pub migrate_status: MigrateStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Partial update of a plugin record. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    pub version: Option<String>,
    pub active: Option<bool>,
    pub migrate_status: Option<MigrateStatus>,
}

impl RecordUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn status(mut self, status: MigrateStatus) -> Self {
        self.migrate_status = Some(status);
        self
    }
}

/// A row from the `plugin_migrations` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationEntry {
    pub id: i64,
    pub plugin: String,
    pub migration: String,
    /// Plugin version the unit ran under.
    pub version: String,
    pub batch: i64,
    pub created_at: i64,
}

/// Storage backend for plugin records and the migration ledger.
#[async_trait]
pub trait PluginStore: Send + Sync {
    // ---- plugins ----

    async fn find_record(&self, identity: &str) -> StoreResult<Option<PluginRecord>>;

    /// All records, ordered by identity.
    async fn list_records(&self) -> StoreResult<Vec<PluginRecord>>;

    /// Return the record for `identity`, creating it (`pending`, with the
    /// given `active` flag and no version) when absent.
    async fn ensure_record(&self, identity: &str, active: bool) -> StoreResult<PluginRecord>;

    /// Create or overwrite the record with `active`, `version` and a
    /// `pending` migrate status.
    async fn upsert_record(
        &self,
        identity: &str,
        active: bool,
        version: Option<&str>,
    ) -> StoreResult<PluginRecord>;

    /// Apply a partial update. Returns false when no record matched.
    async fn update_record(&self, identity: &str, update: &RecordUpdate) -> StoreResult<bool>;

    // ---- plugin_migrations ----

    async fn has_run(&self, plugin: &str, migration: &str) -> StoreResult<bool>;

    /// Highest batch recorded for the plugin, optionally among entries of one version.
    async fn max_batch(&self, plugin: &str, version: Option<&str>) -> StoreResult<Option<i64>>;

    async fn insert_entry(
        &self,
        plugin: &str,
        migration: &str,
        version: &str,
        batch: i64,
    ) -> StoreResult<MigrationEntry>;

    /// Delete one entry by id. Returns false when it did not exist.
    async fn delete_entry(&self, plugin: &str, id: i64) -> StoreResult<bool>;

    /// Entries for a plugin, optionally of one version, newest id first.
    async fn list_entries(
        &self,
        plugin: &str,
        version: Option<&str>,
    ) -> StoreResult<Vec<MigrationEntry>>;

    // ---- record transaction ----

    async fn begin(&self) -> StoreResult<()>;

    async fn commit(&self) -> StoreResult<()>;

    async fn rollback(&self) -> StoreResult<()>;
}
