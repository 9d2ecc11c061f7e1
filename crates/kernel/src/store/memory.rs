//! In-process store backend.
//!
//! Used by tests and by hosts that keep plugin state for the lifetime of
//! one process. `begin` snapshots the record table and `rollback` restores
//! it; ledger entries are never part of the snapshot.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    MigrateStatus, MigrationEntry, PluginRecord, PluginStore, RecordUpdate, StoreError,
    StoreResult,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<String, PluginRecord>,
    last_record_id: i64,
    entries: Vec<MigrationEntry>,
    last_entry_id: i64,
    snapshot: Option<Snapshot>,
}

#[derive(Debug)]
struct Snapshot {
    records: BTreeMap<String, PluginRecord>,
    last_record_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a record transaction is currently open.
    pub fn in_transaction(&self) -> bool {
        self.inner.lock().snapshot.is_some()
    }
}

impl Inner {
    fn insert_record(&mut self, identity: &str, active: bool, version: Option<&str>) -> PluginRecord {
        let now = chrono::Utc::now().timestamp();
        self.last_record_id += 1;
        let record = PluginRecord {
            id: self.last_record_id,
            identity: identity.to_string(),
            version: version.map(str::to_string),
            active,
            migrate_status: MigrateStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.records.insert(identity.to_string(), record.clone());
        record
    }
}

#[async_trait]
impl PluginStore for MemoryStore {
    async fn find_record(&self, identity: &str) -> StoreResult<Option<PluginRecord>> {
        Ok(self.inner.lock().records.get(identity).cloned())
    }

    async fn list_records(&self) -> StoreResult<Vec<PluginRecord>> {
        Ok(self.inner.lock().records.values().cloned().collect())
    }

    async fn ensure_record(&self, identity: &str, active: bool) -> StoreResult<PluginRecord> {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.records.get(identity) {
            return Ok(record.clone());
        }
        Ok(inner.insert_record(identity, active, None))
    }

    async fn upsert_record(
        &self,
        identity: &str,
        active: bool,
        version: Option<&str>,
    ) -> StoreResult<PluginRecord> {
        let mut inner = self.inner.lock();
        let Some(record) = inner.records.get_mut(identity) else {
            return Ok(inner.insert_record(identity, active, version));
        };
        record.active = active;
        record.version = version.map(str::to_string);
        record.migrate_status = MigrateStatus::Pending;
        record.updated_at = chrono::Utc::now().timestamp();
        Ok(record.clone())
    }

    async fn update_record(&self, identity: &str, update: &RecordUpdate) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        let Some(record) = inner.records.get_mut(identity) else {
            return Ok(false);
        };
        if let Some(version) = &update.version {
            record.version = Some(version.clone());
        }
        if let Some(active) = update.active {
            record.active = active;
        }
        if let Some(status) = update.migrate_status {
            record.migrate_status = status;
        }
        record.updated_at = chrono::Utc::now().timestamp();
        Ok(true)
    }

    async fn has_run(&self, plugin: &str, migration: &str) -> StoreResult<bool> {
        Ok(self
            .inner
            .lock()
            .entries
            .iter()
            .any(|e| e.plugin == plugin && e.migration == migration))
    }

    async fn max_batch(&self, plugin: &str, version: Option<&str>) -> StoreResult<Option<i64>> {
        Ok(self
            .inner
            .lock()
            .entries
            .iter()
            .filter(|e| e.plugin == plugin && version.is_none_or(|v| e.version == v))
            .map(|e| e.batch)
            .max())
    }

    async fn insert_entry(
        &self,
        plugin: &str,
        migration: &str,
        version: &str,
        batch: i64,
    ) -> StoreResult<MigrationEntry> {
        let mut inner = self.inner.lock();
        inner.last_entry_id += 1;
        let entry = MigrationEntry {
            id: inner.last_entry_id,
            plugin: plugin.to_string(),
            migration: migration.to_string(),
            version: version.to_string(),
            batch,
            created_at: chrono::Utc::now().timestamp(),
        };
        inner.entries.push(entry.clone());
        Ok(entry)
    }

    async fn delete_entry(&self, plugin: &str, id: i64) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|e| !(e.id == id && e.plugin == plugin));
        Ok(inner.entries.len() < before)
    }

    async fn list_entries(
        &self,
        plugin: &str,
        version: Option<&str>,
    ) -> StoreResult<Vec<MigrationEntry>> {
        let inner = self.inner.lock();
        let mut entries: Vec<MigrationEntry> = inner
            .entries
            .iter()
            .filter(|e| e.plugin == plugin && version.is_none_or(|v| e.version == v))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(entries)
    }

    async fn begin(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.snapshot.is_some() {
            return Err(StoreError::Transaction("a transaction is already open"));
        }
        inner.snapshot = Some(Snapshot {
            records: inner.records.clone(),
            last_record_id: inner.last_record_id,
        });
        Ok(())
    }

    async fn commit(&self) -> StoreResult<()> {
        match self.inner.lock().snapshot.take() {
            Some(_) => Ok(()),
            None => Err(StoreError::Transaction("commit without an open transaction")),
        }
    }

    async fn rollback(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let Some(snapshot) = inner.snapshot.take() else {
            return Err(StoreError::Transaction("rollback without an open transaction"));
        };
        inner.records = snapshot.records;
        inner.last_record_id = snapshot.last_record_id;
        Ok(())
    }
}
