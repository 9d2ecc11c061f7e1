//! Migration ledger: which units ran for a plugin, under which version and
//! in which batch.
//!
//! The ledger is the only writer of `plugin_migrations`. Entries are
//! appended when a unit's forward action succeeds and deleted when its
//! reverse action succeeds.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::store::{MigrationEntry, PluginStore};

use super::error::{PluginError, PluginResult};

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn PluginStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn PluginStore>) -> Self {
        Self { store }
    }

    /// Exact match on plugin and unit name, regardless of version.
    pub async fn has_run(&self, plugin: &str, migration: &str) -> PluginResult<bool> {
        Ok(self.store.has_run(plugin, migration).await?)
    }

    /// `max(batch) + 1`, or 1 for a plugin with no entries.
    pub async fn next_batch(&self, plugin: &str) -> PluginResult<i64> {
        Ok(self.last_batch(plugin).await? + 1)
    }

    /// `max(batch)`, or 0 for a plugin with no entries.
    pub async fn last_batch(&self, plugin: &str) -> PluginResult<i64> {
        Ok(self.store.max_batch(plugin, None).await?.unwrap_or(0))
    }

    /// Latest batch among the entries recorded under `version`, or 0.
    pub async fn last_batch_for_version(&self, plugin: &str, version: &str) -> PluginResult<i64> {
        Ok(self.store.max_batch(plugin, Some(version)).await?.unwrap_or(0))
    }

    /// Append an entry. Fails if the unit is already recorded for the plugin.
    pub async fn record(
        &self,
        plugin: &str,
        migration: &str,
        version: &str,
        batch: i64,
    ) -> PluginResult<MigrationEntry> {
        if self.store.has_run(plugin, migration).await? {
            return Err(PluginError::DuplicateMigrationEntry {
                plugin: plugin.to_string(),
                migration: migration.to_string(),
            });
        }
        Ok(self.store.insert_entry(plugin, migration, version, batch).await?)
    }

    /// Delete one entry. Returns false when it was already gone.
    pub async fn remove(&self, plugin: &str, id: i64) -> PluginResult<bool> {
        Ok(self.store.delete_entry(plugin, id).await?)
    }

    /// Entries for a plugin, optionally of one version, newest first.
    pub async fn list_for_version(
        &self,
        plugin: &str,
        version: Option<&str>,
    ) -> PluginResult<Vec<MigrationEntry>> {
        Ok(self.store.list_entries(plugin, version).await?)
    }

    /// Entries of one batch, newest first. This is the rollback order.
    pub async fn batch_entries(
        &self,
        plugin: &str,
        version: Option<&str>,
        batch: i64,
    ) -> PluginResult<Vec<MigrationEntry>> {
        let mut entries = self.list_for_version(plugin, version).await?;
        entries.retain(|e| e.batch == batch);
        Ok(entries)
    }

    /// Unit name -> batch for every recorded unit of the plugin.
    pub async fn ran_batches(&self, plugin: &str) -> PluginResult<BTreeMap<String, i64>> {
        Ok(self
            .list_for_version(plugin, None)
            .await?
            .into_iter()
            .map(|e| (e.migration, e.batch))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn ledger() -> Ledger {
        Ledger::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn batches_start_at_one() {
        let ledger = ledger();
        assert_eq!(ledger.last_batch("p").await.unwrap(), 0);
        assert_eq!(ledger.next_batch("p").await.unwrap(), 1);

        ledger.record("p", "a.sql", "1.0.0", 1).await.unwrap();
        ledger.record("p", "b.sql", "2.0.0", 2).await.unwrap();
        assert_eq!(ledger.last_batch("p").await.unwrap(), 2);
        assert_eq!(ledger.next_batch("p").await.unwrap(), 3);
        assert_eq!(ledger.last_batch_for_version("p", "1.0.0").await.unwrap(), 1);
        assert_eq!(ledger.last_batch_for_version("p", "3.0.0").await.unwrap(), 0);
        assert_eq!(ledger.next_batch("other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_record_is_rejected_until_removed() {
        let ledger = ledger();
        let entry = ledger.record("p", "a.sql", "1.0.0", 1).await.unwrap();

        let err = ledger.record("p", "a.sql", "2.0.0", 2).await.unwrap_err();
        assert!(matches!(err, PluginError::DuplicateMigrationEntry { .. }));

        assert!(ledger.remove("p", entry.id).await.unwrap());
        assert!(!ledger.has_run("p", "a.sql").await.unwrap());
        ledger.record("p", "a.sql", "2.0.0", 2).await.unwrap();
    }

    #[tokio::test]
    async fn has_run_ignores_version_but_not_plugin() {
        let ledger = ledger();
        ledger.record("p", "a.sql", "1.0.0", 1).await.unwrap();
        assert!(ledger.has_run("p", "a.sql").await.unwrap());
        assert!(!ledger.has_run("q", "a.sql").await.unwrap());
    }

    #[tokio::test]
    async fn batch_entries_are_newest_first() {
        let ledger = ledger();
        ledger.record("p", "a.sql", "1.0.0", 1).await.unwrap();
        ledger.record("p", "b.sql", "1.0.0", 1).await.unwrap();
        ledger.record("p", "c.sql", "2.0.0", 2).await.unwrap();

        let names: Vec<String> = ledger
            .batch_entries("p", None, 1)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.migration)
            .collect();
        assert_eq!(names, vec!["b.sql", "a.sql"]);

        let ran = ledger.ran_batches("p").await.unwrap();
        assert_eq!(ran["a.sql"], 1);
        assert_eq!(ran["c.sql"], 2);
    }
}
