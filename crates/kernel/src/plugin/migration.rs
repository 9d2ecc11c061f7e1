//! Plugin migration runner.
//!
//! A plugin's migration directory holds `*.sql` units applied in lexical
//! file-name order (names embed a timestamp, so lexical order is
//! chronological). Each unit has a forward section and an optional reverse
//! section:
//!
//! ```sql
//! -- migrate:up
//! CREATE TABLE posts (id BIGINT PRIMARY KEY);
//! -- migrate:down
//! DROP TABLE posts;
//! ```
//!
//! Units are not wrapped in a transaction. A failure stops the run and
//! leaves the units already applied in that run recorded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::schema::SchemaExecutor;
use crate::store::MigrationEntry;

use super::error::{PluginError, PluginResult};
use super::ledger::Ledger;

const UP_MARKER: &str = "-- migrate:up";
const DOWN_MARKER: &str = "-- migrate:down";

/// One forward/reverse pair read from a migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationUnit {
    /// File name, the unit's identifier in the ledger.
    pub name: String,
    pub up: String,
    pub down: String,
}

impl MigrationUnit {
    /// Split file content into its up and down sections.
    pub fn parse(name: impl Into<String>, content: &str) -> Self {
        let mut up = Vec::new();
        let mut down = Vec::new();
        let mut in_down = false;

        for line in content.lines() {
            let marker = line.trim();
            if marker.eq_ignore_ascii_case(UP_MARKER) {
                in_down = false;
            } else if marker.eq_ignore_ascii_case(DOWN_MARKER) {
                in_down = true;
            } else if in_down {
                down.push(line);
            } else {
                up.push(line);
            }
        }

        Self {
            name: name.into(),
            up: up.join("\n").trim().to_string(),
            down: down.join("\n").trim().to_string(),
        }
    }

    pub fn load(plugin: &str, path: &Path) -> PluginResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PluginError::io(plugin, path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::parse(name, &content))
    }
}

/// Per-file status, as reported by `hangar plugin status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStatus {
    Ran { batch: i64 },
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatusRow {
    pub migration: String,
    pub status: MigrationStatus,
}

/// `*.sql` files in `dir`, sorted by name. A missing directory yields none.
pub fn migration_files(plugin: &str, dir: &Path) -> PluginResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        debug!(plugin, dir = %dir.display(), "no migration directory");
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir).map_err(|e| PluginError::io(plugin, dir, e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "sql"))
        .collect();
    files.sort();
    Ok(files)
}

/// Applies and reverts migration units, keeping the ledger in step.
#[derive(Clone)]
pub struct MigrationRunner {
    ledger: Ledger,
    schema: Arc<dyn SchemaExecutor>,
}

impl MigrationRunner {
    pub fn new(ledger: Ledger, schema: Arc<dyn SchemaExecutor>) -> Self {
        Self { ledger, schema }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Apply every unit in `dir` that has not run yet, as one new batch.
    ///
    /// Returns the names of the units applied by this call.
    pub async fn migrate(&self, plugin: &str, dir: &Path, version: &str) -> PluginResult<Vec<String>> {
        let files = migration_files(plugin, dir)?;
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let batch = self.ledger.next_batch(plugin).await?;
        let mut applied = Vec::new();

        for path in &files {
            let unit = MigrationUnit::load(plugin, path)?;
            if self.ledger.has_run(plugin, &unit.name).await? {
                debug!(plugin, migration = %unit.name, "already ran, skipping");
                continue;
            }

            debug!(plugin, migration = %unit.name, batch, "applying migration");
            self.schema
                .execute(&unit.up)
                .await
                .map_err(|e| PluginError::migration_failed(plugin, &unit.name, e))?;
            self.ledger.record(plugin, &unit.name, version, batch).await?;
            applied.push(unit.name);
        }

        if applied.is_empty() {
            debug!(plugin, "nothing to migrate");
        } else {
            info!(plugin, version, batch, count = applied.len(), "migrations applied");
        }
        Ok(applied)
    }

    /// Revert the latest batch, or the latest batch recorded under `version`.
    ///
    /// Entries whose unit file no longer exists are left in the ledger.
    pub async fn rollback(
        &self,
        plugin: &str,
        dir: &Path,
        version: Option<&str>,
    ) -> PluginResult<Vec<String>> {
        let batch = match version {
            Some(v) => self.ledger.last_batch_for_version(plugin, v).await?,
            None => self.ledger.last_batch(plugin).await?,
        };
        if batch == 0 {
            debug!(plugin, ?version, "nothing to roll back");
            return Ok(Vec::new());
        }

        let entries = self.ledger.batch_entries(plugin, version, batch).await?;
        let reverted = self.revert(plugin, dir, &entries).await?;
        info!(plugin, ?version, batch, count = reverted.len(), "batch rolled back");
        Ok(reverted)
    }

    /// Revert every recorded unit of the plugin, newest first.
    pub async fn rollback_all(&self, plugin: &str, dir: &Path) -> PluginResult<Vec<String>> {
        let entries = self.ledger.list_for_version(plugin, None).await?;
        let reverted = self.revert(plugin, dir, &entries).await?;
        info!(plugin, count = reverted.len(), "all migrations rolled back");
        Ok(reverted)
    }

    async fn revert(
        &self,
        plugin: &str,
        dir: &Path,
        entries: &[MigrationEntry],
    ) -> PluginResult<Vec<String>> {
        let mut reverted = Vec::new();

        for entry in entries {
            let path = dir.join(&entry.migration);
            if !path.is_file() {
                warn!(
                    plugin,
                    migration = %entry.migration,
                    "migration file missing, leaving ledger entry in place"
                );
                continue;
            }

            let unit = MigrationUnit::load(plugin, &path)?;
            debug!(plugin, migration = %unit.name, batch = entry.batch, "reverting migration");
            if !unit.down.is_empty() {
                self.schema
                    .execute(&unit.down)
                    .await
                    .map_err(|e| PluginError::migration_failed(plugin, &unit.name, e))?;
            }
            self.ledger.remove(plugin, entry.id).await?;
            reverted.push(entry.migration.clone());
        }

        Ok(reverted)
    }

    /// Ran/pending status for every unit file in `dir`.
    pub async fn status(&self, plugin: &str, dir: &Path) -> PluginResult<Vec<MigrationStatusRow>> {
        let ran = self.ledger.ran_batches(plugin).await?;
        let rows = migration_files(plugin, dir)?
            .into_iter()
            .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .map(|migration| {
                let status = match ran.get(&migration) {
                    Some(&batch) => MigrationStatus::Ran { batch },
                    None => MigrationStatus::Pending,
                };
                MigrationStatusRow { migration, status }
            })
            .collect();
        Ok(rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::schema::MemorySchema;
    use crate::store::MemoryStore;

    fn runner() -> (MigrationRunner, Arc<MemorySchema>) {
        let schema = Arc::new(MemorySchema::new());
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        (MigrationRunner::new(ledger, schema.clone()), schema)
    }

    fn write(dir: &Path, name: &str, table: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(
            dir.join(name),
            format!("-- migrate:up\nCREATE TABLE {table} (id BIGINT);\n-- migrate:down\nDROP TABLE {table};\n"),
        )
        .unwrap();
    }

    #[test]
    fn parse_splits_sections() {
        let unit = MigrationUnit::parse(
            "0001.sql",
            "-- migrate:up\nCREATE TABLE a (id INT);\n\n-- migrate:down\nDROP TABLE a;\n",
        );
        assert_eq!(unit.up, "CREATE TABLE a (id INT);");
        assert_eq!(unit.down, "DROP TABLE a;");
    }

    #[test]
    fn parse_without_markers_is_all_up() {
        let unit = MigrationUnit::parse("0001.sql", "CREATE TABLE a (id INT);");
        assert_eq!(unit.up, "CREATE TABLE a (id INT);");
        assert!(unit.down.is_empty());
    }

    #[test]
    fn files_are_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "2024_02_01_b.sql", "b");
        write(dir.path(), "2024_01_01_a.sql", "a");
        std::fs::write(dir.path().join("README.md"), "notes").unwrap();

        let names: Vec<String> = migration_files("p", dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["2024_01_01_a.sql", "2024_02_01_b.sql"]);
        assert!(migration_files("p", &dir.path().join("nope")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn migrate_applies_in_order_as_one_batch() {
        let (runner, schema) = runner();
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "0002_b.sql", "b");
        write(dir.path(), "0001_a.sql", "a");

        let applied = runner.migrate("p", dir.path(), "1.0.0").await.unwrap();
        assert_eq!(applied, vec!["0001_a.sql", "0002_b.sql"]);
        assert!(schema.has_table("a") && schema.has_table("b"));

        let ran = runner.ledger().ran_batches("p").await.unwrap();
        assert_eq!(ran.values().copied().collect::<Vec<_>>(), vec![1, 1]);
    }

    #[tokio::test]
    async fn failure_stops_run_and_keeps_applied_units() {
        let (runner, schema) = runner();
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "0001_a.sql", "a");
        std::fs::write(dir.path().join("0002_bad.sql"), "UPDATE a SET id = 1;").unwrap();
        write(dir.path(), "0003_c.sql", "c");

        let err = runner.migrate("p", dir.path(), "1.0.0").await.unwrap_err();
        assert!(matches!(err, PluginError::MigrationFailed { ref migration, .. } if migration == "0002_bad.sql"));
        assert!(schema.has_table("a"));
        assert!(!schema.has_table("c"));
        assert!(runner.ledger().has_run("p", "0001_a.sql").await.unwrap());
        assert!(!runner.ledger().has_run("p", "0003_c.sql").await.unwrap());
    }

    #[tokio::test]
    async fn status_reports_ran_and_pending() {
        let (runner, _schema) = runner();
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "0001_a.sql", "a");
        runner.migrate("p", dir.path(), "1.0.0").await.unwrap();
        write(dir.path(), "0002_b.sql", "b");

        let rows = runner.status("p", dir.path()).await.unwrap();
        assert_eq!(
            rows,
            vec![
                MigrationStatusRow {
                    migration: "0001_a.sql".into(),
                    status: MigrationStatus::Ran { batch: 1 },
                },
                MigrationStatusRow {
                    migration: "0002_b.sql".into(),
                    status: MigrationStatus::Pending,
                },
            ]
        );
    }

    #[tokio::test]
    async fn rollback_without_down_section_still_removes_entry() {
        let (runner, schema) = runner();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0001_a.sql"), "CREATE TABLE a (id INT);").unwrap();
        runner.migrate("p", dir.path(), "1.0.0").await.unwrap();

        let reverted = runner.rollback("p", dir.path(), None).await.unwrap();
        assert_eq!(reverted, vec!["0001_a.sql"]);
        assert!(schema.has_table("a"));
        assert!(!runner.ledger().has_run("p", "0001_a.sql").await.unwrap());
    }

    #[tokio::test]
    async fn rollback_with_nothing_recorded_is_a_noop() {
        let (runner, _schema) = runner();
        let dir = tempfile::tempdir().unwrap();
        assert!(runner.rollback("p", dir.path(), None).await.unwrap().is_empty());
        assert!(runner.rollback("p", dir.path(), Some("1.0.0")).await.unwrap().is_empty());
        assert!(runner.rollback_all("p", dir.path()).await.unwrap().is_empty());
    }
}
