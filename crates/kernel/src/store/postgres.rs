//! PostgreSQL store backend.
//!
//! Record writes made between `begin` and `commit` run on one held
//! transaction; ledger statements always run on the pool so they commit
//! independently of it.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    MigrateStatus, MigrationEntry, PluginRecord, PluginStore, RecordUpdate, StoreError,
    StoreResult,
};

/// Tables used by the store. Safe to run repeatedly.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS plugins (
    id BIGSERIAL PRIMARY KEY,
    identity TEXT NOT NULL UNIQUE,
    version TEXT,
    active BOOLEAN NOT NULL DEFAULT FALSE,
    migrate_status TEXT NOT NULL DEFAULT 'pending'
        CHECK (migrate_status IN ('pending', 'success', 'failed', 'rollback')),
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS plugin_migrations (
    id BIGSERIAL PRIMARY KEY,
    plugin TEXT NOT NULL,
    migration TEXT NOT NULL,
    version TEXT NOT NULL,
    batch BIGINT NOT NULL,
    created_at BIGINT NOT NULL
);

CREATE INDEX IF NOT EXISTS plugin_migrations_plugin_batch_idx
    ON plugin_migrations (plugin, batch);
"#;

const RECORD_COLUMNS: &str =
    "id, identity, version, active, migrate_status, created_at, updated_at";

const ENTRY_COLUMNS: &str = "id, plugin, migration, version, batch, created_at";

#[derive(FromRow)]
struct RecordRow {
    id: i64,
    identity: String,
    version: Option<String>,
    active: bool,
    migrate_status: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<RecordRow> for PluginRecord {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            identity: row.identity,
            version: row.version,
            active: row.active,
            migrate_status: row.migrate_status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn entry_from_row(row: &PgRow) -> MigrationEntry {
    MigrationEntry {
        id: row.get("id"),
        plugin: row.get("plugin"),
        migration: row.get("migration"),
        version: row.get("version"),
        batch: row.get("batch"),
        created_at: row.get("created_at"),
    }
}

pub struct PgStore {
    pool: PgPool,
    tx: Mutex<Option<Transaction<'static, Postgres>>>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            tx: Mutex::new(None),
        }
    }

    /// Create the `plugins` and `plugin_migrations` tables if missing.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        debug!("plugin store schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PluginStore for PgStore {
    async fn find_record(&self, identity: &str) -> StoreResult<Option<PluginRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM plugins WHERE identity = $1");
        let query = sqlx::query_as::<_, RecordRow>(&sql).bind(identity);
        let mut tx = self.tx.lock().await;
        let row = match tx.as_mut() {
            Some(tx) => query.fetch_optional(&mut **tx).await?,
            None => query.fetch_optional(&self.pool).await?,
        };
        row.map(PluginRecord::try_from).transpose()
    }

    async fn list_records(&self) -> StoreResult<Vec<PluginRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM plugins ORDER BY identity");
        let query = sqlx::query_as::<_, RecordRow>(&sql);
        let mut tx = self.tx.lock().await;
        let rows = match tx.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await?,
            None => query.fetch_all(&self.pool).await?,
        };
        rows.into_iter().map(PluginRecord::try_from).collect()
    }

    async fn ensure_record(&self, identity: &str, active: bool) -> StoreResult<PluginRecord> {
        let now = chrono::Utc::now().timestamp();
        let sql = format!(
            "WITH inserted AS ( \
                 INSERT INTO plugins (identity, version, active, migrate_status, created_at, updated_at) \
                 VALUES ($1, NULL, $2, 'pending', $3, $3) \
                 ON CONFLICT (identity) DO NOTHING \
                 RETURNING {RECORD_COLUMNS} \
             ) \
             SELECT {RECORD_COLUMNS} FROM inserted \
             UNION ALL \
             SELECT {RECORD_COLUMNS} FROM plugins WHERE identity = $1"
        );
        let query = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(identity)
            .bind(active)
            .bind(now);
        let mut tx = self.tx.lock().await;
        let row = match tx.as_mut() {
            Some(tx) => query.fetch_one(&mut **tx).await?,
            None => query.fetch_one(&self.pool).await?,
        };
        row.try_into()
    }

    async fn upsert_record(
        &self,
        identity: &str,
        active: bool,
        version: Option<&str>,
    ) -> StoreResult<PluginRecord> {
        let now = chrono::Utc::now().timestamp();
        let sql = format!(
            "INSERT INTO plugins (identity, version, active, migrate_status, created_at, updated_at) \
             VALUES ($1, $2, $3, 'pending', $4, $4) \
             ON CONFLICT (identity) DO UPDATE \
                 SET version = $2, active = $3, migrate_status = 'pending', updated_at = $4 \
             RETURNING {RECORD_COLUMNS}"
        );
        let query = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(identity)
            .bind(version)
            .bind(active)
            .bind(now);
        let mut tx = self.tx.lock().await;
        let row = match tx.as_mut() {
            Some(tx) => query.fetch_one(&mut **tx).await?,
            None => query.fetch_one(&self.pool).await?,
        };
        row.try_into()
    }

    async fn update_record(&self, identity: &str, update: &RecordUpdate) -> StoreResult<bool> {
        let now = chrono::Utc::now().timestamp();
        let query = sqlx::query(
            "UPDATE plugins SET \
                 version = COALESCE($1, version), \
                 active = COALESCE($2, active), \
                 migrate_status = COALESCE($3, migrate_status), \
                 updated_at = $4 \
             WHERE identity = $5",
        )
        .bind(update.version.as_deref())
        .bind(update.active)
        .bind(update.migrate_status.map(MigrateStatus::as_str))
        .bind(now)
        .bind(identity);
        let mut tx = self.tx.lock().await;
        let result = match tx.as_mut() {
            Some(tx) => query.execute(&mut **tx).await?,
            None => query.execute(&self.pool).await?,
        };
        Ok(result.rows_affected() > 0)
    }

    async fn has_run(&self, plugin: &str, migration: &str) -> StoreResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM plugin_migrations WHERE plugin = $1 AND migration = $2) AS ran",
        )
        .bind(plugin)
        .bind(migration)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("ran"))
    }

    async fn max_batch(&self, plugin: &str, version: Option<&str>) -> StoreResult<Option<i64>> {
        let row = sqlx::query(
            "SELECT MAX(batch) AS batch FROM plugin_migrations \
             WHERE plugin = $1 AND ($2::TEXT IS NULL OR version = $2)",
        )
        .bind(plugin)
        .bind(version)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("batch"))
    }

    async fn insert_entry(
        &self,
        plugin: &str,
        migration: &str,
        version: &str,
        batch: i64,
    ) -> StoreResult<MigrationEntry> {
        let now = chrono::Utc::now().timestamp();
        let sql = format!(
            "INSERT INTO plugin_migrations (plugin, migration, version, batch, created_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {ENTRY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(plugin)
            .bind(migration)
            .bind(version)
            .bind(batch)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        Ok(entry_from_row(&row))
    }

    async fn delete_entry(&self, plugin: &str, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM plugin_migrations WHERE id = $1 AND plugin = $2")
            .bind(id)
            .bind(plugin)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_entries(
        &self,
        plugin: &str,
        version: Option<&str>,
    ) -> StoreResult<Vec<MigrationEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM plugin_migrations \
             WHERE plugin = $1 AND ($2::TEXT IS NULL OR version = $2) \
             ORDER BY id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(plugin)
            .bind(version)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(entry_from_row).collect())
    }

    async fn begin(&self) -> StoreResult<()> {
        let mut tx = self.tx.lock().await;
        if tx.is_some() {
            return Err(StoreError::Transaction("a transaction is already open"));
        }
        *tx = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn commit(&self) -> StoreResult<()> {
        let Some(tx) = self.tx.lock().await.take() else {
            return Err(StoreError::Transaction("commit without an open transaction"));
        };
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self) -> StoreResult<()> {
        let Some(tx) = self.tx.lock().await.take() else {
            return Err(StoreError::Transaction("rollback without an open transaction"));
        };
        tx.rollback().await?;
        Ok(())
    }
}
