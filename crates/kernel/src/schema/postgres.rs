use async_trait::async_trait;
use sqlx::PgPool;

use super::{SchemaError, SchemaExecutor};

/// Executes migration SQL on a PostgreSQL pool.
///
/// Each call runs as a simple-query batch, so multi-statement units are
/// accepted and every statement auto-commits.
#[derive(Clone)]
pub struct PgSchema {
    pool: PgPool,
}

impl PgSchema {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SchemaExecutor for PgSchema {
    async fn execute(&self, sql: &str) -> Result<(), SchemaError> {
        if sql.trim().is_empty() {
            return Ok(());
        }
        sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(())
    }
}
