//! Host schema executors.
//!
//! Migration units are plain SQL; a [`SchemaExecutor`] applies them to the
//! host database. Statements run outside any record transaction.

mod memory;
mod postgres;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemorySchema;
pub use postgres::PgSchema;

/// Errors raised while executing a migration action.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unsupported statement: {0}")]
    Unsupported(String),

    #[error("table '{0}' already exists")]
    TableExists(String),

    #[error("table '{0}' does not exist")]
    NoSuchTable(String),
}

/// Runs schema-changing SQL against the host database.
#[async_trait]
pub trait SchemaExecutor: Send + Sync {
    /// Execute one or more `;`-separated statements.
    async fn execute(&self, sql: &str) -> Result<(), SchemaError>;
}
