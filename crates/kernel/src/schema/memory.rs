//! In-process schema catalogue.
//!
//! Tracks table names only. Understands the DDL subset plugin migrations
//! use in tests and embedded hosts:
//!
//! - `CREATE TABLE [IF NOT EXISTS] name ...`
//! - `DROP TABLE [IF EXISTS] name [CASCADE | RESTRICT]`
//! - `ALTER TABLE name RENAME TO other`
//!
//! Anything else is rejected. A batch of statements applies atomically:
//! if one fails, none of them take effect.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;

use super::{SchemaError, SchemaExecutor};

#[allow(clippy::expect_used)]
static CREATE_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^CREATE\s+TABLE\s+(IF\s+NOT\s+EXISTS\s+)?"?([A-Za-z_][A-Za-z0-9_]*)"?(?:\s*\(.*\))?\s*$"#)
        .expect("valid regex literal")
});

#[allow(clippy::expect_used)]
static DROP_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)^DROP\s+TABLE\s+(IF\s+EXISTS\s+)?"?([A-Za-z_][A-Za-z0-9_]*)"?(?:\s+(?:CASCADE|RESTRICT))?\s*$"#,
    )
    .expect("valid regex literal")
});

#[allow(clippy::expect_used)]
static RENAME_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)^ALTER\s+TABLE\s+"?([A-Za-z_][A-Za-z0-9_]*)"?\s+RENAME\s+TO\s+"?([A-Za-z_][A-Za-z0-9_]*)"?\s*$"#,
    )
    .expect("valid regex literal")
});

#[derive(Debug, Default)]
pub struct MemorySchema {
    tables: RwLock<BTreeSet<String>>,
}

impl MemorySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.read().contains(&name.to_ascii_lowercase())
    }

    /// Current table names, sorted.
    pub fn tables(&self) -> Vec<String> {
        self.tables.read().iter().cloned().collect()
    }
}

#[async_trait]
impl SchemaExecutor for MemorySchema {
    async fn execute(&self, sql: &str) -> Result<(), SchemaError> {
        let mut tables = self.tables.write();
        let mut staged = tables.clone();
        for statement in statements(sql) {
            apply(&mut staged, &statement)?;
        }
        *tables = staged;
        Ok(())
    }
}

/// Split a script into statements, dropping `--` comments and blanks.
fn statements(sql: &str) -> Vec<String> {
    let stripped: String = sql
        .lines()
        .map(|line| match line.find("--") {
            Some(idx) => &line[..idx],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n");

    stripped
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn apply(tables: &mut BTreeSet<String>, statement: &str) -> Result<(), SchemaError> {
    if let Some(caps) = CREATE_TABLE.captures(statement) {
        let name = caps[2].to_ascii_lowercase();
        let if_not_exists = caps.get(1).is_some();
        if tables.contains(&name) {
            if if_not_exists {
                return Ok(());
            }
            return Err(SchemaError::TableExists(name));
        }
        tables.insert(name);
        return Ok(());
    }

    if let Some(caps) = DROP_TABLE.captures(statement) {
        let name = caps[2].to_ascii_lowercase();
        if !tables.remove(&name) && caps.get(1).is_none() {
            return Err(SchemaError::NoSuchTable(name));
        }
        return Ok(());
    }

    if let Some(caps) = RENAME_TABLE.captures(statement) {
        let from = caps[1].to_ascii_lowercase();
        let to = caps[2].to_ascii_lowercase();
        if !tables.contains(&from) {
            return Err(SchemaError::NoSuchTable(from));
        }
        if tables.contains(&to) {
            return Err(SchemaError::TableExists(to));
        }
        tables.remove(&from);
        tables.insert(to);
        return Ok(());
    }

    Err(SchemaError::Unsupported(statement.to_string()))
}
