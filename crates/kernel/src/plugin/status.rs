//! Logical plugin state derived from its persistent record.

use std::fmt;

use crate::store::{MigrateStatus, PluginRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginState {
    /// No record, or an inactive record that was never rolled back.
    Uninstalled,
    /// Active, migrations not yet confirmed.
    Pending,
    /// Active and fully migrated.
    Active,
    /// The last migration run failed.
    Failed,
    /// Uninstalled: inactive with its migrations rolled back.
    RolledBack,
}

impl PluginState {
    pub fn from_record(record: Option<&PluginRecord>) -> Self {
        let Some(record) = record else {
            return Self::Uninstalled;
        };
        match (record.active, record.migrate_status) {
            (_, MigrateStatus::Failed) => Self::Failed,
            (false, MigrateStatus::Rollback) => Self::RolledBack,
            (false, _) => Self::Uninstalled,
            (true, MigrateStatus::Success) => Self::Active,
            (true, MigrateStatus::Pending | MigrateStatus::Rollback) => Self::Pending,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninstalled => "uninstalled",
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
