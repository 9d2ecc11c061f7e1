//! CLI command implementations for plugin management.
//!
//! Each command writes its report to `out`. Commands that change the schema
//! ask for confirmation on `input` unless `force` is set.

use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};

use super::manager::PluginManager;
use super::migration::MigrationStatus;

/// Ask a yes/no question. Anything but `y`/`yes` declines.
pub fn confirm(prompt: &str, input: &mut impl BufRead, out: &mut impl Write) -> Result<bool> {
    write!(out, "{prompt} (yes/no) [no]: ")?;
    out.flush()?;
    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .context("failed to read confirmation")?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

/// List discovered plugins and orphaned records with their state.
pub async fn cmd_plugin_list(manager: &PluginManager, out: &mut impl Write) -> Result<()> {
    let rows = manager.overview().await?;
    if rows.is_empty() {
        writeln!(out, "No plugins found.")?;
        return Ok(());
    }

    writeln!(
        out,
        "{:<20} {:<10} {:<10} {:<12} {:<7}",
        "PLUGIN", "DECLARED", "INSTALLED", "STATE", "LOADED"
    )?;
    writeln!(out, "{}", "-".repeat(63))?;
    for row in rows {
        let declared = row.declared_version.as_deref().unwrap_or("(not on disk)");
        let installed = row.installed_version.as_deref().unwrap_or("-");
        let loaded = if row.loaded { "yes" } else { "no" };
        writeln!(
            out,
            "{:<20} {:<10} {:<10} {:<12} {:<7}",
            row.name, declared, installed, row.state, loaded
        )?;
    }
    Ok(())
}

pub async fn cmd_plugin_install(
    manager: &mut PluginManager,
    name: &str,
    out: &mut impl Write,
) -> Result<()> {
    manager.install(name).await?;
    let version = manager
        .descriptor(name)
        .map(|d| d.version.clone())
        .unwrap_or_default();
    writeln!(out, "Plugin '{name}' v{version} installed.")?;
    Ok(())
}

pub async fn cmd_plugin_uninstall(
    manager: &mut PluginManager,
    name: &str,
    force: bool,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    if !force
        && !confirm(
            &format!("Are you sure you want to uninstall {name} and roll back its migrations?"),
            input,
            out,
        )?
    {
        return Ok(());
    }
    manager.uninstall(name).await?;
    writeln!(out, "Plugin '{name}' uninstalled.")?;
    Ok(())
}

pub async fn cmd_plugin_version(
    manager: &mut PluginManager,
    name: &str,
    version: &str,
    force: bool,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    if !force
        && !confirm(
            &format!("Are you sure you want to change {name}'s version to {version}?"),
            input,
            out,
        )?
    {
        return Ok(());
    }
    manager.change_version(name, version).await?;
    writeln!(out, "Successfully changed {name}'s version to {version}")?;
    Ok(())
}

/// Run pending migrations without touching plugin records.
pub async fn cmd_plugin_migrate(
    manager: &mut PluginManager,
    name: Option<&str>,
    version: Option<&str>,
    path: Option<&Path>,
    force: bool,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    if !force && !confirm("Are you sure you want to run plugin migrations?", input, out)? {
        return Ok(());
    }

    let applied = manager.migrate(name, version, path).await?;
    let mut total = 0;
    for units in applied.values() {
        for unit in units {
            writeln!(out, "Migrated: {unit}")?;
            total += 1;
        }
    }
    if total == 0 {
        writeln!(out, "Nothing to migrate.")?;
    }
    Ok(())
}

/// Roll back the latest batch without touching plugin records.
pub async fn cmd_plugin_rollback(
    manager: &mut PluginManager,
    name: Option<&str>,
    version: Option<&str>,
    path: Option<&Path>,
    force: bool,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    if !force
        && !confirm(
            "Are you sure you want to rollback plugin migrations?",
            input,
            out,
        )?
    {
        return Ok(());
    }

    let reverted = manager.rollback(name, version, path).await?;
    let mut total = 0;
    for units in reverted.values() {
        for unit in units {
            writeln!(out, "Rolled back: {unit}")?;
            total += 1;
        }
    }
    if total == 0 {
        writeln!(out, "Nothing to roll back.")?;
    }
    Ok(())
}

/// Show ran/pending status for each migration file of a plugin.
pub async fn cmd_plugin_status(
    manager: &PluginManager,
    name: &str,
    path: Option<&Path>,
    out: &mut impl Write,
) -> Result<()> {
    let rows = manager.migration_status(name, path).await?;

    let width = rows
        .iter()
        .map(|r| r.migration.len())
        .max()
        .unwrap_or(0)
        .max("Migration name".len());
    writeln!(out, "{:<width$} | Batch / Status", "Migration name")?;
    writeln!(out, "{}", "-".repeat(width + 17))?;
    for row in rows {
        let status = match row.status {
            MigrationStatus::Ran { batch } => format!("Ran (Batch {batch})"),
            MigrationStatus::Pending => "Pending".to_string(),
        };
        writeln!(out, "{:<width$} | {status}", row.migration)?;
    }
    Ok(())
}
