//! Plugin version parsing and comparison.
//!
//! Versions are compared numerically by `major.minor.patch`. Descriptors
//! and operators often write `v2` or `1.1`, so missing components are
//! padded with zeros before parsing.

use std::cmp::Ordering;

use semver::Version;

use super::error::{PluginError, PluginResult};

/// Parse a plugin version, accepting a leading `v` and 1-3 numeric parts.
pub fn parse_version(plugin: &str, raw: &str) -> PluginResult<Version> {
    let trimmed = raw.trim();
    let bare = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    let core_len = bare.find(['-', '+']).unwrap_or(bare.len());
    let (core, suffix) = bare.split_at(core_len);
    let padded = match core.split('.').count() {
        1 => format!("{core}.0.0{suffix}"),
        2 => format!("{core}.0{suffix}"),
        _ => bare.to_string(),
    };

    Version::parse(&padded).map_err(|e| PluginError::InvalidVersion {
        plugin: plugin.to_string(),
        version: raw.to_string(),
        details: e.to_string(),
    })
}

/// Compare two version strings numerically.
pub fn compare(plugin: &str, current: &str, target: &str) -> PluginResult<Ordering> {
    Ok(parse_version(plugin, current)?.cmp(&parse_version(plugin, target)?))
}

/// True when moving from `current` to `target` is an upgrade.
pub fn is_upgrade(plugin: &str, current: &str, target: &str) -> PluginResult<bool> {
    Ok(compare(plugin, current, target)? == Ordering::Less)
}
