#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for the `hangar plugin` command implementations.

mod common;

use std::io::Cursor;

use hangar_kernel::plugin::PluginError;
use hangar_kernel::plugin::cli::{
    cmd_plugin_install, cmd_plugin_list, cmd_plugin_migrate, cmd_plugin_rollback,
    cmd_plugin_status, cmd_plugin_uninstall, cmd_plugin_version, confirm,
};
use common::Harness;

fn output(buf: Vec<u8>) -> String {
    String::from_utf8(buf).unwrap()
}

async fn harness_with_sample() -> Harness {
    let mut h = Harness::builder().plugin("sample").build();
    let fixture = h.fixture("sample");
    fixture.write().unwrap();
    fixture.table_migration("0001_t.sql", "t").unwrap();
    h.manager.start().await.unwrap();
    h
}

#[test]
fn confirm_accepts_only_yes() {
    let answers = [
        ("y\n", true),
        ("YES\n", true),
        ("n\n", false),
        ("\n", false),
        ("", false),
    ];
    for (answer, expected) in answers {
        let mut out = Vec::new();
        let ok = confirm("Proceed?", &mut Cursor::new(answer), &mut out).unwrap();
        assert_eq!(ok, expected, "answer {answer:?}");
        assert_eq!(output(out), "Proceed? (yes/no) [no]: ");
    }
}

#[tokio::test]
async fn install_reports_version() {
    let mut h = harness_with_sample().await;
    let mut out = Vec::new();

    cmd_plugin_install(&mut h.manager, "sample", &mut out)
        .await
        .unwrap();

    assert_eq!(output(out), "Plugin 'sample' v1.0.0 installed.\n");
    assert!(h.schema.has_table("t"));
}

#[tokio::test]
async fn version_change_reports_success() {
    let mut h = harness_with_sample().await;
    h.manager.install("sample").await.unwrap();
    h.fixture("sample").with_version("1.1.0").write().unwrap();
    let mut out = Vec::new();

    cmd_plugin_version(
        &mut h.manager,
        "sample",
        "1.1.0",
        false,
        &mut Cursor::new("yes\n"),
        &mut out,
    )
    .await
    .unwrap();

    let out = output(out);
    assert!(out.starts_with("Are you sure you want to change sample's version to 1.1.0?"));
    assert!(out.ends_with("Successfully changed sample's version to 1.1.0\n"));
    assert_eq!(
        h.record("sample").await.unwrap().version.as_deref(),
        Some("1.1.0")
    );
}

#[tokio::test]
async fn declined_version_change_does_nothing() {
    let mut h = harness_with_sample().await;
    h.manager.install("sample").await.unwrap();
    let mut out = Vec::new();

    cmd_plugin_version(
        &mut h.manager,
        "sample",
        "2.0.0",
        false,
        &mut Cursor::new("no\n"),
        &mut out,
    )
    .await
    .unwrap();

    assert!(!output(out).contains("Successfully"));
    assert_eq!(
        h.record("sample").await.unwrap().version.as_deref(),
        Some("1.0.0")
    );
}

#[tokio::test]
async fn version_change_errors_surface_unchanged() {
    let mut h = harness_with_sample().await;
    h.manager.install("sample").await.unwrap();
    let mut out = Vec::new();

    let err = cmd_plugin_version(
        &mut h.manager,
        "sample",
        "1.0.0",
        true,
        &mut Cursor::new(""),
        &mut out,
    )
    .await
    .unwrap_err();

    assert_eq!(err.to_string(), "plugin 'sample' is already at version 1.0.0");
    assert!(matches!(
        err.downcast_ref::<PluginError>(),
        Some(PluginError::AlreadyAtVersion { .. })
    ));
    assert!(out.is_empty());
}

#[tokio::test]
async fn uninstall_with_force_skips_prompt() {
    let mut h = harness_with_sample().await;
    h.manager.install("sample").await.unwrap();
    let mut out = Vec::new();

    cmd_plugin_uninstall(
        &mut h.manager,
        "sample",
        true,
        &mut Cursor::new(""),
        &mut out,
    )
    .await
    .unwrap();

    assert_eq!(output(out), "Plugin 'sample' uninstalled.\n");
    assert!(!h.schema.has_table("t"));
}

#[tokio::test]
async fn migrate_and_rollback_list_each_unit() {
    let mut h = harness_with_sample().await;

    let mut out = Vec::new();
    cmd_plugin_migrate(
        &mut h.manager,
        Some("sample"),
        None,
        None,
        true,
        &mut Cursor::new(""),
        &mut out,
    )
    .await
    .unwrap();
    assert_eq!(output(out), "Migrated: 0001_t.sql\n");

    let mut out = Vec::new();
    cmd_plugin_migrate(
        &mut h.manager,
        Some("sample"),
        None,
        None,
        true,
        &mut Cursor::new(""),
        &mut out,
    )
    .await
    .unwrap();
    assert_eq!(output(out), "Nothing to migrate.\n");

    let mut out = Vec::new();
    cmd_plugin_rollback(
        &mut h.manager,
        Some("sample"),
        None,
        None,
        true,
        &mut Cursor::new(""),
        &mut out,
    )
    .await
    .unwrap();
    assert_eq!(output(out), "Rolled back: 0001_t.sql\n");

    let mut out = Vec::new();
    cmd_plugin_rollback(
        &mut h.manager,
        Some("sample"),
        None,
        None,
        true,
        &mut Cursor::new(""),
        &mut out,
    )
    .await
    .unwrap();
    assert_eq!(output(out), "Nothing to roll back.\n");
}

#[tokio::test]
async fn declined_migrate_runs_nothing() {
    let mut h = harness_with_sample().await;
    let mut out = Vec::new();

    cmd_plugin_migrate(
        &mut h.manager,
        None,
        None,
        None,
        false,
        &mut Cursor::new("n\n"),
        &mut out,
    )
    .await
    .unwrap();

    assert!(!h.schema.has_table("t"));
    assert!(!output(out).contains("Migrated"));
}

#[tokio::test]
async fn status_prints_ran_and_pending_rows() {
    let mut h = harness_with_sample().await;
    h.manager.install("sample").await.unwrap();
    h.fixture("sample")
        .table_migration("0002_u.sql", "u")
        .unwrap();
    let mut out = Vec::new();

    cmd_plugin_status(&h.manager, "sample", None, &mut out)
        .await
        .unwrap();

    let out = output(out);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "Migration name | Batch / Status");
    assert_eq!(lines[2], "0001_t.sql     | Ran (Batch 1)");
    assert_eq!(lines[3], "0002_u.sql     | Pending");
}

#[tokio::test]
async fn list_shows_state_of_each_plugin() {
    let mut h = harness_with_sample().await;
    let mut out = Vec::new();
    cmd_plugin_list(&h.manager, &mut out).await.unwrap();
    let before = output(out);
    assert!(before.contains("PLUGIN"));
    assert!(
        before
            .lines()
            .any(|l| l.starts_with("sample") && l.contains("uninstalled"))
    );

    h.manager.install("sample").await.unwrap();
    let mut out = Vec::new();
    cmd_plugin_list(&h.manager, &mut out).await.unwrap();
    let after = output(out);
    assert!(
        after
            .lines()
            .any(|l| l.starts_with("sample") && l.contains("active") && l.contains("yes"))
    );
}

#[tokio::test]
async fn list_with_nothing_discovered() {
    let mut h = Harness::builder().build();
    h.manager.discover();
    let mut out = Vec::new();

    cmd_plugin_list(&h.manager, &mut out).await.unwrap();

    assert_eq!(output(out), "No plugins found.\n");
}
