//! Integration tests for the `orchestra` binary entry point.
//!
//! Covers configuration flags reaching the loader, environment layering, and
//! user-facing failures.

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;

fn write_manifest(root: &std::path::Path, id: &str) {
    let dir = root.join(id);
    fs::create_dir_all(&dir).expect("create plugin dir");
    let manifest = format!(
        r#"{{"metadata": {{"id": "{id}", "name": "{id}", "version": "2.0.0"}}, "capabilities": ["render"]}}"#
    );
    fs::write(dir.join("plugin.json"), manifest).expect("write manifest");
}

#[test]
fn help_lists_subcommands() {
    let mut command = cargo_bin_cmd!("orchestra");
    command.arg("--help");
    command
        .assert()
        .success()
        .stdout(contains("discover"))
        .stdout(contains("invoke"));
}

#[test]
fn plugins_dir_flag_selects_the_catalogue() {
    let root = tempfile::tempdir().expect("tempdir");
    write_manifest(root.path(), "docx");

    let mut command = cargo_bin_cmd!("orchestra");
    command
        .arg("--plugins-dir")
        .arg(root.path())
        .args(["--log-filter", "off", "discover"]);
    command
        .assert()
        .success()
        .stdout("docx\t2.0.0\tdocx\trender\n");
}

#[test]
fn plugins_dir_is_read_from_the_environment() {
    let root = tempfile::tempdir().expect("tempdir");
    write_manifest(root.path(), "pdf");

    let mut command = cargo_bin_cmd!("orchestra");
    command
        .env("ORCHESTRA_PLUGINS_DIR", root.path())
        .env("ORCHESTRA_LOG_FILTER", "off")
        .arg("discover");
    command.assert().success().stdout(contains("pdf\t2.0.0"));
}

#[test]
fn unknown_plugin_exits_with_failure() {
    let root = tempfile::tempdir().expect("tempdir");

    let mut command = cargo_bin_cmd!("orchestra");
    command
        .arg("--plugins-dir")
        .arg(root.path())
        .args(["invoke", "ghost", "ping"]);
    command
        .assert()
        .failure()
        .stderr(contains("plugin 'ghost' is not known to the registry"));
}

#[test]
fn missing_plugins_dir_yields_an_empty_catalogue() {
    let root = tempfile::tempdir().expect("tempdir");

    let mut command = cargo_bin_cmd!("orchestra");
    command
        .arg("--plugins-dir")
        .arg(root.path().join("absent"))
        .args(["--log-filter", "off", "discover"]);
    command.assert().success().stdout("");
}

#[test]
fn invalid_log_filter_is_reported() {
    let mut command = cargo_bin_cmd!("orchestra");
    command.args(["--log-filter", "orchestra=[", "discover"]);
    command
        .assert()
        .failure()
        .stderr(contains("invalid log filter"));
}
