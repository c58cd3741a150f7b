//! Unit tests for the plugin registry.

use std::fs;
use std::path::Path;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::error::PluginError;
use crate::manifest::{MANIFEST_FILE, PluginMetadata};

fn manifest_json(id: &str, category: &str, capabilities: &[&str]) -> String {
    let caps = serde_json::to_string(capabilities).expect("serialise capabilities");
    format!(
        r#"{{"metadata":{{"id":"{id}","name":"{id}","version":"1.0","author":"t","description":"d","category":"{category}"}},"capabilities":{caps}}}"#
    )
}

fn write_plugin(root: &Path, dir_name: &str, manifest: &str) {
    let dir = root.join(dir_name);
    fs::create_dir_all(&dir).expect("create plugin dir");
    fs::write(dir.join(MANIFEST_FILE), manifest).expect("write manifest");
}

#[fixture]
fn plugins_root() -> TempDir {
    let root = tempfile::tempdir().expect("tempdir");
    write_plugin(
        root.path(),
        "assistant-integration",
        &manifest_json("assistant", "ai-integrations", &["chat", "complete"]),
    );
    write_plugin(
        root.path(),
        "oauth-manager",
        &manifest_json("oauth", "core", &["credentials"]),
    );
    write_plugin(
        root.path(),
        "docx-generator",
        &manifest_json("docx", "document-generation", &["render"]),
    );
    root
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

#[test]
fn new_registry_is_empty() {
    let r = PluginRegistry::new();
    assert!(r.is_empty());
    assert_eq!(r.len(), 0);
    assert!(r.diagnostics().is_empty());
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

#[rstest]
fn scan_discovers_every_valid_plugin_in_directory_order(plugins_root: TempDir) {
    let mut r = PluginRegistry::new();
    let manifests = r.scan(plugins_root.path()).expect("scan");

    let ids: Vec<&str> = manifests.iter().map(PluginManifest::id).collect();
    assert_eq!(ids, vec!["assistant", "docx", "oauth"]);
    assert_eq!(r.len(), 3);
    assert!(r.diagnostics().is_empty());
}

#[rstest]
fn scan_skips_invalid_plugins_and_keeps_the_rest(plugins_root: TempDir) {
    let root = plugins_root.path();
    write_plugin(root, "broken-json", "{not json");
    write_plugin(
        root,
        "no-version",
        r#"{"metadata":{"id":"nover","name":"No Version"}}"#,
    );
    fs::create_dir_all(root.join("empty-dir")).expect("create empty dir");
    fs::write(root.join("stray-file.txt"), "ignored").expect("write stray file");

    let mut r = PluginRegistry::new();
    let manifests = r.scan(root).expect("scan");

    assert_eq!(manifests.len(), 3);
    assert_eq!(r.diagnostics().len(), 3);
    assert!(
        r.diagnostics()
            .iter()
            .all(|e| matches!(e, PluginError::ManifestInvalid { .. }))
    );
    assert!(r.get("nover").is_err());
}

#[rstest]
fn scan_skips_duplicate_identifier(plugins_root: TempDir) {
    let root = plugins_root.path();
    write_plugin(
        root,
        "zz-assistant-copy",
        &manifest_json("assistant", "ai-integrations", &["chat"]),
    );

    let mut r = PluginRegistry::new();
    let manifests = r.scan(root).expect("scan");

    assert_eq!(manifests.len(), 3);
    let assistant = r.get("assistant").expect("assistant present");
    assert!(assistant.directory().ends_with("assistant-integration"));
    let diagnostic = r.diagnostics().first().expect("one diagnostic");
    assert!(diagnostic.to_string().contains("duplicate plugin id 'assistant'"));
}

#[test]
fn scan_of_missing_root_is_empty() {
    let root = tempfile::tempdir().expect("tempdir");
    let mut r = PluginRegistry::new();
    let manifests = r.scan(&root.path().join("absent")).expect("scan");
    assert!(manifests.is_empty());
    assert!(r.is_empty());
}

#[rstest]
fn rescan_reflects_removed_plugins(plugins_root: TempDir) {
    let mut r = PluginRegistry::new();
    r.scan(plugins_root.path()).expect("first scan");
    fs::remove_dir_all(plugins_root.path().join("docx-generator")).expect("remove plugin");

    let manifests = r.scan(plugins_root.path()).expect("second scan");

    assert_eq!(manifests.len(), 2);
    assert!(matches!(
        r.get("docx"),
        Err(PluginError::UnknownPlugin { .. })
    ));
}

#[rstest]
fn repeated_scans_are_identical(plugins_root: TempDir) {
    let mut r = PluginRegistry::new();
    let first = r.scan(plugins_root.path()).expect("first scan");
    let second = r.scan(plugins_root.path()).expect("second scan");
    assert_eq!(first, second);
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

#[rstest]
fn get_returns_unknown_plugin_for_missing(plugins_root: TempDir) {
    let mut r = PluginRegistry::new();
    r.scan(plugins_root.path()).expect("scan");
    let err = r.get("nonexistent").expect_err("should be unknown");
    assert!(matches!(err, PluginError::UnknownPlugin { ref id } if id == "nonexistent"));
}

#[rstest]
fn find_by_capability_returns_matching(plugins_root: TempDir) {
    let mut r = PluginRegistry::new();
    r.scan(plugins_root.path()).expect("scan");
    let results = r.find_by_capability("chat");
    assert_eq!(results.len(), 1);
    assert_eq!(results.first().expect("one plugin").id(), "assistant");
    assert!(r.find_by_capability("print").is_empty());
}

#[rstest]
#[case::lowercase("core")]
#[case::capitalised("Core")]
fn find_by_category_is_case_insensitive(plugins_root: TempDir, #[case] query: &str) {
    let mut r = PluginRegistry::new();
    r.scan(plugins_root.path()).expect("scan");
    let results = r.find_by_category(query);
    assert_eq!(results.len(), 1, "expected one plugin for '{query}'");
}

// ---------------------------------------------------------------------------
// Direct registration
// ---------------------------------------------------------------------------

#[test]
fn register_rejects_duplicate() {
    let mut r = PluginRegistry::new();
    let make = || PluginManifest::new(PluginMetadata::new("echo", "Echo", "1.0"), "/p/echo");
    r.register(make()).expect("first register");
    let err = r.register(make()).expect_err("duplicate should fail");
    assert!(err.to_string().contains("already registered"));
}

#[test]
fn register_rejects_invalid_manifest() {
    let mut r = PluginRegistry::new();
    let bad = PluginManifest::new(PluginMetadata::new("", "Echo", "1.0"), "/p/echo");
    let err = r.register(bad).expect_err("should reject");
    assert!(matches!(err, PluginError::ManifestInvalid { .. }));
}
