//! Behaviour-driven tests for plugin orchestration.

use std::fs;
use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value, json};
use tempfile::TempDir;

use super::support::{EXITS_AT_ONCE, RESPONDER, start_count, wait_until, write_script_plugin};
use crate::error::PluginError;
use crate::manifest::{MANIFEST_FILE, PluginManifest};
use crate::orchestrator::{Orchestrator, PluginState};
use crate::supervisor::SupervisorConfig;

const LONG: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

struct TestWorld {
    root: TempDir,
    orchestrator: Orchestrator,
    discovered: Vec<PluginManifest>,
    load: Option<Result<(), PluginError>>,
    call: Option<Result<Value, PluginError>>,
}

#[fixture]
fn world() -> TestWorld {
    let root = tempfile::tempdir().expect("tempdir");
    let config = SupervisorConfig {
        startup_timeout: LONG,
        ready_probe: Duration::from_secs(2),
        stop_grace: Duration::from_millis(500),
    };
    let orchestrator = Orchestrator::new(root.path(), config);
    TestWorld {
        root,
        orchestrator,
        discovered: Vec::new(),
        load: None,
        call: None,
    }
}

fn unquote(value: &str) -> &str {
    value.trim_matches('"')
}

fn call_result(world: &TestWorld) -> &Result<Value, PluginError> {
    world.call.as_ref().expect("no call captured")
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("a responding plugin {id}")]
fn given_responding_plugin(world: &mut TestWorld, id: String) {
    write_script_plugin(world.root.path(), unquote(&id), RESPONDER);
}

#[given("a plugin {id} that exits during startup")]
fn given_flaky_plugin(world: &mut TestWorld, id: String) {
    write_script_plugin(world.root.path(), unquote(&id), EXITS_AT_ONCE);
}

#[given("a plugin directory {name} with an invalid manifest")]
fn given_invalid_plugin(world: &mut TestWorld, name: String) {
    let dir = world.root.path().join(unquote(&name));
    fs::create_dir_all(&dir).expect("create plugin dir");
    fs::write(dir.join(MANIFEST_FILE), r#"{"metadata": {"id": "broken"}}"#)
        .expect("write manifest");
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("plugins are discovered")]
fn when_discovered(world: &mut TestWorld) {
    world.discovered = world.orchestrator.discover_plugins().expect("discover");
}

#[when("plugin {id} is loaded")]
fn when_loaded(world: &mut TestWorld, id: String) {
    world.load = Some(world.orchestrator.load_plugin(unquote(&id)));
}

#[when("plugin {id} is unloaded")]
fn when_unloaded(world: &mut TestWorld, id: String) {
    world
        .orchestrator
        .unload_plugin(unquote(&id))
        .expect("unload");
}

#[when("method {method} of plugin {id} is invoked")]
fn when_invoked(world: &mut TestWorld, method: String, id: String) {
    world.call = Some(world.orchestrator.invoke(
        unquote(&id),
        unquote(&method),
        json!({}),
        LONG,
    ));
}

#[when("method {method} of plugin {id} is invoked with text {text}")]
fn when_invoked_with_text(world: &mut TestWorld, method: String, id: String, text: String) {
    world.call = Some(world.orchestrator.invoke(
        unquote(&id),
        unquote(&method),
        json!({"text": unquote(&text)}),
        LONG,
    ));
}

#[when("method {method} of plugin {id} is invoked with a timeout of {ms} milliseconds")]
fn when_invoked_with_timeout(world: &mut TestWorld, method: String, id: String, ms: u64) {
    world.call = Some(world.orchestrator.invoke(
        unquote(&id),
        unquote(&method),
        json!({}),
        Duration::from_millis(ms),
    ));
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("{count} plugins are catalogued")]
fn then_catalogued(world: &mut TestWorld, count: usize) {
    assert_eq!(world.discovered.len(), count);
}

#[then("{count} plugins are reported as skipped")]
fn then_skipped(world: &mut TestWorld, count: usize) {
    assert_eq!(world.orchestrator.diagnostics().len(), count);
}

#[then("plugin {id} is {state}")]
fn then_state(world: &mut TestWorld, id: String, state: String) {
    let expected = match state.as_str() {
        "not_loaded" => PluginState::NotLoaded,
        "ready" => PluginState::Ready,
        "crashed" => PluginState::Crashed,
        "stopped" => PluginState::Stopped,
        other => panic!("unknown state: {other}"),
    };
    let id = unquote(&id);
    let reached = wait_until(LONG, || world.orchestrator.status(id).ok() == Some(expected));
    assert!(
        reached,
        "plugin {id} is {:?}, expected {expected}",
        world.orchestrator.status(id)
    );
}

#[then("plugin {id} has started {count} times")]
fn then_started(world: &mut TestWorld, id: String, count: usize) {
    assert_eq!(start_count(&world.root.path().join(unquote(&id))), count);
}

#[then("the call returns an object with text {text}")]
fn then_returns_text(world: &mut TestWorld, text: String) {
    let value = call_result(world).as_ref().expect("call should succeed");
    assert_eq!(value, &json!({"text": unquote(&text)}));
}

#[then("the call returns the string {value}")]
fn then_returns_string(world: &mut TestWorld, value: String) {
    let result = call_result(world).as_ref().expect("call should succeed");
    assert_eq!(result, &json!(unquote(&value)));
}

#[then("the call fails with {kind}")]
fn then_call_fails(world: &mut TestWorld, kind: String) {
    let err = call_result(world).as_ref().expect_err("call should fail");
    let matched = match kind.as_str() {
        "not_loaded" => matches!(err, PluginError::PluginNotLoaded { .. }),
        "timeout" => matches!(err, PluginError::CallTimeout { .. }),
        "remote" => matches!(err, PluginError::RemoteError { .. }),
        "crashed" => matches!(err, PluginError::ProcessCrashed { .. }),
        other => panic!("unknown error kind: {other}"),
    };
    assert!(matched, "expected {kind}, got: {err}");
}

#[then("loading fails with a spawn error")]
fn then_load_fails(world: &mut TestWorld) {
    let result = world.load.as_ref().expect("no load captured");
    assert!(
        matches!(result, Err(PluginError::SpawnError { .. })),
        "got: {result:?}"
    );
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/plugin_orchestration.feature",
    name = "Discovery skips plugins with invalid manifests"
)]
fn discovery_skips_invalid(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/plugin_orchestration.feature",
    name = "Invoking a loaded plugin returns its result"
)]
fn invoke_loaded_plugin(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/plugin_orchestration.feature",
    name = "Invoking a plugin that was never loaded fails"
)]
fn invoke_unloaded_plugin(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/plugin_orchestration.feature",
    name = "A call without a reply times out and later calls still work"
)]
fn call_timeout(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/plugin_orchestration.feature",
    name = "Unknown methods surface the plugin's error"
)]
fn remote_error(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/plugin_orchestration.feature",
    name = "A crashing plugin fails its call and is marked crashed"
)]
fn crashing_plugin(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/plugin_orchestration.feature",
    name = "A plugin that exits during startup cannot be loaded"
)]
fn startup_failure(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/plugin_orchestration.feature",
    name = "Unloading a plugin stops it"
)]
fn unloading(world: TestWorld) {
    drop(world);
}
