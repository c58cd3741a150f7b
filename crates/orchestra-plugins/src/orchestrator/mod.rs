//! Plugin lifecycle orchestration.
//!
//! The [`Orchestrator`] is the single entry point consumers use: discover
//! plugins, load one, invoke methods on it, and unload it. It owns one
//! record per plugin identifier and drives the state machine
//!
//! ```text
//! NotLoaded -> Starting -> Ready -> Crashed
//!                  |                   |
//!                  +-----> Crashed     +-> Starting (explicit reload)
//! any -> Stopped (unload)
//! ```
//!
//! Each record sits behind its own mutex and condition variable, so a slow
//! start of one plugin never blocks calls to another, and concurrent loads of
//! the same plugin share a single in-flight start.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock, RwLockReadGuard, Weak};
use std::time::Duration;

use orchestra_config::{Config, DEFAULT_CALL_TIMEOUT};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::PluginError;
use crate::manifest::PluginManifest;
use crate::registry::PluginRegistry;
use crate::supervisor::{ExitReason, ProcessSupervisor, SupervisorConfig};
use crate::transport::RpcTransport;

/// Tracing target for lifecycle transitions.
const ORCHESTRATOR_TARGET: &str = "orchestra_plugins::orchestrator";

/// Lifecycle state of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    /// Known from discovery; no process.
    NotLoaded,
    /// A process is being started.
    Starting,
    /// The process is running and accepting calls.
    Ready,
    /// The process failed to start or terminated unexpectedly.
    Crashed,
    /// The process was stopped on request.
    Stopped,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotLoaded => "not_loaded",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Crashed => "crashed",
            Self::Stopped => "stopped",
        })
    }
}

/// Snapshot of one catalogued plugin and its state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRecord {
    /// The plugin's manifest.
    pub manifest: PluginManifest,
    /// State at the time of the snapshot.
    pub state: PluginState,
}

struct SlotState {
    state: PluginState,
    /// Incremented whenever a start begins or a process is released, so
    /// exit handlers of earlier processes can recognise themselves as stale.
    generation: u64,
    startup_error: Option<PluginError>,
    supervisor: Option<ProcessSupervisor>,
    transport: Option<Arc<RpcTransport>>,
}

struct PluginSlot {
    state: Mutex<SlotState>,
    changed: Condvar,
}

impl PluginSlot {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                state: PluginState::NotLoaded,
                generation: 0,
                startup_error: None,
                supervisor: None,
                transport: None,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, SlotState>) -> MutexGuard<'a, SlotState> {
        self.changed
            .wait(guard)
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Waits until no start is in flight.
    fn lock_settled(&self) -> MutexGuard<'_, SlotState> {
        let mut state = self.lock();
        while state.state == PluginState::Starting {
            state = self.wait(state);
        }
        state
    }
}

/// Coordinates discovery, process lifecycle, and calls for all plugins.
///
/// # Example
///
/// ```no_run
/// use orchestra_plugins::{Orchestrator, SupervisorConfig};
/// use serde_json::json;
/// use std::time::Duration;
///
/// let orchestrator = Orchestrator::new("/opt/app/plugins", SupervisorConfig::default());
/// orchestrator.discover_plugins().expect("plugins directory is readable");
/// orchestrator.load_plugin("docx").expect("plugin starts");
/// let reply = orchestrator
///     .invoke("docx", "chat", json!({"prompt": "hello"}), Duration::from_secs(30))
///     .expect("call succeeds");
/// println!("{reply}");
/// orchestrator.unload_plugin("docx").expect("known plugin");
/// ```
pub struct Orchestrator {
    plugins_dir: PathBuf,
    supervisor_config: SupervisorConfig,
    call_timeout: Duration,
    registry: RwLock<PluginRegistry>,
    slots: Mutex<HashMap<String, Arc<PluginSlot>>>,
}

impl Orchestrator {
    /// Creates an orchestrator over `plugins_dir`. Nothing is scanned until
    /// [`Orchestrator::discover_plugins`] is called.
    #[must_use]
    pub fn new(plugins_dir: impl Into<PathBuf>, supervisor_config: SupervisorConfig) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
            supervisor_config,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            registry: RwLock::new(PluginRegistry::new()),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an orchestrator from layered configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut orchestrator = Self::new(
            config.plugins_dir().as_std_path(),
            SupervisorConfig::from(config),
        );
        orchestrator.call_timeout = config.call_timeout();
        orchestrator
    }

    /// Returns the plugins root this orchestrator scans.
    #[must_use]
    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Returns the configured default call timeout.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Rescans the plugins directory and returns the valid manifests in
    /// directory order. Never starts or stops a process.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] if the plugins directory exists but
    /// cannot be read.
    pub fn discover_plugins(&self) -> Result<Vec<PluginManifest>, PluginError> {
        let mut registry = self
            .registry
            .write()
            .unwrap_or_else(|poison| poison.into_inner());
        let manifests = registry.scan(&self.plugins_dir)?;
        info!(
            target: ORCHESTRATOR_TARGET,
            discovered = manifests.len(),
            skipped = registry.diagnostics().len(),
            "plugins discovered"
        );
        Ok(manifests)
    }

    /// Returns the errors for plugins skipped by the last discovery.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<PluginError> {
        self.registry().diagnostics().to_vec()
    }

    fn registry(&self) -> RwLockReadGuard<'_, PluginRegistry> {
        self.registry
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn manifest(&self, id: &str) -> Result<PluginManifest, PluginError> {
        self.registry().get(id).cloned()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Arc<PluginSlot>>> {
        self.slots
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn slot(&self, id: &str) -> Arc<PluginSlot> {
        Arc::clone(
            self.slots()
                .entry(id.to_owned())
                .or_insert_with(|| Arc::new(PluginSlot::new())),
        )
    }

    fn existing_slot(&self, id: &str) -> Option<Arc<PluginSlot>> {
        self.slots().get(id).map(Arc::clone)
    }

    /// Starts the plugin's process and makes it ready for calls.
    ///
    /// Loading a ready plugin is a no-op. Loading a plugin that is already
    /// starting waits for that start and returns its outcome. A crashed or
    /// stopped plugin is started afresh.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownPlugin`] if the identifier was not
    /// discovered, or the start failure ([`PluginError::SpawnError`],
    /// [`PluginError::StartupTimeout`]).
    pub fn load_plugin(&self, id: &str) -> Result<(), PluginError> {
        let manifest = self.manifest(id)?;
        let slot = self.slot(id);

        let mut state = slot.lock();
        loop {
            match state.state {
                PluginState::Ready => return Ok(()),
                PluginState::Starting => {
                    let generation = state.generation;
                    while state.state == PluginState::Starting && state.generation == generation
                    {
                        state = slot.wait(state);
                    }
                    if state.generation == generation {
                        return state.startup_error.clone().map_or(Ok(()), Err);
                    }
                }
                PluginState::NotLoaded | PluginState::Crashed | PluginState::Stopped => break,
            }
        }

        state.state = PluginState::Starting;
        state.generation += 1;
        state.startup_error = None;
        let generation = state.generation;
        drop(state);

        debug!(target: ORCHESTRATOR_TARGET, plugin = id, generation, "loading plugin");
        self.start_process(id, manifest, &slot, generation)
    }

    fn start_process(
        &self,
        id: &str,
        manifest: PluginManifest,
        slot: &Arc<PluginSlot>,
        generation: u64,
    ) -> Result<(), PluginError> {
        let mut supervisor = ProcessSupervisor::new(manifest, self.supervisor_config);
        let streams = match supervisor.start() {
            Ok(streams) => streams,
            Err(err) => {
                warn!(
                    target: ORCHESTRATOR_TARGET,
                    plugin = id,
                    error = %err,
                    "plugin failed to start"
                );
                let mut state = slot.lock();
                state.state = PluginState::Crashed;
                state.startup_error = Some(err.clone());
                slot.changed.notify_all();
                return Err(err);
            }
        };

        let transport = Arc::new(RpcTransport::start(id, streams.stdin, streams.stdout));
        let exit_slot = Arc::downgrade(slot);
        let exit_transport = Arc::clone(&transport);
        let plugin = id.to_owned();
        supervisor.on_exit(move |reason| {
            handle_exit(&plugin, &exit_slot, generation, &exit_transport, reason);
        });

        let mut state = slot.lock();
        if state.generation != generation || state.state != PluginState::Starting {
            // The process died before it could be marked ready.
            let err = state
                .startup_error
                .clone()
                .unwrap_or_else(|| PluginError::ProcessCrashed {
                    id: id.to_owned(),
                    reason: supervisor.exit_reason().unwrap_or(ExitReason::Stopped),
                });
            slot.changed.notify_all();
            drop(state);
            return Err(err);
        }

        state.state = PluginState::Ready;
        state.supervisor = Some(supervisor);
        state.transport = Some(transport);
        slot.changed.notify_all();
        info!(target: ORCHESTRATOR_TARGET, plugin = id, "plugin ready");
        Ok(())
    }

    /// Calls `method` on a ready plugin and returns its result.
    ///
    /// Never loads the plugin implicitly.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::PluginNotLoaded`] unless the plugin is
    /// [`PluginState::Ready`], otherwise the call failure
    /// ([`PluginError::RemoteError`], [`PluginError::CallTimeout`],
    /// [`PluginError::ProcessCrashed`]).
    pub fn invoke(
        &self,
        id: &str,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, PluginError> {
        let not_loaded = || PluginError::PluginNotLoaded { id: id.to_owned() };
        let transport = {
            let slot = self.existing_slot(id).ok_or_else(not_loaded)?;
            let state = slot.lock();
            if state.state != PluginState::Ready {
                return Err(not_loaded());
            }
            state.transport.clone().ok_or_else(not_loaded)?
        };
        transport.call(method, params, timeout)
    }

    /// Stops the plugin's process and marks it stopped.
    ///
    /// Calls still pending fail with [`PluginError::ProcessCrashed`]. A
    /// plugin that was never loaded is left untouched. A plugin loaded
    /// earlier is stopped even if a later discovery no longer lists it.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownPlugin`] if the identifier is neither
    /// catalogued nor was ever loaded.
    pub fn unload_plugin(&self, id: &str) -> Result<(), PluginError> {
        let Some(slot) = self.existing_slot(id) else {
            self.manifest(id)?;
            return Ok(());
        };
        release(id, &slot, true);
        Ok(())
    }

    /// Returns the plugin's current state.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownPlugin`] if the identifier is neither
    /// catalogued nor was ever loaded.
    pub fn status(&self, id: &str) -> Result<PluginState, PluginError> {
        if let Some(slot) = self.existing_slot(id) {
            return Ok(slot.lock().state);
        }
        self.manifest(id)?;
        Ok(PluginState::NotLoaded)
    }

    fn state_of(&self, id: &str) -> PluginState {
        self.existing_slot(id)
            .map_or(PluginState::NotLoaded, |slot| slot.lock().state)
    }

    /// Returns every catalogued plugin with its current state, in discovery
    /// order.
    #[must_use]
    pub fn records(&self) -> Vec<PluginRecord> {
        let manifests: Vec<PluginManifest> = self.registry().manifests().cloned().collect();
        manifests
            .into_iter()
            .map(|manifest| {
                let state = self.state_of(manifest.id());
                PluginRecord { manifest, state }
            })
            .collect()
    }

    /// Gracefully stops every running plugin.
    pub fn shutdown(&self) {
        self.release_all(true);
    }

    fn release_all(&self, graceful: bool) {
        let slots: Vec<(String, Arc<PluginSlot>)> = self
            .slots()
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect();
        for (id, slot) in slots {
            release(&id, &slot, graceful);
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.release_all(false);
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("plugins_dir", &self.plugins_dir)
            .field("supervisor_config", &self.supervisor_config)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

/// Takes the process out of a slot and stops it. The slot lock is not held
/// while the process is stopped.
fn release(id: &str, slot: &PluginSlot, graceful: bool) {
    let mut state = slot.lock_settled();
    if state.state == PluginState::NotLoaded {
        return;
    }
    let previous = state.state;
    state.state = PluginState::Stopped;
    state.generation += 1;
    let supervisor = state.supervisor.take();
    let transport = state.transport.take();
    drop(state);

    if let Some(mut supervisor) = supervisor {
        supervisor.stop(graceful);
    }
    if let Some(transport) = transport {
        transport.fail_pending(ExitReason::Stopped);
    }
    if previous != PluginState::Stopped {
        info!(target: ORCHESTRATOR_TARGET, plugin = id, %previous, "plugin stopped");
    }
}

/// Exit handler wired to each started process.
fn handle_exit(
    plugin: &str,
    slot: &Weak<PluginSlot>,
    generation: u64,
    transport: &RpcTransport,
    reason: ExitReason,
) {
    transport.fail_pending(reason);

    let Some(slot) = slot.upgrade() else {
        return;
    };
    let mut state = slot.lock();
    if state.generation != generation {
        return;
    }
    match state.state {
        PluginState::Starting => {
            state.state = PluginState::Crashed;
            state.startup_error = Some(PluginError::ProcessCrashed {
                id: plugin.to_owned(),
                reason,
            });
            slot.changed.notify_all();
        }
        PluginState::Ready => {
            state.state = PluginState::Crashed;
            let supervisor = state.supervisor.take();
            let transport = state.transport.take();
            drop(state);
            warn!(
                target: ORCHESTRATOR_TARGET,
                plugin,
                %reason,
                "plugin crashed"
            );
            drop((supervisor, transport));
        }
        PluginState::NotLoaded | PluginState::Crashed | PluginState::Stopped => {}
    }
}
