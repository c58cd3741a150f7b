//! Plugin process lifecycle: spawn, readiness, exit detection, and stop.
//!
//! A [`ProcessSupervisor`] owns exactly one child process for one plugin
//! manifest. [`ProcessSupervisor::start`] spawns the manifest's entry command
//! with all three standard streams piped and hands stdin/stdout back to the
//! caller for the RPC transport. Stderr stays with the supervisor: a
//! dedicated thread drains it into the log, and its first line doubles as
//! the readiness signal.
//!
//! Exit is detected by a monitor thread polling the child. Subscribers
//! registered with [`ProcessSupervisor::on_exit`] are told exactly once, with
//! [`ExitReason::Stopped`] when the host asked for the stop and the observed
//! status otherwise. The supervisor never restarts a process.

mod exit;

use std::io::{self, BufRead, BufReader};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use orchestra_config::Config;
use tracing::{debug, info, warn};

pub(crate) use self::exit::ExitNotifier;
pub use self::exit::ExitReason;
use crate::error::PluginError;
use crate::manifest::PluginManifest;

/// Tracing target for process lifecycle events.
const SUPERVISOR_TARGET: &str = "orchestra_plugins::supervisor";

/// Interval between child status checks.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Timing parameters for starting and stopping plugin processes.
///
/// A plugin is ready on its first stderr line or, failing that, once it has
/// stayed alive for `ready_probe`. Setting `ready_probe` to at least
/// `startup_timeout` disables the liveness fallback: the plugin must then
/// write to stderr within `startup_timeout` or fail with
/// [`PluginError::StartupTimeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Upper bound on the time a plugin may take to become ready.
    pub startup_timeout: Duration,
    /// A plugin still alive after this delay is considered ready, provided
    /// the delay is shorter than `startup_timeout`.
    pub ready_probe: Duration,
    /// Time a plugin is given to exit after SIGTERM before it is killed.
    pub stop_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SupervisorConfig {
    fn from(config: &Config) -> Self {
        Self {
            startup_timeout: config.startup_timeout(),
            ready_probe: config.ready_probe(),
            stop_grace: config.stop_grace(),
        }
    }
}

/// Streams of a started plugin process, handed to the RPC transport.
#[derive(Debug)]
pub struct PluginStreams {
    /// Plugin stdin; the host writes requests here.
    pub stdin: ChildStdin,
    /// Plugin stdout; the plugin writes responses here.
    pub stdout: ChildStdout,
    /// Operating-system process id.
    pub pid: u32,
}

/// Supervises a single plugin process.
#[derive(Debug)]
pub struct ProcessSupervisor {
    manifest: PluginManifest,
    config: SupervisorConfig,
    child: Option<Arc<Mutex<Child>>>,
    pid: Option<u32>,
    started: bool,
    stopping: Arc<AtomicBool>,
    exit: Arc<ExitNotifier>,
}

impl ProcessSupervisor {
    /// Creates a supervisor for `manifest`. No process is spawned yet.
    #[must_use]
    pub fn new(manifest: PluginManifest, config: SupervisorConfig) -> Self {
        Self {
            manifest,
            config,
            child: None,
            pid: None,
            started: false,
            stopping: Arc::new(AtomicBool::new(false)),
            exit: Arc::new(ExitNotifier::default()),
        }
    }

    /// Returns the supervised plugin's manifest.
    #[must_use]
    pub const fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    /// Returns the process id while a process is held.
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Spawns the plugin and waits until it is ready.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::SpawnError`] if the executable cannot be
    /// started, the process exits before becoming ready, or this supervisor
    /// was already started. Returns [`PluginError::StartupTimeout`] if the
    /// process neither signals readiness nor outlives the readiness probe
    /// before the startup timeout; the process is killed in that case.
    pub fn start(&mut self) -> Result<PluginStreams, PluginError> {
        if self.started {
            return Err(self.spawn_error("supervisor already started", None));
        }
        self.started = true;

        let program = self.manifest.program();
        debug!(
            target: SUPERVISOR_TARGET,
            plugin = self.manifest.id(),
            program = %program.display(),
            args = ?self.manifest.entry().args(),
            "spawning plugin process"
        );

        let mut child = Command::new(&program)
            .args(self.manifest.entry().args())
            .current_dir(self.manifest.directory())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                let message = if err.kind() == io::ErrorKind::NotFound {
                    format!("executable not found: {}", program.display())
                } else {
                    format!("failed to spawn {}", program.display())
                };
                self.spawn_error(message, Some(err))
            })?;

        let pid = child.id();
        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            kill_and_reap(&mut child);
            return Err(self.spawn_error("failed to capture standard streams", None));
        };

        let (ready_tx, ready_rx) = mpsc::channel();
        spawn_stderr_drain(self.manifest.id().to_owned(), stderr, ready_tx);

        let child = Arc::new(Mutex::new(child));
        if let Err(err) = self.await_ready(&child, &ready_rx) {
            let status = kill_and_reap(&mut lock_child(&child));
            self.exit.fire(status.map_or(ExitReason::Stopped, ExitReason::from_status));
            return Err(err);
        }

        spawn_monitor(
            self.manifest.id().to_owned(),
            Arc::clone(&child),
            Arc::clone(&self.stopping),
            Arc::clone(&self.exit),
        );
        self.child = Some(child);
        self.pid = Some(pid);

        info!(
            target: SUPERVISOR_TARGET,
            plugin = self.manifest.id(),
            pid,
            "plugin process ready"
        );
        Ok(PluginStreams { stdin, stdout, pid })
    }

    fn await_ready(
        &self,
        child: &Mutex<Child>,
        ready_rx: &Receiver<()>,
    ) -> Result<(), PluginError> {
        let started_at = Instant::now();
        loop {
            match ready_rx.recv_timeout(POLL_INTERVAL) {
                Ok(()) => {
                    debug!(
                        target: SUPERVISOR_TARGET,
                        plugin = self.manifest.id(),
                        "plugin signalled readiness on stderr"
                    );
                    return Ok(());
                }
                Err(RecvTimeoutError::Timeout) => {}
                // Stderr closed without a line; fall back to polling.
                Err(RecvTimeoutError::Disconnected) => thread::sleep(POLL_INTERVAL),
            }

            let status = lock_child(child)
                .try_wait()
                .map_err(|err| self.spawn_error("failed to query process status", Some(err)))?;
            if let Some(status) = status {
                return Err(self.spawn_error(
                    format!(
                        "process exited during startup ({})",
                        ExitReason::from_status(status)
                    ),
                    None,
                ));
            }

            let elapsed = started_at.elapsed();
            if elapsed >= self.config.startup_timeout {
                warn!(
                    target: SUPERVISOR_TARGET,
                    plugin = self.manifest.id(),
                    timeout_ms = duration_ms(self.config.startup_timeout),
                    "plugin did not become ready; killing"
                );
                return Err(PluginError::StartupTimeout {
                    id: self.manifest.id().to_owned(),
                    timeout_ms: duration_ms(self.config.startup_timeout),
                });
            }
            if elapsed >= self.config.ready_probe {
                return Ok(());
            }
        }
    }

    /// Returns `true` while the process is running. Never blocks on the
    /// process.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.child
            .as_ref()
            .is_some_and(|child| matches!(lock_child(child).try_wait(), Ok(None)))
    }

    /// Registers a handler invoked once when the process terminates.
    ///
    /// If the process has already terminated the handler runs immediately
    /// on the calling thread.
    pub fn on_exit(&self, handler: impl FnOnce(ExitReason) + Send + 'static) {
        self.exit.subscribe(Box::new(handler));
    }

    /// Returns the exit reason once the process has terminated.
    #[must_use]
    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.exit.reason()
    }

    /// Stops the process and releases it.
    ///
    /// A graceful stop sends SIGTERM and waits up to the stop grace period
    /// before killing; a non-graceful stop kills at once. Exit handlers fire
    /// with [`ExitReason::Stopped`] unless the process had already exited.
    pub fn stop(&mut self, graceful: bool) {
        let Some(child) = self.child.take() else {
            return;
        };
        self.pid = None;
        self.stopping.store(true, Ordering::SeqCst);

        debug!(
            target: SUPERVISOR_TARGET,
            plugin = self.manifest.id(),
            graceful,
            "stopping plugin process"
        );

        let exited_gracefully = graceful && self.terminate_gracefully(&child);
        if !exited_gracefully {
            kill_and_reap(&mut lock_child(&child));
        }

        self.exit.fire(ExitReason::Stopped);
        info!(
            target: SUPERVISOR_TARGET,
            plugin = self.manifest.id(),
            "plugin process stopped"
        );
    }

    fn terminate_gracefully(&self, child: &Mutex<Child>) -> bool {
        {
            let mut guard = lock_child(child);
            if matches!(guard.try_wait(), Ok(Some(_))) {
                return true;
            }
            if let Err(err) = request_termination(&mut guard) {
                warn!(
                    target: SUPERVISOR_TARGET,
                    plugin = self.manifest.id(),
                    error = %err,
                    "failed to signal plugin process"
                );
                return false;
            }
        }

        let deadline = Instant::now() + self.config.stop_grace;
        while Instant::now() < deadline {
            if matches!(lock_child(child).try_wait(), Ok(Some(_))) {
                return true;
            }
            thread::sleep(POLL_INTERVAL);
        }

        warn!(
            target: SUPERVISOR_TARGET,
            plugin = self.manifest.id(),
            grace_ms = duration_ms(self.config.stop_grace),
            "plugin did not exit within grace period; killing"
        );
        false
    }

    fn spawn_error(&self, message: impl Into<String>, source: Option<io::Error>) -> PluginError {
        PluginError::SpawnError {
            id: self.manifest.id().to_owned(),
            message: message.into(),
            source: source.map(Arc::new),
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if let Some(child) = self.child.take() {
            self.stopping.store(true, Ordering::SeqCst);
            kill_and_reap(&mut lock_child(&child));
            self.exit.fire(ExitReason::Stopped);
        }
    }
}

fn lock_child(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(|poison| poison.into_inner())
}

/// Kills the child if it is still running and reaps it.
fn kill_and_reap(child: &mut Child) -> Option<ExitStatus> {
    if let Ok(Some(status)) = child.try_wait() {
        return Some(status);
    }
    if let Err(err) = child.kill() {
        warn!(
            target: SUPERVISOR_TARGET,
            pid = child.id(),
            error = %err,
            "failed to kill plugin process"
        );
    }
    child.wait().ok()
}

#[cfg(unix)]
fn request_termination(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let pid = i32::try_from(child.id()).map_err(io::Error::other)?;
    kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) -> io::Result<()> {
    child.kill()
}

fn spawn_stderr_drain(plugin: String, stderr: ChildStderr, ready_tx: Sender<()>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        let mut line = Vec::new();
        let mut ready_tx = Some(ready_tx);
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    debug!(
                        target: SUPERVISOR_TARGET,
                        plugin = plugin.as_str(),
                        line = text.trim_end(),
                        "plugin stderr"
                    );
                    if let Some(tx) = ready_tx.take() {
                        drop(tx.send(()));
                    }
                }
                Err(err) => {
                    debug!(
                        target: SUPERVISOR_TARGET,
                        plugin = plugin.as_str(),
                        error = %err,
                        "stopped reading plugin stderr"
                    );
                    break;
                }
            }
        }
    });
}

fn spawn_monitor(
    plugin: String,
    child: Arc<Mutex<Child>>,
    stopping: Arc<AtomicBool>,
    exit: Arc<ExitNotifier>,
) {
    thread::spawn(move || {
        loop {
            let status = lock_child(&child).try_wait();
            match status {
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Ok(Some(status)) => {
                    let reason = if stopping.load(Ordering::SeqCst) {
                        ExitReason::Stopped
                    } else {
                        ExitReason::from_status(status)
                    };
                    if reason != ExitReason::Stopped {
                        warn!(
                            target: SUPERVISOR_TARGET,
                            plugin = plugin.as_str(),
                            %reason,
                            "plugin process terminated unexpectedly"
                        );
                    }
                    exit.fire(reason);
                    break;
                }
                Err(err) => {
                    warn!(
                        target: SUPERVISOR_TARGET,
                        plugin = plugin.as_str(),
                        error = %err,
                        "failed to poll plugin process; assuming it exited"
                    );
                    exit.fire(ExitReason::Exited { code: -1 });
                    break;
                }
            }
        }
    });
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
