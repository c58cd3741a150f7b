//! Request/response correlation over a plugin's standard streams.
//!
//! An [`RpcTransport`] writes one JSON-RPC request per line to the plugin's
//! stdin and matches response lines from its stdout back to waiting callers
//! by correlation id. Any number of calls may be outstanding at once; each
//! resolves as soon as its own response arrives.
//!
//! Requests are queued to a dedicated writer thread, the only code that
//! touches the plugin's input stream, so a plugin that stops reading its
//! input can delay delivery but never blocks a caller past its deadline.
//!
//! A dedicated reader thread parses the output stream. Lines that are not
//! usable responses are logged and dropped without disturbing the stream,
//! and responses whose id is no longer pending (because the caller timed
//! out) are dropped the same way.
//!
//! When the process exits, [`RpcTransport::fail_pending`] resolves every
//! outstanding call with [`PluginError::ProcessCrashed`] and closes the
//! transport to new calls.

use std::collections::HashMap;
use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::PluginError;
use crate::protocol::{RequestId, ResponsePayload, RpcMessage, RpcRequest, RpcResponse};
use crate::supervisor::{ExitReason, duration_ms};

/// Tracing target for transport events.
const TRANSPORT_TARGET: &str = "orchestra_plugins::transport";

/// JSON-RPC client bound to one plugin process.
pub struct RpcTransport {
    plugin: String,
    outbox: Sender<String>,
    pending: Arc<PendingTable>,
    next_id: AtomicU64,
}

impl RpcTransport {
    /// Creates a transport and starts its writer and reader threads.
    ///
    /// `writer` is the plugin's input stream and `reader` its output stream.
    /// The writer thread runs until the transport is dropped or a write
    /// fails; the reader thread runs until the output stream reaches
    /// end-of-file.
    #[must_use]
    pub fn start(
        plugin: impl Into<String>,
        writer: impl Write + Send + 'static,
        reader: impl Read + Send + 'static,
    ) -> Self {
        let plugin = plugin.into();
        let pending = Arc::new(PendingTable::default());

        let (outbox, queued) = mpsc::channel();
        let writer_plugin = plugin.clone();
        thread::spawn(move || write_loop(&writer_plugin, writer, &queued));

        let reader_plugin = plugin.clone();
        let reader_table = Arc::clone(&pending);
        thread::spawn(move || read_loop(&reader_plugin, reader, &reader_table));

        Self {
            plugin,
            outbox,
            pending,
            next_id: AtomicU64::new(1),
        }
    }

    /// Returns the identifier of the plugin this transport talks to.
    #[must_use]
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Sends a request and blocks until its response, the timeout, or the
    /// process exit, whichever comes first.
    ///
    /// The timeout is measured from entry and covers queueing and delivery
    /// of the request as well as the wait for the response.
    ///
    /// # Errors
    ///
    /// - [`PluginError::RemoteError`] if the plugin answered with an error.
    /// - [`PluginError::CallTimeout`] if no response arrived in time.
    /// - [`PluginError::ProcessCrashed`] if the process exited first, or had
    ///   already exited.
    /// - [`PluginError::SerializeRequest`] if `params` cannot be encoded.
    pub fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value, PluginError> {
        let started = Instant::now();
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let line = RpcRequest::new(id.clone(), method, params)
            .to_line()
            .map_err(|err| PluginError::SerializeRequest {
                id: self.plugin.clone(),
                source: Arc::new(err),
            })?;

        let (tx, rx) = mpsc::channel();
        self.pending
            .register(id.clone(), PendingCall::new(method, tx))
            .map_err(|reason| self.crashed(reason))?;
        let slot = SlotGuard {
            table: &self.pending,
            id: &id,
        };

        debug!(
            target: TRANSPORT_TARGET,
            plugin = self.plugin.as_str(),
            method,
            %id,
            "sending request"
        );
        if self.outbox.send(line).is_err() {
            // The writer has stopped; process exit arrives via fail_pending.
            warn!(
                target: TRANSPORT_TARGET,
                plugin = self.plugin.as_str(),
                method,
                "request writer has stopped"
            );
        }

        let remaining = timeout.saturating_sub(started.elapsed());
        let outcome = match rx.recv_timeout(remaining) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => {
                if slot.release() {
                    None
                } else {
                    // Resolved between the timeout and the release.
                    rx.try_recv().ok()
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                Some(CallOutcome::Crashed(self.pending.closed_reason()))
            }
        };

        match outcome {
            Some(CallOutcome::Response(ResponsePayload::Result(value))) => Ok(value),
            Some(CallOutcome::Response(ResponsePayload::Error(error))) => {
                Err(PluginError::RemoteError {
                    id: self.plugin.clone(),
                    code: error.code,
                    message: error.message,
                })
            }
            Some(CallOutcome::Crashed(reason)) => Err(self.crashed(reason)),
            None => {
                debug!(
                    target: TRANSPORT_TARGET,
                    plugin = self.plugin.as_str(),
                    method,
                    %id,
                    "call timed out"
                );
                Err(PluginError::CallTimeout {
                    id: self.plugin.clone(),
                    method: method.to_owned(),
                    timeout_ms: duration_ms(timeout),
                })
            }
        }
    }

    /// Resolves every outstanding call with [`PluginError::ProcessCrashed`]
    /// and rejects all later calls.
    pub fn fail_pending(&self, reason: ExitReason) {
        let failed = self.pending.close(reason);
        debug!(
            target: TRANSPORT_TARGET,
            plugin = self.plugin.as_str(),
            %reason,
            failed,
            "transport closed"
        );
    }

    /// Returns the number of calls awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().calls.len()
    }

    /// Returns `true` once the transport has been closed by a process exit.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pending.lock().closed.is_some()
    }

    fn crashed(&self, reason: ExitReason) -> PluginError {
        PluginError::ProcessCrashed {
            id: self.plugin.clone(),
            reason,
        }
    }
}

impl fmt::Debug for RpcTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcTransport")
            .field("plugin", &self.plugin)
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum CallOutcome {
    Response(ResponsePayload),
    Crashed(ExitReason),
}

/// One outstanding call. The params live only in the queued request line,
/// and the deadline is enforced by the waiting caller, so neither is kept.
#[derive(Debug)]
struct PendingCall {
    method: String,
    issued_at: Instant,
    tx: Sender<CallOutcome>,
}

impl PendingCall {
    fn new(method: &str, tx: Sender<CallOutcome>) -> Self {
        Self {
            method: method.to_owned(),
            issued_at: Instant::now(),
            tx,
        }
    }

    fn complete(self, outcome: CallOutcome) {
        // The waiter may already have given up.
        drop(self.tx.send(outcome));
    }
}

#[derive(Debug, Default)]
struct TableState {
    calls: HashMap<RequestId, PendingCall>,
    closed: Option<ExitReason>,
}

/// Outstanding calls keyed by correlation id. Every entry is removed exactly
/// once, and its completion is sent while the lock is held.
#[derive(Debug, Default)]
struct PendingTable {
    state: Mutex<TableState>,
}

impl PendingTable {
    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn register(&self, id: RequestId, call: PendingCall) -> Result<(), ExitReason> {
        let mut state = self.lock();
        if let Some(reason) = state.closed {
            return Err(reason);
        }
        state.calls.insert(id, call);
        Ok(())
    }

    fn remove(&self, id: &RequestId) -> bool {
        self.lock().calls.remove(id).is_some()
    }

    fn resolve(&self, plugin: &str, response: RpcResponse) -> bool {
        let mut state = self.lock();
        let Some(call) = state.calls.remove(&response.id) else {
            return false;
        };
        debug!(
            target: TRANSPORT_TARGET,
            plugin,
            method = call.method.as_str(),
            id = %response.id,
            elapsed_ms = duration_ms(call.issued_at.elapsed()),
            "response received"
        );
        call.complete(CallOutcome::Response(response.payload));
        true
    }

    fn close(&self, reason: ExitReason) -> usize {
        let mut state = self.lock();
        state.closed.get_or_insert(reason);
        let calls: Vec<PendingCall> = state.calls.drain().map(|(_, call)| call).collect();
        let failed = calls.len();
        for call in calls {
            call.complete(CallOutcome::Crashed(reason));
        }
        failed
    }

    fn closed_reason(&self) -> ExitReason {
        self.lock().closed.unwrap_or(ExitReason::Stopped)
    }
}

/// Releases a pending slot when the waiting caller leaves, including by
/// unwinding.
struct SlotGuard<'a> {
    table: &'a PendingTable,
    id: &'a RequestId,
}

impl SlotGuard<'_> {
    /// Removes the slot now. Returns `false` if it was already resolved.
    fn release(&self) -> bool {
        self.table.remove(self.id)
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.table.remove(self.id);
    }
}

fn write_loop(plugin: &str, mut writer: impl Write, queued: &Receiver<String>) {
    for line in queued {
        let written = writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.flush());
        if let Err(err) = written {
            // Callers still waiting are resolved by timeout or process exit.
            warn!(
                target: TRANSPORT_TARGET,
                plugin,
                error = %err,
                "failed to write request; stopping writer"
            );
            return;
        }
    }
    debug!(target: TRANSPORT_TARGET, plugin, "request writer finished");
}

fn read_loop(plugin: &str, reader: impl Read, table: &PendingTable) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => {
                debug!(target: TRANSPORT_TARGET, plugin, "plugin output closed");
                break;
            }
            Ok(_) => handle_line(plugin, &line, table),
            Err(err) => {
                warn!(
                    target: TRANSPORT_TARGET,
                    plugin,
                    error = %err,
                    "failed to read plugin output"
                );
                break;
            }
        }
    }
}

fn handle_line(plugin: &str, raw: &[u8], table: &PendingTable) {
    let Ok(text) = std::str::from_utf8(raw) else {
        report_malformed(plugin, "output line is not valid UTF-8".to_owned());
        return;
    };
    let text = text.trim();
    if text.is_empty() {
        return;
    }

    match RpcMessage::parse(text) {
        Ok(RpcMessage::Response(response)) => {
            let id = response.id.clone();
            if !table.resolve(plugin, response) {
                warn!(
                    target: TRANSPORT_TARGET,
                    plugin,
                    %id,
                    "dropping response with no pending call"
                );
            }
        }
        Ok(RpcMessage::Request { method, .. }) => {
            warn!(
                target: TRANSPORT_TARGET,
                plugin,
                method = method.as_str(),
                "ignoring plugin-initiated request"
            );
        }
        Err(violation) => report_malformed(plugin, violation.to_string()),
    }
}

fn report_malformed(plugin: &str, message: String) {
    let err = PluginError::MalformedResponse {
        id: plugin.to_owned(),
        message,
    };
    warn!(
        target: TRANSPORT_TARGET,
        plugin,
        error = %err,
        "dropping output line"
    );
}
