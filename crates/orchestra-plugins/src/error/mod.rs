//! Domain errors raised by plugin operations.
//!
//! All errors use `thiserror`-derived enums with structured context so callers
//! can inspect the failure programmatically. I/O and JSON errors are wrapped
//! in `Arc` so that [`PluginError`] stays `Clone`: a single failed plugin
//! start is fanned out to every caller waiting on it.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::supervisor::ExitReason;

/// Errors arising from plugin operations.
///
/// Manifest errors are contained by discovery, process errors abort a single
/// load, and call errors are returned to the one caller that issued the call.
#[derive(Debug, Clone, Error)]
pub enum PluginError {
    /// A plugin manifest was missing, unreadable, or failed validation.
    #[error("invalid manifest at {}: {message}", path.display())]
    ManifestInvalid {
        /// Manifest file (or plugin directory) that was rejected.
        path: PathBuf,
        /// Description of the validation failure.
        message: String,
    },

    /// No manifest with this identifier is known to the registry.
    #[error("plugin '{id}' is not known to the registry")]
    UnknownPlugin {
        /// Identifier that was looked up.
        id: String,
    },

    /// The plugin process could not be created.
    #[error("plugin '{id}' failed to start: {message}")]
    SpawnError {
        /// Plugin identifier.
        id: String,
        /// Human-readable failure description.
        message: String,
        /// Optional underlying I/O error.
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    /// The plugin did not become ready within the startup grace period.
    #[error("plugin '{id}' did not become ready within {timeout_ms}ms")]
    StartupTimeout {
        /// Plugin identifier.
        id: String,
        /// Configured startup timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The plugin must be loaded before it can be invoked.
    #[error("plugin '{id}' is not loaded")]
    PluginNotLoaded {
        /// Plugin identifier.
        id: String,
    },

    /// No response arrived for a call before its deadline.
    #[error("call to '{method}' on plugin '{id}' timed out after {timeout_ms}ms")]
    CallTimeout {
        /// Plugin identifier.
        id: String,
        /// Method that was called.
        method: String,
        /// Timeout applied to the call in milliseconds.
        timeout_ms: u64,
    },

    /// The plugin process terminated while the call was outstanding.
    #[error("plugin '{id}' process terminated ({reason})")]
    ProcessCrashed {
        /// Plugin identifier.
        id: String,
        /// How the process ended.
        reason: ExitReason,
    },

    /// The plugin answered with a JSON-RPC error object.
    #[error("plugin '{id}' returned error {code}: {message}")]
    RemoteError {
        /// Plugin identifier.
        id: String,
        /// JSON-RPC error code, reported verbatim.
        code: i64,
        /// JSON-RPC error message, reported verbatim.
        message: String,
    },

    /// A line on the plugin's output stream was not a usable response.
    ///
    /// The transport logs and drops these; they only reach a caller
    /// indirectly, as a [`PluginError::CallTimeout`].
    #[error("plugin '{id}' wrote a malformed response: {message}")]
    MalformedResponse {
        /// Plugin identifier.
        id: String,
        /// Description of the protocol violation.
        message: String,
    },

    /// The request could not be serialised to JSON.
    #[error("failed to serialise request for plugin '{id}': {source}")]
    SerializeRequest {
        /// Plugin identifier.
        id: String,
        /// Underlying JSON error.
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// An I/O error occurred outside of a specific plugin call.
    #[error("I/O error for {context}: {source}")]
    Io {
        /// What was being accessed.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl PluginError {
    /// Builds a [`PluginError::ManifestInvalid`] for the given path.
    pub(crate) fn manifest(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ManifestInvalid {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Builds a [`PluginError::Io`] wrapping the given I/O error.
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    /// Returns `true` for failures local to a single call.
    ///
    /// Call-level failures never change the plugin's lifecycle state.
    #[must_use]
    pub const fn is_call_failure(&self) -> bool {
        matches!(
            self,
            Self::CallTimeout { .. } | Self::ProcessCrashed { .. } | Self::RemoteError { .. }
        )
    }
}
