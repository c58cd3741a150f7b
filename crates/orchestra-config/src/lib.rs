//! Shared configuration for the Orchestra plugin host.
//!
//! [`Config`] is resolved through `ortho_config`, which layers built-in
//! defaults, an optional configuration file, `ORCHESTRA_*` environment
//! variables, and command-line flags (highest precedence). Every field is
//! optional on the wire; the accessor methods fill in the documented
//! defaults so callers never have to.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;

pub use defaults::{
    DEFAULT_CALL_TIMEOUT, DEFAULT_LOG_FILTER, DEFAULT_PLUGINS_DIR, DEFAULT_READY_PROBE,
    DEFAULT_STARTUP_TIMEOUT, DEFAULT_STOP_GRACE, default_log_filter, default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Runtime configuration shared by the plugin host and its binaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "ORCHESTRA")]
pub struct Config {
    /// Directory whose immediate subdirectories each hold one plugin.
    #[serde(default)]
    pub plugins_dir: Option<Utf8PathBuf>,
    /// `tracing` filter expression, for example `orchestra_plugins=debug`.
    #[serde(default)]
    pub log_filter: Option<String>,
    /// Output format for log records.
    #[serde(default)]
    pub log_format: Option<LogFormat>,
    /// Upper bound, in milliseconds, on plugin startup.
    #[serde(default)]
    pub startup_timeout_ms: Option<u64>,
    /// Delay, in milliseconds, after which a live but silent plugin counts as
    /// ready.
    #[serde(default)]
    pub ready_probe_ms: Option<u64>,
    /// Grace period, in milliseconds, between a termination request and a
    /// forced kill.
    #[serde(default)]
    pub stop_grace_ms: Option<u64>,
    /// Default per-call timeout in milliseconds.
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
}

impl Config {
    /// Returns the plugins directory.
    #[must_use]
    pub fn plugins_dir(&self) -> &Utf8Path {
        self.plugins_dir
            .as_deref()
            .unwrap_or_else(|| Utf8Path::new(DEFAULT_PLUGINS_DIR))
    }

    /// Returns the log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Returns the log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }

    /// Returns the plugin startup timeout.
    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        self.startup_timeout_ms
            .map_or(DEFAULT_STARTUP_TIMEOUT, Duration::from_millis)
    }

    /// Returns the readiness probe delay.
    #[must_use]
    pub fn ready_probe(&self) -> Duration {
        self.ready_probe_ms
            .map_or(DEFAULT_READY_PROBE, Duration::from_millis)
    }

    /// Returns the stop grace period.
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        self.stop_grace_ms
            .map_or(DEFAULT_STOP_GRACE, Duration::from_millis)
    }

    /// Returns the default call timeout.
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout_ms
            .map_or(DEFAULT_CALL_TIMEOUT, Duration::from_millis)
    }

    /// Overrides the plugins directory.
    #[must_use]
    pub fn with_plugins_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.plugins_dir = Some(dir.into());
        self
    }
}
