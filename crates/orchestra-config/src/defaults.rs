use std::time::Duration;

/// Plugins directory used when none is configured, relative to the working
/// directory.
pub const DEFAULT_PLUGINS_DIR: &str = "plugins";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Time a plugin may take to become ready before it is declared failed.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Time after which a live plugin is considered ready without having written
/// a diagnostic line.
pub const DEFAULT_READY_PROBE: Duration = Duration::from_millis(200);

/// Time a plugin is given to exit after a termination request.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(2);

/// Per-call timeout used when the caller does not choose one.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}
