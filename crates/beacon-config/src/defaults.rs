//! Built-in configuration values.

use crate::logging::LogFormat;

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Prefix prepended to worker plugin names to form process names.
pub const DEFAULT_WORKER_PREFIX: &str = "beacon-plugin-";

/// Milliseconds an in-process plugin may spend in `init`.
pub const DEFAULT_PLUGIN_INIT_TIMEOUT_MS: u64 = 10_000;

/// Milliseconds allowed for one call into a worker.
pub const DEFAULT_WORKER_CALL_TIMEOUT_MS: u64 = 5_000;

/// Seconds between periodic worker reconciliations.
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 30;

/// Attempts made to reopen a closed process-manager bus.
pub const DEFAULT_BUS_RECONNECT_ATTEMPTS: u32 = 5;

/// Base delay between bus reopen attempts.
pub const DEFAULT_BUS_RECONNECT_BACKOFF_MS: u64 = 200;

/// Restarts allowed per plugin within one restart window.
pub const DEFAULT_RESTART_MAX: u32 = 5;

/// Length of the restart window.
pub const DEFAULT_RESTART_WINDOW_SECS: u64 = 60;

/// Base restart backoff.
pub const DEFAULT_RESTART_BACKOFF_MS: u64 = 250;

/// Upper bound on the restart backoff.
pub const DEFAULT_RESTART_BACKOFF_CAP_MS: u64 = 10_000;

/// Default log filter expression used by the daemon.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the daemon.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Owned worker prefix.
#[must_use]
pub fn default_worker_prefix() -> String {
    DEFAULT_WORKER_PREFIX.to_owned()
}
