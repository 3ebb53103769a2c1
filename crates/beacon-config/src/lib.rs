//! Layered configuration for the Beacon daemon.
//!
//! [`Config`] is loaded with `ortho_config`, which merges, from lowest to
//! highest precedence, the built-in defaults, a TOML configuration file
//! (`--config-path` or `BEACON_CONFIG_PATH`), `BEACON_*` environment
//! variables and command-line flags.
//!
//! Durations are stored as integer milliseconds or seconds so every layer
//! can express them; the accessor methods return [`Duration`] values.

mod defaults;
mod logging;


use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::defaults::{
    DEFAULT_BUS_RECONNECT_ATTEMPTS, DEFAULT_BUS_RECONNECT_BACKOFF_MS, DEFAULT_LOG_FILTER,
    DEFAULT_PLUGIN_INIT_TIMEOUT_MS, DEFAULT_RECONCILE_INTERVAL_SECS, DEFAULT_RESTART_BACKOFF_CAP_MS,
    DEFAULT_RESTART_BACKOFF_MS, DEFAULT_RESTART_MAX, DEFAULT_RESTART_WINDOW_SECS,
    DEFAULT_WORKER_CALL_TIMEOUT_MS, DEFAULT_WORKER_PREFIX, default_log_filter,
    default_log_filter_string, default_log_format, default_worker_prefix,
};
pub use self::logging::{LogFormat, LogFormatParseError};

/// Runtime configuration shared by the daemon and its plugin manager.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "BEACON")]
pub struct Config {
    /// `tracing` filter directive, e.g. `info,beacon_plugins=debug`.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// JSON plugin catalogue to activate at startup.
    pub plugin_catalog: Option<Utf8PathBuf>,
    /// Prefix prepended to worker plugin names to form process names.
    #[ortho_config(default = default_worker_prefix())]
    pub worker_prefix: String,
    /// Milliseconds an in-process plugin may spend initialising.
    #[ortho_config(default = DEFAULT_PLUGIN_INIT_TIMEOUT_MS)]
    pub plugin_init_timeout_ms: u64,
    /// Milliseconds allowed for one call into a worker.
    #[ortho_config(default = DEFAULT_WORKER_CALL_TIMEOUT_MS)]
    pub worker_call_timeout_ms: u64,
    /// Seconds between periodic reconciliations; `0` disables them.
    #[ortho_config(default = DEFAULT_RECONCILE_INTERVAL_SECS)]
    pub reconcile_interval_secs: u64,
    /// Attempts made to reopen a closed process-manager bus.
    #[ortho_config(default = DEFAULT_BUS_RECONNECT_ATTEMPTS)]
    pub bus_reconnect_attempts: u32,
    /// Base delay between bus reopen attempts, doubled per attempt.
    #[ortho_config(default = DEFAULT_BUS_RECONNECT_BACKOFF_MS)]
    pub bus_reconnect_backoff_ms: u64,
    /// Restarts allowed per plugin within one restart window.
    #[ortho_config(default = DEFAULT_RESTART_MAX)]
    pub restart_max: u32,
    /// Length of the restart window in seconds.
    #[ortho_config(default = DEFAULT_RESTART_WINDOW_SECS)]
    pub restart_window_secs: u64,
    /// Base restart backoff in milliseconds.
    #[ortho_config(default = DEFAULT_RESTART_BACKOFF_MS)]
    pub restart_backoff_ms: u64,
    /// Upper bound on the restart backoff in milliseconds.
    #[ortho_config(default = DEFAULT_RESTART_BACKOFF_CAP_MS)]
    pub restart_backoff_cap_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            plugin_catalog: None,
            worker_prefix: default_worker_prefix(),
            plugin_init_timeout_ms: DEFAULT_PLUGIN_INIT_TIMEOUT_MS,
            worker_call_timeout_ms: DEFAULT_WORKER_CALL_TIMEOUT_MS,
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            bus_reconnect_attempts: DEFAULT_BUS_RECONNECT_ATTEMPTS,
            bus_reconnect_backoff_ms: DEFAULT_BUS_RECONNECT_BACKOFF_MS,
            restart_max: DEFAULT_RESTART_MAX,
            restart_window_secs: DEFAULT_RESTART_WINDOW_SECS,
            restart_backoff_ms: DEFAULT_RESTART_BACKOFF_MS,
            restart_backoff_cap_ms: DEFAULT_RESTART_BACKOFF_CAP_MS,
        }
    }
}

/// A loaded configuration whose values cannot work together.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The worker prefix is empty.
    #[error("worker_prefix must not be empty")]
    EmptyWorkerPrefix,
    /// A timeout that must be positive is zero.
    #[error("{field} must be greater than zero")]
    ZeroTimeout {
        /// Offending field.
        field: &'static str,
    },
    /// The backoff cap is below the base backoff.
    #[error("restart_backoff_cap_ms ({cap}) is below restart_backoff_ms ({base})")]
    BackoffCapBelowBase {
        /// Configured base backoff.
        base: u64,
        /// Configured cap.
        cap: u64,
    },
    /// The log filter directive is blank.
    #[error("log_filter must not be blank")]
    BlankLogFilter,
}

impl Config {
    /// Checks that the loaded values are usable together.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::BlankLogFilter);
        }
        if self.worker_prefix.is_empty() {
            return Err(ConfigError::EmptyWorkerPrefix);
        }
        for (field, value) in [
            ("plugin_init_timeout_ms", self.plugin_init_timeout_ms),
            ("worker_call_timeout_ms", self.worker_call_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroTimeout { field });
            }
        }
        if self.restart_backoff_cap_ms < self.restart_backoff_ms {
            return Err(ConfigError::BackoffCapBelowBase {
                base: self.restart_backoff_ms,
                cap: self.restart_backoff_cap_ms,
            });
        }
        Ok(())
    }

    /// Log filter directive.
    #[must_use]
    pub const fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Plugin catalogue path, when one is configured.
    #[must_use]
    pub fn plugin_catalog(&self) -> Option<&camino::Utf8Path> {
        self.plugin_catalog.as_deref()
    }

    /// Time an in-process plugin may spend initialising.
    #[must_use]
    pub const fn plugin_init_timeout(&self) -> Duration {
        Duration::from_millis(self.plugin_init_timeout_ms)
    }

    /// Time allowed for one call into a worker.
    #[must_use]
    pub const fn worker_call_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_call_timeout_ms)
    }

    /// Period between reconciliations; zero disables them.
    #[must_use]
    pub const fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    /// Base delay between bus reopen attempts.
    #[must_use]
    pub const fn bus_reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.bus_reconnect_backoff_ms)
    }

    /// Length of the restart window.
    #[must_use]
    pub const fn restart_window(&self) -> Duration {
        Duration::from_secs(self.restart_window_secs)
    }

    /// Base restart backoff.
    #[must_use]
    pub const fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }

    /// Upper bound on the restart backoff.
    #[must_use]
    pub const fn restart_backoff_cap(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_cap_ms)
    }
}
