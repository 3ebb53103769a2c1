//! Maps loaded configuration onto plugin manager settings.

use beacon_config::Config;
use beacon_plugins::{ManagerSettings, RestartSettings};

/// Builds the manager's runtime settings from `config`.
#[must_use]
pub fn manager_settings(config: &Config) -> ManagerSettings {
    ManagerSettings {
        worker_prefix: config.worker_prefix.clone(),
        init_timeout: config.plugin_init_timeout(),
        worker_call_timeout: config.worker_call_timeout(),
        reconcile_interval: config.reconcile_interval(),
        bus_reconnect_attempts: config.bus_reconnect_attempts,
        bus_reconnect_backoff: config.bus_reconnect_backoff(),
        restart: RestartSettings {
            max_restarts: config.restart_max,
            window: config.restart_window(),
            backoff_base: config.restart_backoff(),
            backoff_cap: config.restart_backoff_cap(),
        },
    }
}
