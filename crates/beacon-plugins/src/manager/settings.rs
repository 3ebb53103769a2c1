//! Tunables of the plugins manager.

use std::time::Duration;

use crate::restart::RestartSettings;

/// Default process-name prefix for worker instances.
pub const DEFAULT_WORKER_PREFIX: &str = "beacon-plugin-";

/// Runtime settings for [`PluginsManager`](super::PluginsManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Prefix prepended to plugin names to form worker process names.
    pub worker_prefix: String,
    /// Deadline for one in-process `init` call.
    pub init_timeout: Duration,
    /// Default deadline for worker-delegated calls made by the daemon.
    pub worker_call_timeout: Duration,
    /// Period of the background reconcile; zero disables it.
    pub reconcile_interval: Duration,
    /// Attempts to reopen the bus after it closes.
    pub bus_reconnect_attempts: u32,
    /// Delay before the first reopen attempt; doubles after each failure.
    pub bus_reconnect_backoff: Duration,
    /// Bounds of the default restart policy.
    pub restart: RestartSettings,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            worker_prefix: DEFAULT_WORKER_PREFIX.to_owned(),
            init_timeout: Duration::from_secs(10),
            worker_call_timeout: Duration::from_secs(5),
            reconcile_interval: Duration::from_secs(30),
            bus_reconnect_attempts: 5,
            bus_reconnect_backoff: Duration::from_millis(200),
            restart: RestartSettings::default(),
        }
    }
}
