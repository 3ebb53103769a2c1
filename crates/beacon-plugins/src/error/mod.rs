//! Domain errors raised by plugin orchestration.
//!
//! All errors use `thiserror`-derived enums with structured context so callers
//! can inspect the failure programmatically. Plugin-authored failures arrive
//! as [`BoxError`] and are flattened into a message at the boundary so the
//! error stays `Send + Sync` and cheap to log.

use thiserror::Error;

use crate::supervisor::{InstanceId, SupervisorError};

/// Error type returned by plugin-authored code (init hooks, event hooks and
/// verify callbacks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors arising from plugin orchestration.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The requested plugin is not loaded.
    #[error("plugin '{name}' is not loaded")]
    NotFound {
        /// Name that was looked up.
        name: String,
    },

    /// A plugin descriptor failed validation.
    #[error("invalid descriptor: {message}")]
    Descriptor {
        /// Description of the validation failure.
        message: String,
    },

    /// The plugin's init entry point failed or panicked.
    #[error("plugin '{name}' failed to activate: {message}")]
    Activation {
        /// Plugin name.
        name: String,
        /// Human-readable failure description.
        message: String,
    },

    /// The plugin's init entry point did not return in time.
    #[error("plugin '{name}' did not finish initialising within {timeout_ms}ms")]
    InitTimeout {
        /// Plugin name.
        name: String,
        /// Configured init timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The process manager failed to start worker instances.
    #[error("failed to spawn workers for plugin '{name}' ({started}/{requested} started): {source}")]
    Spawn {
        /// Plugin name.
        name: String,
        /// Number of instances requested.
        requested: u32,
        /// Number of instances the supervisor reports as running afterwards.
        started: usize,
        /// Underlying supervisor failure.
        #[source]
        source: SupervisorError,
    },

    /// No worker instance of the plugin is ready to accept work.
    #[error("no ready worker available for plugin '{name}'")]
    NoAvailableWorker {
        /// Plugin name.
        name: String,
    },

    /// A worker-delegated call exceeded its deadline.
    #[error("worker call to plugin '{name}' timed out after {timeout_ms}ms")]
    WorkerTimeout {
        /// Plugin name.
        name: String,
        /// Caller-supplied timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The worker handling a task exited before answering.
    #[error("worker {instance} of plugin '{name}' exited before completing the task")]
    WorkerExited {
        /// Plugin name.
        name: String,
        /// Instance that exited.
        instance: InstanceId,
    },

    /// The worker answered a task with an error.
    #[error("task failed in worker of plugin '{name}': {message}")]
    TaskFailed {
        /// Plugin name.
        name: String,
        /// Error reported by the worker.
        message: String,
    },

    /// A process manager call failed.
    #[error("process manager '{operation}' call failed: {source}")]
    Supervisor {
        /// Supervisor operation that failed.
        operation: &'static str,
        /// Underlying supervisor failure.
        #[source]
        source: SupervisorError,
    },

    /// No capability is registered under the requested name.
    #[error("no strategy registered under '{name}'")]
    UnknownStrategy {
        /// Strategy name that was looked up.
        name: String,
    },

    /// A strategy's verify callback failed or panicked.
    #[error("strategy '{name}' failed to verify credentials: {message}")]
    Verify {
        /// Strategy name.
        name: String,
        /// Human-readable failure description.
        message: String,
    },

    /// The plugin context was revoked after a failed activation.
    #[error("context of plugin '{name}' has been revoked")]
    ContextRevoked {
        /// Plugin name.
        name: String,
    },

    /// A message for a worker could not be serialised.
    #[error("failed to serialise worker message: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl PluginError {
    /// Builds an activation error from a plugin-authored failure.
    pub(crate) fn activation(name: &str, error: &BoxError) -> Self {
        Self::Activation {
            name: name.to_owned(),
            message: error.to_string(),
        }
    }
}
