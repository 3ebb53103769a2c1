//! Plugin descriptor types describing identity and activation mode.
//!
//! A [`PluginDescriptor`] declares everything the manager needs to activate a
//! plugin: its name, version, whether it runs in-process or in worker
//! processes, how many worker instances to keep, and the plugin-supplied
//! configuration handed to its init entry point. Descriptors are immutable
//! once loaded and are validated before activation to reject obviously
//! invalid configurations early.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PluginError;
use crate::supervisor::ProcessSpec;

/// Default number of worker instances for worker-mode plugins.
const DEFAULT_INSTANCES: u32 = 1;

/// Where a plugin runs.
///
/// # Example
///
/// ```
/// use beacon_plugins::ActivationMode;
///
/// let mode = ActivationMode::Worker;
/// assert_eq!(mode.as_str(), "worker");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    /// The plugin's init entry point runs inside the server process.
    #[default]
    InProcess,
    /// The plugin runs in isolated worker processes.
    Worker,
}

impl ActivationMode {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProcess => "in_process",
            Self::Worker => "worker",
        }
    }
}

impl std::fmt::Display for ActivationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative description of an installed plugin.
///
/// # Example
///
/// ```
/// use beacon_plugins::{ActivationMode, PluginDescriptor};
/// use std::path::PathBuf;
///
/// let descriptor = PluginDescriptor::worker(
///     "indexer",
///     "1.2.0",
///     PathBuf::from("/opt/beacon/plugins/indexer"),
///     3,
/// );
///
/// assert_eq!(descriptor.mode(), ActivationMode::Worker);
/// assert_eq!(descriptor.instances(), 3);
/// assert!(descriptor.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    mode: ActivationMode,
    #[serde(default = "default_instances")]
    instances: u32,
    #[serde(default)]
    executable: Option<PathBuf>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    config: serde_json::Value,
}

const fn default_instances() -> u32 {
    DEFAULT_INSTANCES
}

impl PluginDescriptor {
    /// Creates a descriptor for a plugin initialised inside the server.
    #[must_use]
    pub fn in_process(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            mode: ActivationMode::InProcess,
            instances: DEFAULT_INSTANCES,
            executable: None,
            args: Vec::new(),
            config: serde_json::Value::Null,
        }
    }

    /// Creates a descriptor for a plugin run in `instances` worker processes.
    #[must_use]
    pub fn worker(
        name: impl Into<String>,
        version: impl Into<String>,
        executable: PathBuf,
        instances: u32,
    ) -> Self {
        Self {
            mode: ActivationMode::Worker,
            instances,
            executable: Some(executable),
            ..Self::in_process(name, version)
        }
    }

    /// Attaches plugin-supplied configuration.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Sets the arguments passed to worker executables.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Validates the descriptor, returning an error if it is malformed.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Descriptor`] if the name is empty, or if a
    /// worker-mode descriptor asks for zero instances or lacks an absolute
    /// executable path.
    pub fn validate(&self) -> Result<(), PluginError> {
        if self.name.trim().is_empty() {
            return Err(PluginError::Descriptor {
                message: String::from("plugin name must not be empty"),
            });
        }
        if self.mode == ActivationMode::InProcess {
            return Ok(());
        }
        if self.instances == 0 {
            return Err(PluginError::Descriptor {
                message: format!("worker plugin '{}' must request at least one instance", self.name),
            });
        }
        match &self.executable {
            Some(path) if path.is_absolute() => Ok(()),
            Some(path) => Err(PluginError::Descriptor {
                message: format!(
                    "worker executable must be an absolute path, got '{}'",
                    path.display()
                ),
            }),
            None => Err(PluginError::Descriptor {
                message: format!("worker plugin '{}' has no executable", self.name),
            }),
        }
    }

    /// Builds the process-manager start request for a worker-mode plugin.
    ///
    /// The process name is the plugin name prefixed with `prefix`. Returns
    /// `None` for in-process plugins or when no executable is declared.
    #[must_use]
    pub fn process_spec(&self, prefix: &str) -> Option<ProcessSpec> {
        if self.mode != ActivationMode::Worker {
            return None;
        }
        let executable = self.executable.as_ref()?;
        Some(
            ProcessSpec::new(format!("{prefix}{}", self.name), executable, self.instances)
                .with_args(self.args.clone()),
        )
    }

    /// Returns the plugin name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the plugin version.
    #[must_use]
    pub const fn version(&self) -> &str {
        self.version.as_str()
    }

    /// Returns the activation mode.
    #[must_use]
    pub const fn mode(&self) -> ActivationMode {
        self.mode
    }

    /// Returns the desired worker instance count.
    #[must_use]
    pub const fn instances(&self) -> u32 {
        self.instances
    }

    /// Returns the worker executable, if any.
    #[must_use]
    pub fn executable(&self) -> Option<&Path> {
        self.executable.as_deref()
    }

    /// Returns the worker arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the plugin-supplied configuration.
    #[must_use]
    pub const fn config(&self) -> &serde_json::Value {
        &self.config
    }
}
