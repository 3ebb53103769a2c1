//! Process-manager abstraction used to run worker-mode plugins.
//!
//! The orchestration core never owns worker processes directly. It talks to a
//! [`ProcessSupervisor`], a handle to an external process manager that can
//! start named executables, list and delete running instances, deliver
//! payloads to a specific instance, and expose one shared notification bus
//! for all instances. [`LocalSupervisor`] is the production implementation
//! backed by `tokio::process`.

mod local;


use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

pub use self::local::LocalSupervisor;

/// Tracing target for bus subscription diagnostics.
const BUS_TARGET: &str = "beacon_plugins::supervisor::bus";

/// Identifier assigned to a worker instance by the process manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Wraps a raw process-manager identifier.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A running instance as reported by the process manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    id: InstanceId,
    name: String,
}

impl ProcessInfo {
    /// Creates a process description.
    #[must_use]
    pub fn new(id: InstanceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Returns the instance identifier.
    #[must_use]
    pub const fn id(&self) -> InstanceId {
        self.id
    }

    /// Returns the process name the instance was started under.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }
}

/// Start request handed to [`ProcessSupervisor::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    name: String,
    executable: PathBuf,
    args: Vec<String>,
    instances: u32,
}

impl ProcessSpec {
    /// Creates a spec starting `instances` copies of `executable` under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, executable: impl Into<PathBuf>, instances: u32) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            args: Vec::new(),
            instances,
        }
    }

    /// Sets the arguments passed to every instance.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Returns a copy of this spec asking for a different instance count.
    #[must_use]
    pub fn with_instances(&self, instances: u32) -> Self {
        Self {
            instances,
            ..self.clone()
        }
    }

    /// Returns the process name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the executable path.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Returns the executable arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the number of instances to start.
    #[must_use]
    pub const fn instances(&self) -> u32 {
        self.instances
    }
}

/// Notification delivered on the process manager bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// The worker finished booting and declared the events it listens to.
    Initialized {
        /// Originating instance.
        process: ProcessInfo,
        /// Event names the worker wants forwarded.
        events: Vec<String>,
    },
    /// The worker is ready to accept work.
    Ready {
        /// Originating instance.
        process: ProcessInfo,
    },
    /// The worker process exited.
    Exit {
        /// Originating instance.
        process: ProcessInfo,
    },
    /// Free-form data sent by the worker, such as task results.
    Message {
        /// Originating instance.
        process: ProcessInfo,
        /// Raw JSON payload.
        payload: serde_json::Value,
    },
}

impl BusEvent {
    /// Returns the dispatch tag of the event.
    #[must_use]
    pub const fn kind(&self) -> BusEventKind {
        match self {
            Self::Initialized { .. } => BusEventKind::Initialized,
            Self::Ready { .. } => BusEventKind::Ready,
            Self::Exit { .. } => BusEventKind::Exit,
            Self::Message { .. } => BusEventKind::Message,
        }
    }

    /// Returns the instance that emitted the event.
    #[must_use]
    pub const fn process(&self) -> &ProcessInfo {
        match self {
            Self::Initialized { process, .. }
            | Self::Ready { process }
            | Self::Exit { process }
            | Self::Message { process, .. } => process,
        }
    }
}

/// Tag of a [`BusEvent`], used as the dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusEventKind {
    /// See [`BusEvent::Initialized`].
    Initialized,
    /// See [`BusEvent::Ready`].
    Ready,
    /// See [`BusEvent::Exit`].
    Exit,
    /// See [`BusEvent::Message`].
    Message,
}

impl BusEventKind {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Ready => "ready",
            Self::Exit => "process:exit",
            Self::Message => "process:msg",
        }
    }
}

impl std::fmt::Display for BusEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiving half of the process manager bus.
///
/// Dropping the subscription detaches it from the bus.
#[derive(Debug)]
pub struct BusSubscription {
    receiver: broadcast::Receiver<BusEvent>,
}

impl BusSubscription {
    /// Wraps a broadcast receiver.
    #[must_use]
    pub const fn new(receiver: broadcast::Receiver<BusEvent>) -> Self {
        Self { receiver }
    }

    /// Receives the next event.
    ///
    /// Returns `None` once the bus is closed. Events lost because the
    /// subscriber fell behind are skipped; reconciliation repairs any
    /// resulting drift.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        target: BUS_TARGET,
                        skipped,
                        "bus subscriber lagged, events dropped"
                    );
                }
            }
        }
    }
}

/// Errors reported by a process manager.
#[derive(Debug, Clone, Error)]
pub enum SupervisorError {
    /// The process manager cannot be reached.
    #[error("process manager unavailable: {message}")]
    Unavailable {
        /// Human-readable failure description.
        message: String,
    },

    /// The process manager refused the request.
    #[error("process manager rejected '{operation}': {message}")]
    Rejected {
        /// Operation that was rejected.
        operation: &'static str,
        /// Human-readable failure description.
        message: String,
    },

    /// No instance with the given identifier is running.
    #[error("unknown instance {id}")]
    UnknownInstance {
        /// Identifier that was looked up.
        id: InstanceId,
    },

    /// An I/O error occurred while talking to a process.
    #[error("I/O error: {0}")]
    Io(#[source] Arc<std::io::Error>),
}

/// Handle to an external process manager.
///
/// All operations are asynchronous and report success or failure; none of
/// them may wait on bus events, since the bus listener is the only consumer
/// of those.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Lists the instances currently running.
    async fn list(&self) -> Result<Vec<ProcessInfo>, SupervisorError>;

    /// Starts `spec.instances()` copies of the executable under `spec.name()`.
    ///
    /// On failure some instances may already be running; callers learn
    /// which through [`ProcessSupervisor::list`].
    async fn start(&self, spec: ProcessSpec) -> Result<(), SupervisorError>;

    /// Stops and forgets an instance.
    async fn delete(&self, id: InstanceId) -> Result<(), SupervisorError>;

    /// Opens a subscription to the shared notification bus.
    async fn launch_bus(&self) -> Result<BusSubscription, SupervisorError>;

    /// Sends a JSON payload to one instance.
    async fn send_data_to_instance(
        &self,
        id: InstanceId,
        payload: serde_json::Value,
    ) -> Result<(), SupervisorError>;
}
