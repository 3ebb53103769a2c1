//! Plugin activation and worker orchestration for Beacon.
//!
//! The `beacon-plugins` crate loads plugins in discovery order and gives each
//! one a [`PluginContext`] through which it registers named authentication
//! strategies and triggers events. Plugins run either **in process**, where
//! their initialisation runs under a timeout and failures are isolated, or as
//! **workers**: external processes spawned through a [`ProcessSupervisor`]
//! and kept in step with it through a single bus listener.
//!
//! # Architecture
//!
//! [`PluginsManager`] owns the registries. The [`CapabilityRegistry`] maps
//! strategy names to their owning plugin, the [`hooks::HookRegistry`] holds
//! in-process event hooks and the [`worker::WorkerRegistry`] tracks worker
//! instances by their supervisor-assigned identifier. Lifecycle events from
//! the supervisor flow through a [`bus::WorkerBus`] and crashed workers are
//! respawned according to a [`restart::RestartPolicy`].
//!
//! Workers speak a small JSON protocol described in [`protocol`]: the manager
//! sends `event`, `data` and `task` envelopes and workers report
//! `initialized`, `ready` and `task_result` messages back over the bus.

pub mod bus;
pub mod capability;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod hooks;
pub mod manager;
pub mod plugin;
pub mod protocol;
pub mod restart;
pub mod supervisor;
mod tasks;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod worker;

#[cfg(test)]
mod tests;

pub use self::capability::{CapabilityEntry, CapabilityRegistry, StrategyHandler, VerifyFn};
pub use self::context::PluginContext;
pub use self::descriptor::{ActivationMode, PluginDescriptor};
pub use self::error::{BoxError, PluginError};
pub use self::hooks::Hook;
pub use self::manager::{
    ActivationFailure, ActivationReport, DEFAULT_WORKER_PREFIX, ManagerSettings, PluginsManager,
};
pub use self::plugin::{InstalledPlugin, Plugin};
pub use self::restart::RestartSettings;
pub use self::supervisor::{InstanceId, ProcessSupervisor};
pub use self::worker::{WorkerInstance, WorkerState};
