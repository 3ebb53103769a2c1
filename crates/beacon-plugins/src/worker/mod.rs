//! Table of live worker instances.
//!
//! The [`WorkerRegistry`] owns the mapping from instance id to plugin and the
//! start request used for each worker plugin. It mirrors what the process
//! manager reports rather than what was asked for: after a start the
//! registry adds the ids `list` reports for the plugin's process name that
//! were not listed before the start, so a partial spawn leaves exactly the
//! started instances registered.
//!
//! Every mutation, including the supervisor calls it makes, runs under one
//! async mutex. A reconcile therefore never interleaves with a spawn, and bus
//! events for freshly started instances are applied only after the spawn has
//! registered them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::PluginError;
use crate::supervisor::{InstanceId, ProcessInfo, ProcessSpec, ProcessSupervisor, SupervisorError};

/// Tracing target for worker registry operations.
const WORKER_TARGET: &str = "beacon_plugins::worker";

/// Lifecycle state of a worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Started, not yet accepting work.
    Starting,
    /// Accepting work.
    Ready,
    /// The process ended.
    Exited,
}

impl WorkerState {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Exited => "exited",
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A worker instance tracked by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInstance {
    id: InstanceId,
    plugin: String,
    state: WorkerState,
    events: Vec<String>,
}

impl WorkerInstance {
    fn starting(id: InstanceId, plugin: &str) -> Self {
        Self {
            id,
            plugin: plugin.to_owned(),
            state: WorkerState::Starting,
            events: Vec::new(),
        }
    }

    /// Returns the process-manager identifier.
    #[must_use]
    pub const fn id(&self) -> InstanceId {
        self.id
    }

    /// Returns the owning plugin.
    #[must_use]
    pub const fn plugin(&self) -> &str {
        self.plugin.as_str()
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> WorkerState {
        self.state
    }

    /// Returns the events the worker asked to receive.
    #[must_use]
    pub fn events(&self) -> &[String] {
        &self.events
    }
}

#[derive(Debug, Default)]
struct WorkerTable {
    instances: Vec<WorkerInstance>,
    targets: HashMap<String, ProcessSpec>,
}

impl WorkerTable {
    fn position(&self, id: InstanceId) -> Option<usize> {
        self.instances.iter().position(|instance| instance.id == id)
    }

    fn get_mut(&mut self, id: InstanceId) -> Option<&mut WorkerInstance> {
        self.instances.iter_mut().find(|instance| instance.id == id)
    }

    fn take(&mut self, id: InstanceId) -> Option<WorkerInstance> {
        let index = self.position(id)?;
        let mut instance = self.instances.remove(index);
        instance.state = WorkerState::Exited;
        Some(instance)
    }
}

/// In-memory table of worker instances, backed by a process manager.
pub struct WorkerRegistry {
    supervisor: Arc<dyn ProcessSupervisor>,
    table: Mutex<WorkerTable>,
}

impl WorkerRegistry {
    /// Creates an empty registry driving `supervisor`.
    #[must_use]
    pub fn new(supervisor: Arc<dyn ProcessSupervisor>) -> Self {
        Self {
            supervisor,
            table: Mutex::new(WorkerTable::default()),
        }
    }

    /// Starts the instances described by `spec` for `plugin`.
    ///
    /// The spec is remembered as the plugin's respawn target. Returns the ids
    /// added to the registry.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Spawn`] if the start call fails; instances the
    /// supervisor reports as running are registered regardless. Returns
    /// [`PluginError::Supervisor`] if listing fails after a successful start.
    pub async fn spawn(
        &self,
        plugin: &str,
        spec: ProcessSpec,
    ) -> Result<Vec<InstanceId>, PluginError> {
        let mut table = self.table.lock().await;
        table.targets.insert(plugin.to_owned(), spec.clone());
        self.start_locked(&mut table, plugin, spec).await
    }

    /// Starts one replacement instance for `plugin` using its stored spec.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] if the plugin has no spawn target,
    /// otherwise the errors of [`WorkerRegistry::spawn`].
    pub async fn respawn(&self, plugin: &str) -> Result<Vec<InstanceId>, PluginError> {
        let mut table = self.table.lock().await;
        let Some(target) = table.targets.get(plugin) else {
            return Err(PluginError::NotFound {
                name: plugin.to_owned(),
            });
        };
        let spec = target.with_instances(1);
        self.start_locked(&mut table, plugin, spec).await
    }

    async fn start_locked(
        &self,
        table: &mut WorkerTable,
        plugin: &str,
        spec: ProcessSpec,
    ) -> Result<Vec<InstanceId>, PluginError> {
        let requested = spec.instances();
        let process_name = spec.name().to_owned();
        let mut known: HashSet<InstanceId> = table.instances.iter().map(|i| i.id).collect();
        match self.supervisor.list().await {
            Ok(processes) => known.extend(
                processes
                    .iter()
                    .filter(|process| process.name() == process_name)
                    .map(ProcessInfo::id),
            ),
            Err(error) => debug!(
                target: WORKER_TARGET,
                plugin,
                %error,
                "listing instances before start failed"
            ),
        }
        let started = self.supervisor.start(spec).await;

        let added = match self.supervisor.list().await {
            Ok(processes) => {
                let added: Vec<InstanceId> = processes
                    .iter()
                    .filter(|process| process.name() == process_name)
                    .map(ProcessInfo::id)
                    .filter(|id| !known.contains(id))
                    .collect();
                table.instances.extend(
                    added
                        .iter()
                        .map(|id| WorkerInstance::starting(*id, plugin)),
                );
                added
            }
            Err(source) => {
                warn!(
                    target: WORKER_TARGET,
                    plugin,
                    error = %source,
                    "listing instances after start failed"
                );
                if started.is_ok() {
                    return Err(PluginError::Supervisor {
                        operation: "list",
                        source,
                    });
                }
                Vec::new()
            }
        };

        match started {
            Ok(()) => {
                info!(
                    target: WORKER_TARGET,
                    plugin,
                    requested,
                    started = added.len(),
                    "worker instances started"
                );
                Ok(added)
            }
            Err(source) => {
                warn!(
                    target: WORKER_TARGET,
                    plugin,
                    requested,
                    started = added.len(),
                    error = %source,
                    "worker start failed"
                );
                Err(PluginError::Spawn {
                    name: plugin.to_owned(),
                    requested,
                    started: added.len(),
                    source,
                })
            }
        }
    }

    /// Drops entries whose ids the supervisor no longer reports.
    ///
    /// Returns the dropped instances, marked [`WorkerState::Exited`].
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Supervisor`] if listing fails; the table is
    /// left untouched in that case.
    pub async fn reconcile(&self) -> Result<Vec<WorkerInstance>, PluginError> {
        let mut table = self.table.lock().await;
        let live: HashSet<InstanceId> = self
            .supervisor
            .list()
            .await
            .map_err(|source| PluginError::Supervisor {
                operation: "list",
                source,
            })?
            .iter()
            .map(ProcessInfo::id)
            .collect();

        let (kept, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut table.instances)
            .into_iter()
            .partition(|instance| live.contains(&instance.id));
        table.instances = kept;

        let dropped: Vec<WorkerInstance> = dropped
            .into_iter()
            .map(|mut instance| {
                instance.state = WorkerState::Exited;
                instance
            })
            .collect();
        if !dropped.is_empty() {
            info!(
                target: WORKER_TARGET,
                dropped = dropped.len(),
                "reconcile dropped vanished instances"
            );
        }
        Ok(dropped)
    }

    /// Deletes a tracked instance through the supervisor.
    ///
    /// Returns `Ok(false)` without contacting the supervisor when `id` is not
    /// tracked. An instance the supervisor no longer knows counts as removed.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Supervisor`] if the delete call fails; the
    /// instance stays tracked.
    pub async fn remove(&self, id: InstanceId) -> Result<bool, PluginError> {
        let mut table = self.table.lock().await;
        let Some(index) = table.position(id) else {
            debug!(target: WORKER_TARGET, instance = %id, "remove of untracked instance ignored");
            return Ok(false);
        };
        match self.supervisor.delete(id).await {
            Ok(()) | Err(SupervisorError::UnknownInstance { .. }) => {
                let instance = table.instances.remove(index);
                debug!(
                    target: WORKER_TARGET,
                    instance = %id,
                    plugin = instance.plugin.as_str(),
                    "worker instance removed"
                );
                Ok(true)
            }
            Err(source) => Err(PluginError::Supervisor {
                operation: "delete",
                source,
            }),
        }
    }

    /// Removes every instance of `plugin` and forgets its spawn target.
    ///
    /// Returns how many instances were deleted. Delete failures are logged
    /// and the instance is dropped from the table anyway.
    pub async fn remove_plugin(&self, plugin: &str) -> usize {
        let mut table = self.table.lock().await;
        table.targets.remove(plugin);
        let (owned, others): (Vec<_>, Vec<_>) = std::mem::take(&mut table.instances)
            .into_iter()
            .partition(|instance| instance.plugin == plugin);
        table.instances = others;
        self.delete_all(owned).await
    }

    /// Deletes every tracked instance and forgets all spawn targets.
    pub async fn clear(&self) -> usize {
        let mut table = self.table.lock().await;
        table.targets.clear();
        let instances = std::mem::take(&mut table.instances);
        self.delete_all(instances).await
    }

    async fn delete_all(&self, instances: Vec<WorkerInstance>) -> usize {
        let mut deleted = 0;
        for instance in instances {
            match self.supervisor.delete(instance.id).await {
                Ok(()) | Err(SupervisorError::UnknownInstance { .. }) => deleted += 1,
                Err(error) => warn!(
                    target: WORKER_TARGET,
                    instance = %instance.id,
                    plugin = instance.plugin.as_str(),
                    %error,
                    "failed to delete worker instance"
                ),
            }
        }
        deleted
    }

    /// Records the events a worker declared interest in.
    ///
    /// Returns `false` if the instance is not tracked.
    pub async fn mark_initialized(&self, id: InstanceId, events: Vec<String>) -> bool {
        let mut table = self.table.lock().await;
        let Some(instance) = table.get_mut(id) else {
            return false;
        };
        instance.events = events;
        true
    }

    /// Moves an instance to [`WorkerState::Ready`].
    ///
    /// Returns `false` if the instance is not tracked.
    pub async fn mark_ready(&self, id: InstanceId) -> bool {
        let mut table = self.table.lock().await;
        let Some(instance) = table.get_mut(id) else {
            return false;
        };
        instance.state = WorkerState::Ready;
        true
    }

    /// Removes an instance reported as exited, returning it if it was tracked.
    ///
    /// The exited process is also deleted from the supervisor so that a later
    /// `list` no longer reports it. An instance the supervisor already forgot
    /// counts as deleted; other delete failures are logged.
    pub async fn handle_exit(&self, id: InstanceId) -> Option<WorkerInstance> {
        let mut table = self.table.lock().await;
        let instance = table.take(id)?;
        match self.supervisor.delete(id).await {
            Ok(()) | Err(SupervisorError::UnknownInstance { .. }) => {}
            Err(error) => warn!(
                target: WORKER_TARGET,
                instance = %id,
                plugin = instance.plugin.as_str(),
                %error,
                "failed to delete exited worker instance"
            ),
        }
        Some(instance)
    }

    /// Returns the first ready instance of `plugin`, in registry order.
    pub async fn first_ready(&self, plugin: &str) -> Option<InstanceId> {
        self.table
            .lock()
            .await
            .instances
            .iter()
            .find(|instance| instance.plugin == plugin && instance.state == WorkerState::Ready)
            .map(|instance| instance.id)
    }

    /// Returns the instances of `plugin`, in registry order.
    pub async fn instances_for(&self, plugin: &str) -> Vec<WorkerInstance> {
        self.table
            .lock()
            .await
            .instances
            .iter()
            .filter(|instance| instance.plugin == plugin)
            .cloned()
            .collect()
    }

    /// Returns every tracked instance, in registry order.
    pub async fn snapshot(&self) -> Vec<WorkerInstance> {
        self.table.lock().await.instances.clone()
    }

    /// Returns the instances that declared interest in `event`.
    pub async fn interested(&self, event: &str) -> Vec<InstanceId> {
        self.table
            .lock()
            .await
            .instances
            .iter()
            .filter(|instance| instance.events.iter().any(|e| e == event))
            .map(|instance| instance.id)
            .collect()
    }

    /// Returns `true` if `plugin` has a spawn target.
    pub async fn has_target(&self, plugin: &str) -> bool {
        self.table.lock().await.targets.contains_key(plugin)
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry").finish_non_exhaustive()
    }
}
