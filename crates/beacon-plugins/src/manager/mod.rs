//! Top-level coordinator of plugin activation and worker lifecycle.
//!
//! [`PluginsManager`] owns one instance of every registry: capabilities,
//! hooks, workers and pending tasks. It activates plugins in discovery
//! order, isolating each plugin's failure, and keeps worker instances in step
//! with the process manager through a single bus listener.
//!
//! Background work is limited to three tasks started by
//! [`PluginsManager::start`]: the bus listener (which reopens the bus with
//! backoff when it closes), the forwarder relaying triggered events to
//! interested workers, and a periodic reconcile.

mod lifecycle;
mod report;
mod settings;

#[cfg(test)]
mod tests;

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::WorkerBus;
use crate::capability::{CapabilityEntry, CapabilityRegistry};
use crate::context::PluginContext;
use crate::descriptor::{ActivationMode, PluginDescriptor};
use crate::error::PluginError;
use crate::hooks::{EventDispatcher, ForwardedEvent, Hook, HookRegistry};
use crate::plugin::{InstalledPlugin, Plugin};
use crate::protocol::WorkerMessage;
use crate::restart::{DefaultRestartPolicy, RestartDecision, RestartPolicy};
use crate::supervisor::{BusEvent, BusSubscription, InstanceId, ProcessSupervisor};
use crate::tasks::PendingTasks;
use crate::worker::{WorkerInstance, WorkerRegistry};

pub use self::report::{ActivationFailure, ActivationReport};
pub use self::settings::{DEFAULT_WORKER_PREFIX, ManagerSettings};

/// Tracing target for manager operations.
const MANAGER_TARGET: &str = "beacon_plugins::manager";

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("panic with non-string payload"))
}

/// State shared by the manager handle, the bus handlers and background tasks.
struct Shared {
    settings: ManagerSettings,
    supervisor: Arc<dyn ProcessSupervisor>,
    capabilities: Arc<CapabilityRegistry>,
    events: EventDispatcher,
    forward_queue: Mutex<Option<mpsc::UnboundedReceiver<ForwardedEvent>>>,
    workers: WorkerRegistry,
    tasks: PendingTasks,
    restart: Arc<dyn RestartPolicy>,
    plugins: RwLock<HashMap<String, PluginDescriptor>>,
    bus: WorkerBus,
    started: AtomicBool,
    stopping: AtomicBool,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Shared {
    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut background = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        background.retain(|task| !task.is_finished());
        background.push(handle);
    }

    fn abort_background(&self) {
        let handles = std::mem::take(
            &mut *self
                .background
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            handle.abort();
        }
    }

    /// Settles the consequences of an instance leaving the table.
    async fn instance_gone(self: &Arc<Self>, instance: &WorkerInstance) {
        let failed = self.tasks.fail_instance(instance.id());
        info!(
            target: MANAGER_TARGET,
            plugin = instance.plugin(),
            instance = %instance.id(),
            failed_tasks = failed,
            "worker instance exited"
        );
        self.apply_restart(instance.plugin()).await;
    }

    async fn apply_restart(self: &Arc<Self>, plugin: &str) {
        if self.is_stopping() || !self.workers.has_target(plugin).await {
            return;
        }
        match self.restart.on_exit(plugin) {
            RestartDecision::Suppress => warn!(
                target: MANAGER_TARGET,
                plugin,
                "restart limit reached, instance not replaced"
            ),
            RestartDecision::Respawn { delay } if delay.is_zero() => {
                self.respawn(plugin).await;
            }
            RestartDecision::Respawn { delay } => {
                debug!(
                    target: MANAGER_TARGET,
                    plugin,
                    delay_ms = millis(delay),
                    "respawn scheduled"
                );
                let shared = Arc::clone(self);
                let plugin = plugin.to_owned();
                self.track(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if !shared.is_stopping() {
                        shared.respawn(&plugin).await;
                    }
                }));
            }
        }
    }

    async fn respawn(&self, plugin: &str) {
        match self.workers.respawn(plugin).await {
            Ok(ids) => info!(
                target: MANAGER_TARGET,
                plugin,
                replacements = ids.len(),
                "worker respawned"
            ),
            Err(error) => warn!(
                target: MANAGER_TARGET,
                plugin,
                %error,
                "worker respawn failed"
            ),
        }
    }

    async fn reconcile(self: &Arc<Self>) -> Result<usize, PluginError> {
        let dropped = self.workers.reconcile().await?;
        for instance in &dropped {
            self.instance_gone(instance).await;
        }
        Ok(dropped.len())
    }

    async fn reopen_bus(&self) -> Option<BusSubscription> {
        let mut delay = self.settings.bus_reconnect_backoff;
        for attempt in 1..=self.settings.bus_reconnect_attempts {
            tokio::time::sleep(delay).await;
            match self.supervisor.launch_bus().await {
                Ok(subscription) => {
                    info!(target: MANAGER_TARGET, attempt, "bus reopened");
                    return Some(subscription);
                }
                Err(error) => warn!(
                    target: MANAGER_TARGET,
                    attempt,
                    %error,
                    "bus reopen failed"
                ),
            }
            delay = delay.saturating_mul(2);
        }
        None
    }

    async fn listen(self: Arc<Self>, mut subscription: BusSubscription) {
        loop {
            let dispatched = self.bus.pump(&mut subscription).await;
            if self.is_stopping() {
                return;
            }
            warn!(
                target: MANAGER_TARGET,
                dispatched,
                "bus closed, reopening"
            );
            let Some(reopened) = self.reopen_bus().await else {
                error!(
                    target: MANAGER_TARGET,
                    attempts = self.settings.bus_reconnect_attempts,
                    "bus could not be reopened, worker lifecycle events are lost"
                );
                return;
            };
            subscription = reopened;
            if let Err(error) = self.reconcile().await {
                warn!(target: MANAGER_TARGET, %error, "reconcile after reopen failed");
            }
        }
    }

    async fn forward(self: Arc<Self>, mut queue: mpsc::UnboundedReceiver<ForwardedEvent>) {
        while let Some(ForwardedEvent { event, payload }) = queue.recv().await {
            let targets = self.workers.interested(&event).await;
            if targets.is_empty() {
                continue;
            }
            let message = match (WorkerMessage::Event {
                event: event.clone(),
                payload,
            })
            .to_value()
            {
                Ok(message) => message,
                Err(error) => {
                    warn!(target: MANAGER_TARGET, event = event.as_str(), %error, "event not forwarded");
                    continue;
                }
            };
            for id in targets {
                let sent = tokio::time::timeout(
                    self.settings.worker_call_timeout,
                    self.supervisor.send_data_to_instance(id, message.clone()),
                )
                .await;
                match sent {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => warn!(
                        target: MANAGER_TARGET,
                        event = event.as_str(),
                        instance = %id,
                        %error,
                        "event forwarding failed"
                    ),
                    Err(_) => warn!(
                        target: MANAGER_TARGET,
                        event = event.as_str(),
                        instance = %id,
                        "event forwarding timed out"
                    ),
                }
            }
        }
    }

    async fn reconcile_periodically(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.settings.reconcile_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(error) = self.reconcile().await {
                warn!(target: MANAGER_TARGET, %error, "periodic reconcile failed");
            }
        }
    }
}

/// Coordinator of plugin activation, capability queries and workers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use beacon_plugins::{
///     BoxError, InstalledPlugin, ManagerSettings, Plugin, PluginContext, PluginDescriptor,
///     PluginsManager, VerifyFn,
/// };
/// use beacon_plugins::supervisor::LocalSupervisor;
///
/// struct LocalAuth;
///
/// impl Plugin for LocalAuth {
///     fn init(&self, _config: &serde_json::Value, context: &PluginContext) -> Result<(), BoxError> {
///         let verify: VerifyFn = Arc::new(|_: &serde_json::Value| Ok(None));
///         context.register_strategy(Arc::new(()), "local", verify)?;
///         Ok(())
///     }
/// }
///
/// # let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime");
/// # runtime.block_on(async {
/// let manager = PluginsManager::new(Arc::new(LocalSupervisor::new()), ManagerSettings::default());
/// let report = manager
///     .load_and_activate(vec![InstalledPlugin::in_process(
///         PluginDescriptor::in_process("auth-local", "1.0.0"),
///         Arc::new(LocalAuth),
///     )])
///     .await;
///
/// assert!(report.is_complete());
/// assert_eq!(manager.list_strategies(), vec!["local".to_owned()]);
/// # });
/// ```
pub struct PluginsManager {
    shared: Arc<Shared>,
}

impl PluginsManager {
    /// Creates a manager using the default restart policy.
    #[must_use]
    pub fn new(supervisor: Arc<dyn ProcessSupervisor>, settings: ManagerSettings) -> Self {
        let policy = Arc::new(DefaultRestartPolicy::new(settings.restart));
        Self::with_restart_policy(supervisor, settings, policy)
    }

    /// Creates a manager with a custom restart policy.
    #[must_use]
    pub fn with_restart_policy(
        supervisor: Arc<dyn ProcessSupervisor>,
        settings: ManagerSettings,
        restart: Arc<dyn RestartPolicy>,
    ) -> Self {
        let (events, queue) = EventDispatcher::new(Arc::new(HookRegistry::new()));
        let shared = Arc::new_cyclic(|weak| Shared {
            settings,
            workers: WorkerRegistry::new(Arc::clone(&supervisor)),
            supervisor,
            capabilities: Arc::new(CapabilityRegistry::new()),
            events,
            forward_queue: Mutex::new(Some(queue)),
            tasks: PendingTasks::default(),
            restart,
            plugins: RwLock::new(HashMap::new()),
            bus: lifecycle::worker_bus(weak),
            started: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            background: Mutex::new(Vec::new()),
        });
        Self { shared }
    }

    /// Opens the bus and starts the background tasks.
    ///
    /// Calling `start` again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Supervisor`] if the bus cannot be opened.
    pub async fn start(&self) -> Result<(), PluginError> {
        let shared = &self.shared;
        if shared.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let subscription = match shared.supervisor.launch_bus().await {
            Ok(subscription) => subscription,
            Err(source) => {
                shared.started.store(false, Ordering::SeqCst);
                return Err(PluginError::Supervisor {
                    operation: "launch_bus",
                    source,
                });
            }
        };
        if let Err(error) = shared.reconcile().await {
            warn!(target: MANAGER_TARGET, %error, "initial reconcile failed");
        }

        shared.track(tokio::spawn(Arc::clone(shared).listen(subscription)));
        let queue = shared
            .forward_queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(queue) = queue {
            shared.track(tokio::spawn(Arc::clone(shared).forward(queue)));
            shared.events.set_forwarding(true);
        }
        if !shared.settings.reconcile_interval.is_zero() {
            shared.track(tokio::spawn(Arc::clone(shared).reconcile_periodically()));
        }
        info!(target: MANAGER_TARGET, "plugins manager started");
        Ok(())
    }

    /// Activates `plugins` in order and reports per-plugin outcomes.
    ///
    /// In-process plugins initialise one at a time; worker plugins are
    /// spawned through the process manager. A failure is recorded and the
    /// next plugin is activated regardless.
    pub async fn load_and_activate(&self, plugins: Vec<InstalledPlugin>) -> ActivationReport {
        let mut report = ActivationReport::default();
        for plugin in plugins {
            let outcome = self.activate(&plugin).await;
            if let Err(error) = &outcome {
                error!(
                    target: MANAGER_TARGET,
                    plugin = plugin.name(),
                    %error,
                    "plugin activation failed"
                );
            } else {
                info!(
                    target: MANAGER_TARGET,
                    plugin = plugin.name(),
                    mode = %plugin.mode(),
                    "plugin activated"
                );
            }
            report.record(plugin.name(), outcome);
        }
        report
    }

    async fn activate(&self, plugin: &InstalledPlugin) -> Result<(), PluginError> {
        let descriptor = plugin.descriptor();
        descriptor.validate()?;
        let name = descriptor.name();
        if self.is_loaded(name) {
            return Err(PluginError::Descriptor {
                message: format!("plugin '{name}' is already loaded"),
            });
        }

        match descriptor.mode() {
            ActivationMode::InProcess => {
                let Some(entry) = plugin.entry() else {
                    return Err(PluginError::Activation {
                        name: name.to_owned(),
                        message: String::from("no in-process entry point"),
                    });
                };
                self.init_in_process(descriptor, entry).await?;
                self.remember(descriptor);
                Ok(())
            }
            ActivationMode::Worker => {
                let Some(spec) = descriptor.process_spec(&self.shared.settings.worker_prefix)
                else {
                    return Err(PluginError::Descriptor {
                        message: format!("worker plugin '{name}' has no executable"),
                    });
                };
                // Partially spawned plugins stay loaded so they can be unloaded.
                self.remember(descriptor);
                self.shared.workers.spawn(name, spec).await.map(|_| ())
            }
        }
    }

    async fn init_in_process(
        &self,
        descriptor: &PluginDescriptor,
        entry: &Arc<dyn Plugin>,
    ) -> Result<(), PluginError> {
        let shared = &self.shared;
        let name = descriptor.name();
        let context = PluginContext::new(
            name,
            Arc::clone(&shared.capabilities),
            shared.events.clone(),
        );
        let task_context = context.clone();
        let config = descriptor.config().clone();
        let plugin = Arc::clone(entry);
        let init = tokio::task::spawn_blocking(move || {
            plugin
                .init(&config, &task_context)
                .map(|()| plugin.hooks())
        });

        let timeout = shared.settings.init_timeout;
        let outcome = match tokio::time::timeout(timeout, init).await {
            Ok(Ok(Ok(hooks))) => Ok(hooks),
            Ok(Ok(Err(error))) => Err(PluginError::activation(name, &error)),
            Ok(Err(join_error)) => Err(PluginError::Activation {
                name: name.to_owned(),
                message: if join_error.is_panic() {
                    format!("init panicked: {}", panic_message(&*join_error.into_panic()))
                } else {
                    String::from("init was cancelled")
                },
            }),
            Err(_elapsed) => Err(PluginError::InitTimeout {
                name: name.to_owned(),
                timeout_ms: millis(timeout),
            }),
        };

        match outcome {
            Ok(hooks) => {
                for hook in hooks {
                    self.shared.events.hooks().register(name, hook);
                }
                Ok(())
            }
            Err(error) => {
                context.revoke();
                let strategies = shared.capabilities.unregister_all(name);
                let hooks = shared.events.hooks().unregister_all(name);
                debug!(
                    target: MANAGER_TARGET,
                    plugin = name,
                    strategies,
                    hooks,
                    "failed activation rolled back"
                );
                Err(error)
            }
        }
    }

    fn remember(&self, descriptor: &PluginDescriptor) {
        self.shared
            .plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(descriptor.name().to_owned(), descriptor.clone());
    }

    fn is_loaded(&self, name: &str) -> bool {
        self.shared
            .plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Returns the names of loaded plugins, sorted.
    #[must_use]
    pub fn loaded_plugins(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .shared
            .plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort_unstable();
        names
    }

    /// Returns the distinct strategy names currently registered.
    #[must_use]
    pub fn list_strategies(&self) -> Vec<String> {
        self.shared.capabilities.list()
    }

    /// Looks up a strategy by name.
    #[must_use]
    pub fn strategy(&self, name: &str) -> Option<CapabilityEntry> {
        self.shared.capabilities.get(name)
    }

    /// Runs the verify callback of strategy `name` against `credentials`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownStrategy`] if nothing is registered
    /// under `name`, or [`PluginError::Verify`] if the callback fails or
    /// panics.
    pub fn verify_credentials(
        &self,
        name: &str,
        credentials: &serde_json::Value,
    ) -> Result<Option<serde_json::Value>, PluginError> {
        let entry = self
            .strategy(name)
            .ok_or_else(|| PluginError::UnknownStrategy {
                name: name.to_owned(),
            })?;
        let verify = entry.verify();
        match panic::catch_unwind(AssertUnwindSafe(|| verify(credentials))) {
            Ok(Ok(identity)) => Ok(identity),
            Ok(Err(error)) => Err(PluginError::Verify {
                name: name.to_owned(),
                message: error.to_string(),
            }),
            Err(payload) => Err(PluginError::Verify {
                name: name.to_owned(),
                message: format!("verify panicked: {}", panic_message(&*payload)),
            }),
        }
    }

    /// Attaches an internal hook to `event`.
    pub fn register_hook(&self, owner: &str, hook: Hook) {
        self.shared.events.hooks().register(owner, hook);
    }

    /// Runs the hooks of `event` and relays it to interested workers.
    ///
    /// Returns the first hook answer. Never waits for workers.
    #[must_use]
    pub fn trigger(&self, event: &str, payload: &serde_json::Value) -> Option<serde_json::Value> {
        self.shared.events.trigger(event, payload)
    }

    /// Triggers `event` for its side effects, discarding any hook answer.
    pub fn notify(&self, event: &str, payload: &serde_json::Value) {
        if self.shared.events.trigger(event, payload).is_some() {
            debug!(target: MANAGER_TARGET, event, "hook answer to notification discarded");
        }
    }

    /// Sends `payload` to the first ready worker of `plugin`.
    ///
    /// Returns the instance that received it.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NoAvailableWorker`] without contacting the
    /// process manager when no instance is ready,
    /// [`PluginError::WorkerTimeout`] when delivery exceeds `timeout`, and
    /// [`PluginError::Supervisor`] when delivery fails.
    pub async fn send_to_worker(
        &self,
        plugin: &str,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> Result<InstanceId, PluginError> {
        let id = self.ready_instance(plugin).await?;
        let message = WorkerMessage::Data { payload }.to_value()?;
        self.deliver(plugin, id, message, timeout).await?;
        Ok(id)
    }

    /// Hands a task to a ready worker of `plugin` and awaits its result.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NoAvailableWorker`] when no instance is ready,
    /// [`PluginError::WorkerTimeout`] when no answer arrives within
    /// `timeout`, [`PluginError::TaskFailed`] when the worker reports an
    /// error, and [`PluginError::WorkerExited`] when the worker exits first.
    pub async fn submit_task(
        &self,
        plugin: &str,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, PluginError> {
        let id = self.ready_instance(plugin).await?;
        let (task_id, answer) = self.shared.tasks.register(id, plugin);
        let message = match (WorkerMessage::Task { task_id, payload }).to_value() {
            Ok(message) => message,
            Err(error) => {
                self.shared.tasks.cancel(task_id);
                return Err(error);
            }
        };

        let exchange = async {
            self.shared
                .supervisor
                .send_data_to_instance(id, message)
                .await
                .map_err(|source| PluginError::Supervisor {
                    operation: "send_data_to_instance",
                    source,
                })?;
            answer.await.unwrap_or_else(|_| {
                Err(PluginError::WorkerExited {
                    name: plugin.to_owned(),
                    instance: id,
                })
            })
        };
        let result = match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_elapsed) => Err(PluginError::WorkerTimeout {
                name: plugin.to_owned(),
                timeout_ms: millis(timeout),
            }),
        };
        if result.is_err() {
            self.shared.tasks.cancel(task_id);
        }
        result
    }

    async fn ready_instance(&self, plugin: &str) -> Result<InstanceId, PluginError> {
        self.shared
            .workers
            .first_ready(plugin)
            .await
            .ok_or_else(|| PluginError::NoAvailableWorker {
                name: plugin.to_owned(),
            })
    }

    async fn deliver(
        &self,
        plugin: &str,
        id: InstanceId,
        message: serde_json::Value,
        timeout: Duration,
    ) -> Result<(), PluginError> {
        match tokio::time::timeout(
            timeout,
            self.shared.supervisor.send_data_to_instance(id, message),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(PluginError::Supervisor {
                operation: "send_data_to_instance",
                source,
            }),
            Err(_elapsed) => Err(PluginError::WorkerTimeout {
                name: plugin.to_owned(),
                timeout_ms: millis(timeout),
            }),
        }
    }

    /// Drops workers the process manager no longer reports.
    ///
    /// Dropped instances go through the restart policy. Returns how many
    /// were dropped.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Supervisor`] if listing fails.
    pub async fn reconcile_workers(&self) -> Result<usize, PluginError> {
        self.shared.reconcile().await
    }

    /// Applies one bus event as the listener would.
    pub async fn dispatch_bus_event(&self, event: &BusEvent) {
        self.shared.bus.dispatch(event).await;
    }

    /// Unloads `name`: its strategies, hooks and workers are removed.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] if the plugin is not loaded.
    pub async fn unload_plugin(&self, name: &str) -> Result<(), PluginError> {
        let shared = &self.shared;
        let removed = shared
            .plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        if removed.is_none() {
            return Err(PluginError::NotFound {
                name: name.to_owned(),
            });
        }
        let strategies = shared.capabilities.unregister_all(name);
        let hooks = shared.events.hooks().unregister_all(name);
        let workers = shared.workers.remove_plugin(name).await;
        shared.restart.reset(name);
        info!(
            target: MANAGER_TARGET,
            plugin = name,
            strategies,
            hooks,
            workers,
            "plugin unloaded"
        );
        Ok(())
    }

    /// Stops respawning, halts background tasks and deletes every worker.
    pub async fn shutdown(&self) {
        let shared = &self.shared;
        shared.stopping.store(true, Ordering::SeqCst);
        shared.events.set_forwarding(false);
        shared.abort_background();
        let deleted = shared.workers.clear().await;
        info!(
            target: MANAGER_TARGET,
            workers = deleted,
            "plugins manager stopped"
        );
    }

    /// Returns the instances currently tracked for `plugin`.
    pub async fn instances_for(&self, plugin: &str) -> Vec<WorkerInstance> {
        self.shared.workers.instances_for(plugin).await
    }

    /// Returns the worker registry.
    #[must_use]
    pub fn workers(&self) -> &WorkerRegistry {
        &self.shared.workers
    }

    /// Returns the capability registry.
    #[must_use]
    pub fn capabilities(&self) -> &Arc<CapabilityRegistry> {
        &self.shared.capabilities
    }

    /// Returns the settings the manager was built with.
    #[must_use]
    pub fn settings(&self) -> &ManagerSettings {
        &self.shared.settings
    }
}

impl Drop for PluginsManager {
    fn drop(&mut self) {
        self.shared.abort_background();
    }
}

impl std::fmt::Debug for PluginsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginsManager")
            .field("plugins", &self.loaded_plugins())
            .field("capabilities", &self.shared.capabilities)
            .finish_non_exhaustive()
    }
}
