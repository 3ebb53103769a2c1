//! The Beacon daemon.
//!
//! `beacond` loads its configuration through [`beacon_config`], installs
//! structured telemetry, starts a [`beacon_plugins::PluginsManager`] over the
//! local process supervisor and activates the plugins listed in the
//! configured catalogue. It then runs until Ctrl-C, at which point every
//! worker process is deleted.
//!
//! Each bootstrap stage is reported through a [`HealthReporter`] so operators
//! can tell which stage failed. A plugin that fails to activate does not stop
//! the daemon; it is reported and the remaining plugins run.

mod bootstrap;
mod catalog;
mod health;
pub mod maintenance;
mod process;
mod settings;
pub mod telemetry;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use catalog::{BuiltinPlugins, CatalogError, PluginCatalog, ResolvedCatalog};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    CtrlCSignal, LaunchError, ShutdownSignal, run_daemon, run_daemon_with,
    run_daemon_with_builtins,
};
pub use settings::manager_settings;
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
