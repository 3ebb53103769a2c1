//! Daemon bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use beacon_config::{Config, ConfigError};
use beacon_plugins::{ActivationReport, PluginError, PluginsManager, ProcessSupervisor};

use crate::catalog::{BuiltinPlugins, CatalogError, PluginCatalog};
use crate::health::HealthReporter;
use crate::settings::manager_settings;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when no configuration can be produced.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a configuration resolved earlier.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already-loaded configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// The loaded configuration is inconsistent.
    #[error("invalid configuration: {source}")]
    InvalidConfiguration {
        /// Validation failure.
        #[source]
        source: ConfigError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The plugin manager could not attach to the process manager.
    #[error("failed to start plugin manager: {source}")]
    Manager {
        /// Underlying manager error.
        #[source]
        source: PluginError,
    },
    /// The plugin catalogue could not be loaded.
    #[error("failed to load plugin catalogue: {source}")]
    Catalog {
        /// Underlying catalogue error.
        #[source]
        source: CatalogError,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    manager: Arc<PluginsManager>,
    activation: ActivationReport,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The running plugin manager.
    #[must_use]
    pub const fn manager(&self) -> &Arc<PluginsManager> {
        &self.manager
    }

    /// Outcome of the startup activation.
    #[must_use]
    pub const fn activation(&self) -> &ActivationReport {
        &self.activation
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Stops worker supervision and deletes every worker instance.
    pub async fn shutdown(self) {
        self.reporter.shutdown_starting();
        self.manager.shutdown().await;
    }
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("config", &self.config)
            .field("activation", &self.activation)
            .finish_non_exhaustive()
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// Loads and validates configuration, installs telemetry, starts the plugin
/// manager over `supervisor`, then activates the configured catalogue.
/// Individual plugin failures do not fail the bootstrap; they are recorded in
/// [`Daemon::activation`].
///
/// # Errors
///
/// Returns a [`BootstrapError`] for the first stage that fails. The reporter
/// is told about the failure before it is returned.
pub async fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    supervisor: Arc<dyn ProcessSupervisor>,
    builtins: &BuiltinPlugins,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();
    let Prepared {
        config,
        catalog,
        manager,
        telemetry,
    } = match prepare(loader, supervisor).await {
        Ok(prepared) => prepared,
        Err(error) => {
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };
    reporter.bootstrap_succeeded(&config);

    let order: Vec<String> = catalog
        .descriptors()
        .iter()
        .map(|descriptor| descriptor.name().to_owned())
        .collect();
    let resolved = catalog.resolve(builtins);
    let mut activation = manager.load_and_activate(resolved.plugins).await;
    activation.failures.extend(resolved.unresolved);
    sort_failures(&mut activation, &order);
    reporter.plugins_activated(&activation);

    Ok(Daemon {
        config,
        manager,
        activation,
        telemetry,
        reporter,
    })
}

/// Orders failures by catalogue position, unresolved entries included.
fn sort_failures(activation: &mut ActivationReport, order: &[String]) {
    activation.failures.sort_by_key(|failure| {
        order
            .iter()
            .position(|name| *name == failure.plugin)
            .unwrap_or(usize::MAX)
    });
}

struct Prepared {
    config: Config,
    catalog: PluginCatalog,
    manager: Arc<PluginsManager>,
    telemetry: TelemetryHandle,
}

async fn prepare(
    loader: &dyn ConfigLoader,
    supervisor: Arc<dyn ProcessSupervisor>,
) -> Result<Prepared, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    config
        .validate()
        .map_err(|source| BootstrapError::InvalidConfiguration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    let catalog = match config.plugin_catalog() {
        Some(path) => {
            PluginCatalog::load(path).map_err(|source| BootstrapError::Catalog { source })?
        }
        None => PluginCatalog::default(),
    };
    let manager = Arc::new(PluginsManager::new(supervisor, manager_settings(&config)));
    manager
        .start()
        .await
        .map_err(|source| BootstrapError::Manager { source })?;
    Ok(Prepared {
        config,
        catalog,
        manager,
        telemetry,
    })
}
