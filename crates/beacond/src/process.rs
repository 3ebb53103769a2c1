//! Daemon process lifecycle: runtime construction, bootstrap and shutdown.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use beacon_plugins::ProcessSupervisor;
use beacon_plugins::supervisor::LocalSupervisor;

use crate::bootstrap::{BootstrapError, ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::catalog::BuiltinPlugins;
use crate::health::{HealthReporter, StructuredHealthReporter};

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Errors surfaced while running the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The async runtime could not be built.
    #[error("failed to build async runtime: {source}")]
    Runtime {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Bootstrap failed.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// Waiting for the shutdown signal failed.
    #[error("failed to wait for shutdown signal: {source}")]
    Signal {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Source of the request to stop the daemon.
#[async_trait]
pub trait ShutdownSignal: Send + Sync {
    /// Resolves once shutdown has been requested.
    ///
    /// # Errors
    ///
    /// Returns the IO error raised while listening for the request.
    async fn wait(&self) -> io::Result<()>;
}

/// Waits for Ctrl-C (`SIGINT`).
#[derive(Debug, Default, Clone, Copy)]
pub struct CtrlCSignal;

#[async_trait]
impl ShutdownSignal for CtrlCSignal {
    async fn wait(&self) -> io::Result<()> {
        tokio::signal::ctrl_c().await
    }
}

/// Runs the daemon until Ctrl-C with the system configuration and the local
/// process supervisor.
///
/// # Errors
///
/// Returns a [`LaunchError`] when the runtime cannot be built, bootstrap
/// fails, or the shutdown signal cannot be awaited.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with_builtins(BuiltinPlugins::new())
}

/// Like [`run_daemon`], with plugins compiled into the binary.
///
/// # Errors
///
/// See [`run_daemon`].
pub fn run_daemon_with_builtins(builtins: BuiltinPlugins) -> Result<(), LaunchError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|source| LaunchError::Runtime { source })?;
    runtime.block_on(run_daemon_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        Arc::new(LocalSupervisor::new()),
        &builtins,
        &CtrlCSignal,
    ))
}

/// Runs the daemon with injected collaborators.
///
/// Bootstraps, waits for `shutdown`, then deletes every worker. The daemon
/// is shut down even when waiting for the signal fails.
///
/// # Errors
///
/// Returns [`LaunchError::Bootstrap`] or [`LaunchError::Signal`].
pub async fn run_daemon_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    supervisor: Arc<dyn ProcessSupervisor>,
    builtins: &BuiltinPlugins,
    shutdown: &dyn ShutdownSignal,
) -> Result<(), LaunchError> {
    info!(target: PROCESS_TARGET, "starting daemon runtime");
    let daemon = bootstrap_with(loader, reporter, supervisor, builtins).await?;
    info!(
        target: PROCESS_TARGET,
        activated = daemon.activation().activated.len(),
        failed = daemon.activation().failures.len(),
        "daemon ready"
    );
    let signal = shutdown.wait().await;
    daemon.shutdown().await;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    signal.map_err(|source| LaunchError::Signal { source })
}
