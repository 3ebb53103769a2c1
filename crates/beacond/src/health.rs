//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use beacon_config::Config;
use beacon_plugins::ActivationReport;

use crate::bootstrap::BootstrapError;

pub(crate) const HEALTH_TARGET: &str = "beacond::health";

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after the configuration is loaded and the manager started.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the plugin catalogue has been activated.
    fn plugins_activated(&self, report: &ActivationReport);

    /// Invoked when the daemon begins shutting down.
    fn shutdown_starting(&self);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn plugins_activated(&self, report: &ActivationReport) {
        (**self).plugins_activated(report);
    }

    fn shutdown_starting(&self) {
        (**self).shutdown_starting();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            catalog = ?config.plugin_catalog(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn plugins_activated(&self, report: &ActivationReport) {
        for failure in &report.failures {
            tracing::error!(
                target: HEALTH_TARGET,
                event = "plugin_failed",
                plugin = failure.plugin.as_str(),
                error = %failure.error,
                "plugin failed to activate"
            );
        }
        tracing::info!(
            target: HEALTH_TARGET,
            event = "plugins_activated",
            activated = report.activated.len(),
            failed = report.failures.len(),
            "plugin activation finished"
        );
    }

    fn shutdown_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_starting",
            "daemon shutting down"
        );
    }
}
