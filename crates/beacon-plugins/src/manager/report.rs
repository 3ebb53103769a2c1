//! Outcome of a `load_and_activate` run.

use crate::error::PluginError;

/// A plugin that failed to activate.
#[derive(Debug)]
pub struct ActivationFailure {
    /// Plugin name.
    pub plugin: String,
    /// Why activation failed.
    pub error: PluginError,
}

/// Per-plugin results of an activation run.
///
/// One failing plugin never prevents the others from activating, so a run
/// may end partially activated.
#[derive(Debug, Default)]
pub struct ActivationReport {
    /// Plugins activated, in discovery order.
    pub activated: Vec<String>,
    /// Plugins that failed, in discovery order.
    pub failures: Vec<ActivationFailure>,
}

impl ActivationReport {
    /// Returns `true` when every plugin activated.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the failure recorded for `plugin`, if any.
    #[must_use]
    pub fn failure(&self, plugin: &str) -> Option<&PluginError> {
        self.failures
            .iter()
            .find(|failure| failure.plugin == plugin)
            .map(|failure| &failure.error)
    }

    pub(crate) fn record(&mut self, plugin: &str, outcome: Result<(), PluginError>) {
        match outcome {
            Ok(()) => self.activated.push(plugin.to_owned()),
            Err(error) => self.failures.push(ActivationFailure {
                plugin: plugin.to_owned(),
                error,
            }),
        }
    }
}
