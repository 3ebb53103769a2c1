//! The plugin entry-point trait and installed plugin bundles.

use std::sync::Arc;

use crate::context::PluginContext;
use crate::descriptor::{ActivationMode, PluginDescriptor};
use crate::error::BoxError;
use crate::hooks::Hook;

/// Entry point of an in-process plugin.
///
/// `init` runs once per activation on a blocking thread and receives the
/// plugin's configuration and its [`PluginContext`]. Returning an error (or
/// panicking) fails the activation of this plugin only.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use beacon_plugins::{BoxError, Plugin, PluginContext, VerifyFn};
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
/// ```
pub trait Plugin: Send + Sync {
    /// Initialises the plugin.
    ///
    /// # Errors
    ///
    /// Any error aborts this plugin's activation.
    fn init(&self, config: &serde_json::Value, context: &PluginContext) -> Result<(), BoxError>;

    /// Event hooks attached once `init` succeeds.
    fn hooks(&self) -> Vec<Hook> {
        Vec::new()
    }
}

/// A descriptor paired with its in-process entry point, if any.
#[derive(Clone)]
pub struct InstalledPlugin {
    descriptor: PluginDescriptor,
    entry: Option<Arc<dyn Plugin>>,
}

impl InstalledPlugin {
    /// Bundles an in-process plugin with its entry point.
    #[must_use]
    pub fn in_process(descriptor: PluginDescriptor, plugin: Arc<dyn Plugin>) -> Self {
        Self {
            descriptor,
            entry: Some(plugin),
        }
    }

    /// Bundles a worker-mode plugin. Worker plugins have no in-process entry.
    #[must_use]
    pub const fn worker(descriptor: PluginDescriptor) -> Self {
        Self {
            descriptor,
            entry: None,
        }
    }

    /// Returns the descriptor.
    #[must_use]
    pub const fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    /// Returns the plugin name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Returns the activation mode.
    #[must_use]
    pub const fn mode(&self) -> ActivationMode {
        self.descriptor.mode()
    }

    pub(crate) fn entry(&self) -> Option<&Arc<dyn Plugin>> {
        self.entry.as_ref()
    }
}

impl std::fmt::Debug for InstalledPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstalledPlugin")
            .field("descriptor", &self.descriptor)
            .field("has_entry", &self.entry.is_some())
            .finish()
    }
}
