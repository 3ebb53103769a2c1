//! The interface handed to a plugin during initialisation.
//!
//! A [`PluginContext`] exposes exactly two operations: registering a named
//! strategy and triggering an event. It is bound to one plugin so every
//! registration is attributed to that plugin. After a failed activation the
//! manager revokes the context and late registrations are rejected.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::capability::{CapabilityRegistry, StrategyHandler, VerifyFn};
use crate::error::PluginError;
use crate::hooks::EventDispatcher;

/// Tracing target for context operations.
const CONTEXT_TARGET: &str = "beacon_plugins::context";

/// Capabilities a plugin may use while it initialises.
#[derive(Clone)]
pub struct PluginContext {
    plugin: String,
    capabilities: Arc<CapabilityRegistry>,
    events: EventDispatcher,
    revoked: Arc<AtomicBool>,
}

impl PluginContext {
    /// Binds a context to `plugin`.
    #[must_use]
    pub fn new(
        plugin: impl Into<String>,
        capabilities: Arc<CapabilityRegistry>,
        events: EventDispatcher,
    ) -> Self {
        Self {
            plugin: plugin.into(),
            capabilities,
            events,
            revoked: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the plugin this context belongs to.
    #[must_use]
    pub const fn plugin(&self) -> &str {
        self.plugin.as_str()
    }

    /// Registers a named strategy owned by this plugin.
    ///
    /// An existing entry with the same name is replaced, whoever owned it.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ContextRevoked`] once the plugin's activation
    /// has failed.
    pub fn register_strategy(
        &self,
        handler: StrategyHandler,
        name: &str,
        verify: VerifyFn,
    ) -> Result<(), PluginError> {
        if self.is_revoked() {
            warn!(
                target: CONTEXT_TARGET,
                plugin = self.plugin.as_str(),
                strategy = name,
                "registration rejected on revoked context"
            );
            return Err(PluginError::ContextRevoked {
                name: self.plugin.clone(),
            });
        }
        self.capabilities
            .register(name, self.plugin.as_str(), handler, verify);
        if self.is_revoked() {
            // Revoked while registering: undo unless another plugin took over.
            self.capabilities
                .unregister_owned(name, self.plugin.as_str());
            return Err(PluginError::ContextRevoked {
                name: self.plugin.clone(),
            });
        }
        Ok(())
    }

    /// Triggers a named event and returns the first hook answer, if any.
    #[must_use]
    pub fn trigger_event(
        &self,
        name: &str,
        payload: &serde_json::Value,
    ) -> Option<serde_json::Value> {
        self.events.trigger(name, payload)
    }

    /// Returns `true` once the context has been revoked.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::SeqCst)
    }

    pub(crate) fn revoke(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin", &self.plugin)
            .field("revoked", &self.is_revoked())
            .finish_non_exhaustive()
    }
}
