//! Registry of capabilities contributed by plugins.
//!
//! Plugins contribute named capabilities (authentication strategies) while
//! they initialise. The [`CapabilityRegistry`] stores them in a single flat
//! namespace keyed by name: registering a name that already exists replaces
//! the previous entry, including its owner, so listing is deduplicated by
//! construction. Entries are immutable once stored and are only removed when
//! their owning plugin is unloaded.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::error::BoxError;

/// Tracing target for capability registry operations.
const CAPABILITY_TARGET: &str = "beacon_plugins::capability";

/// Opaque strategy implementation supplied by a plugin.
///
/// Consumers recover the concrete type with [`Arc::downcast`] or
/// [`CapabilityEntry::handler_as`].
pub type StrategyHandler = Arc<dyn Any + Send + Sync>;

/// Credential verification callback supplied alongside a strategy.
///
/// Returns `Ok(Some(identity))` when the credentials are accepted,
/// `Ok(None)` when they are rejected, and `Err` when verification itself
/// failed.
pub type VerifyFn =
    Arc<dyn Fn(&serde_json::Value) -> Result<Option<serde_json::Value>, BoxError> + Send + Sync>;

/// A capability registered by a plugin.
#[derive(Clone)]
pub struct CapabilityEntry {
    name: String,
    owner: String,
    handler: StrategyHandler,
    verify: VerifyFn,
}

impl CapabilityEntry {
    /// Returns the capability name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the name of the plugin that registered the capability.
    #[must_use]
    pub const fn owner(&self) -> &str {
        self.owner.as_str()
    }

    /// Returns the opaque strategy implementation.
    #[must_use]
    pub const fn handler(&self) -> &StrategyHandler {
        &self.handler
    }

    /// Returns the strategy implementation if it is a `T`.
    #[must_use]
    pub fn handler_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.handler.downcast_ref::<T>()
    }

    /// Returns the verification callback.
    #[must_use]
    pub const fn verify(&self) -> &VerifyFn {
        &self.verify
    }
}

impl std::fmt::Debug for CapabilityEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityEntry")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// Keyed store of plugin-contributed capabilities.
///
/// The registry is internally synchronised: a single writer at a time, with
/// readers always observing a consistent snapshot.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use beacon_plugins::{CapabilityRegistry, VerifyFn};
///
/// let registry = CapabilityRegistry::new();
/// let verify: VerifyFn = Arc::new(|_: &serde_json::Value| Ok(None));
/// registry.register("local", "auth-a", Arc::new(()), verify.clone());
/// registry.register("local", "auth-b", Arc::new(()), verify);
///
/// assert_eq!(registry.list(), vec!["local".to_owned()]);
/// assert_eq!(registry.owner_of("local").as_deref(), Some("auth-b"));
/// ```
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: RwLock<HashMap<String, CapabilityEntry>>,
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the capability stored under `name`.
    ///
    /// Overwriting is last-writer-wins, even across plugins. Returns the
    /// owner of the replaced entry, if any.
    pub fn register(
        &self,
        name: impl Into<String>,
        owner: impl Into<String>,
        handler: StrategyHandler,
        verify: VerifyFn,
    ) -> Option<String> {
        let entry = CapabilityEntry {
            name: name.into(),
            owner: owner.into(),
            handler,
            verify,
        };
        let previous = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.name.clone(), entry.clone())
            .map(|replaced| replaced.owner);

        match &previous {
            Some(replaced) if replaced != &entry.owner => info!(
                target: CAPABILITY_TARGET,
                strategy = entry.name(),
                previous_owner = replaced.as_str(),
                owner = entry.owner(),
                "strategy ownership overwritten"
            ),
            _ => debug!(
                target: CAPABILITY_TARGET,
                strategy = entry.name(),
                owner = entry.owner(),
                "strategy registered"
            ),
        }
        previous
    }

    /// Returns the distinct capability names, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort_unstable();
        names
    }

    /// Looks up a capability by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<CapabilityEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Returns the plugin currently owning `name`.
    #[must_use]
    pub fn owner_of(&self, name: &str) -> Option<String> {
        self.get(name).map(|entry| entry.owner)
    }

    /// Removes every entry registered by `owner`, returning how many went.
    pub fn unregister_all(&self, owner: &str) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.owner != owner);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(
                target: CAPABILITY_TARGET,
                owner,
                removed,
                "strategies unregistered"
            );
        }
        removed
    }

    /// Removes `name` only if it is still owned by `owner`.
    pub fn unregister_owned(&self, name: &str, owner: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.get(name).is_some_and(|entry| entry.owner == owner) {
            entries.remove(name);
            return true;
        }
        false
    }

    /// Returns the number of registered capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("strategies", &self.list())
            .finish()
    }
}
