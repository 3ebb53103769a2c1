//! Named event hooks and the trigger mechanism.
//!
//! Internal components and plugins attach [`Hook`]s to event names. A trigger
//! runs every hook for the event in registration order and returns the first
//! `Some` result. Hook failures (returned errors or panics) are logged and do
//! not stop the remaining hooks. Worker processes never run inside a trigger:
//! the event is queued as a [`ForwardedEvent`] and the manager relays it to
//! interested workers asynchronously.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::BoxError;

/// Tracing target for hook execution.
const HOOK_TARGET: &str = "beacon_plugins::hooks";

/// Hook callback. Returning `Ok(Some(value))` answers the trigger.
pub type HookFn =
    Arc<dyn Fn(&serde_json::Value) -> Result<Option<serde_json::Value>, BoxError> + Send + Sync>;

/// A handler attached to a named event.
///
/// # Example
///
/// ```
/// use beacon_plugins::Hook;
///
/// let hook = Hook::new("cleanDb:done", |_payload| Ok(None));
/// assert_eq!(hook.event(), "cleanDb:done");
/// ```
#[derive(Clone)]
pub struct Hook {
    event: String,
    handler: HookFn,
}

impl Hook {
    /// Creates a hook for `event`.
    pub fn new<F>(event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&serde_json::Value) -> Result<Option<serde_json::Value>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            event: event.into(),
            handler: Arc::new(handler),
        }
    }

    /// Returns the event name.
    #[must_use]
    pub const fn event(&self) -> &str {
        self.event.as_str()
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct HookEntry {
    owner: String,
    handler: HookFn,
}

/// Event name → ordered list of hooks.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<HashMap<String, Vec<HookEntry>>>,
}

impl HookRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `hook` to its event's list, attributed to `owner`.
    pub fn register(&self, owner: &str, hook: Hook) {
        debug!(
            target: HOOK_TARGET,
            owner,
            event = hook.event(),
            "hook registered"
        );
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(hook.event)
            .or_default()
            .push(HookEntry {
                owner: owner.to_owned(),
                handler: hook.handler,
            });
    }

    /// Removes every hook attributed to `owner`, returning how many went.
    pub fn unregister_all(&self, owner: &str) -> usize {
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        for entries in hooks.values_mut() {
            let before = entries.len();
            entries.retain(|entry| entry.owner != owner);
            removed += before - entries.len();
        }
        hooks.retain(|_, entries| !entries.is_empty());
        removed
    }

    /// Returns the number of hooks attached to `event`.
    #[must_use]
    pub fn count(&self, event: &str) -> usize {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Runs the hooks of `event` in registration order.
    ///
    /// Every hook runs; the first `Some` result is returned. The hook list is
    /// snapshotted first so hooks may themselves register or trigger.
    #[must_use]
    pub fn run(&self, event: &str, payload: &serde_json::Value) -> Option<serde_json::Value> {
        let entries = self
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .cloned()
            .unwrap_or_default();

        let mut answer = None;
        for entry in entries {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (entry.handler)(payload)));
            match outcome {
                Ok(Ok(Some(value))) => {
                    if answer.is_none() {
                        answer = Some(value);
                    }
                }
                Ok(Ok(None)) => {}
                Ok(Err(err)) => warn!(
                    target: HOOK_TARGET,
                    event,
                    owner = entry.owner.as_str(),
                    error = %err,
                    "hook failed"
                ),
                Err(_) => error!(
                    target: HOOK_TARGET,
                    event,
                    owner = entry.owner.as_str(),
                    "hook panicked"
                ),
            }
        }
        answer
    }
}

/// A triggered event queued for delivery to interested workers.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardedEvent {
    /// Event name.
    pub event: String,
    /// Event payload.
    pub payload: serde_json::Value,
}

/// Cloneable handle running triggers.
///
/// Shared by the manager and every plugin context. Events are queued for
/// workers only while forwarding is enabled; until then triggers run hooks
/// and nothing else.
#[derive(Clone)]
pub struct EventDispatcher {
    hooks: Arc<HookRegistry>,
    forward: mpsc::UnboundedSender<ForwardedEvent>,
    forwarding: Arc<AtomicBool>,
}

impl EventDispatcher {
    /// Creates a dispatcher and the queue of events to forward to workers.
    #[must_use]
    pub fn new(hooks: Arc<HookRegistry>) -> (Self, mpsc::UnboundedReceiver<ForwardedEvent>) {
        let (forward, queue) = mpsc::unbounded_channel();
        let dispatcher = Self {
            hooks,
            forward,
            forwarding: Arc::new(AtomicBool::new(false)),
        };
        (dispatcher, queue)
    }

    /// Enables or disables queueing events for workers.
    pub fn set_forwarding(&self, enabled: bool) {
        self.forwarding.store(enabled, Ordering::SeqCst);
    }

    /// Returns `true` while events are queued for workers.
    #[must_use]
    pub fn is_forwarding(&self) -> bool {
        self.forwarding.load(Ordering::SeqCst)
    }

    /// Returns the hook registry behind this dispatcher.
    #[must_use]
    pub const fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    /// Runs the hooks of `event` and, while forwarding is enabled, queues it
    /// for interested workers.
    ///
    /// Never waits for workers.
    #[must_use]
    pub fn trigger(&self, event: &str, payload: &serde_json::Value) -> Option<serde_json::Value> {
        let answer = self.hooks.run(event, payload);
        if !self.is_forwarding() {
            return answer;
        }
        let queued = self.forward.send(ForwardedEvent {
            event: event.to_owned(),
            payload: payload.clone(),
        });
        if queued.is_err() {
            debug!(
                target: HOOK_TARGET,
                event,
                "worker forwarding stopped, event not relayed"
            );
        }
        answer
    }
}
