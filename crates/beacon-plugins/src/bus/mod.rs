//! Demultiplexing of process-manager bus events.
//!
//! The [`WorkerBus`] is a lookup table from [`BusEventKind`] to handlers.
//! A single consumer drains the subscription and dispatches each event to
//! the handlers registered for its kind, in registration order, awaiting each
//! one before moving on. Events are therefore applied strictly in arrival
//! order. Handlers must not wait for later bus events.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::supervisor::{BusEvent, BusEventKind, BusSubscription};

/// Tracing target for bus dispatch.
const BUS_TARGET: &str = "beacon_plugins::bus";

/// Reacts to one kind of bus event.
#[async_trait]
pub trait BusHandler: Send + Sync {
    /// Handles `event`.
    async fn handle(&self, event: &BusEvent);
}

/// Dispatch table for bus events.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use beacon_plugins::bus::{BusHandler, WorkerBus};
/// use beacon_plugins::supervisor::{BusEvent, BusEventKind};
///
/// struct LogExit;
///
/// #[async_trait]
/// impl BusHandler for LogExit {
///     async fn handle(&self, event: &BusEvent) {
///         println!("exit of {}", event.process().id());
///     }
/// }
///
/// let mut bus = WorkerBus::new();
/// bus.on(BusEventKind::Exit, Arc::new(LogExit));
/// assert_eq!(bus.handler_count(BusEventKind::Exit), 1);
/// ```
#[derive(Default)]
pub struct WorkerBus {
    handlers: HashMap<BusEventKind, Vec<Arc<dyn BusHandler>>>,
}

impl WorkerBus {
    /// Creates an empty dispatch table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` for events of `kind`.
    pub fn on(&mut self, kind: BusEventKind, handler: Arc<dyn BusHandler>) -> &mut Self {
        self.handlers.entry(kind).or_default().push(handler);
        self
    }

    /// Returns how many handlers are registered for `kind`.
    #[must_use]
    pub fn handler_count(&self, kind: BusEventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Runs the handlers registered for the event's kind.
    pub async fn dispatch(&self, event: &BusEvent) {
        let kind = event.kind();
        let Some(handlers) = self.handlers.get(&kind) else {
            trace!(target: BUS_TARGET, kind = kind.as_str(), "no handler for bus event");
            return;
        };
        for handler in handlers {
            handler.handle(event).await;
        }
    }

    /// Dispatches events from `subscription` until it closes.
    ///
    /// Returns the number of events dispatched.
    pub async fn pump(&self, subscription: &mut BusSubscription) -> usize {
        let mut dispatched = 0;
        while let Some(event) = subscription.recv().await {
            self.dispatch(&event).await;
            dispatched += 1;
        }
        dispatched
    }
}

impl std::fmt::Debug for WorkerBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.handlers.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("WorkerBus").field("kinds", &kinds).finish()
    }
}
