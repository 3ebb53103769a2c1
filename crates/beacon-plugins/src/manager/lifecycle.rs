//! Bus handlers that keep the worker table in step with the process manager.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::debug;

use super::{MANAGER_TARGET, Shared};
use crate::bus::{BusHandler, WorkerBus};
use crate::protocol::WorkerReport;
use crate::supervisor::{BusEvent, BusEventKind};

/// Builds the dispatch table used by the bus listener.
pub(super) fn worker_bus(shared: &Weak<Shared>) -> WorkerBus {
    let mut bus = WorkerBus::new();
    bus.on(
        BusEventKind::Initialized,
        Arc::new(Initialized(Weak::clone(shared))),
    )
    .on(BusEventKind::Ready, Arc::new(Ready(Weak::clone(shared))))
    .on(BusEventKind::Exit, Arc::new(Exit(Weak::clone(shared))))
    .on(BusEventKind::Message, Arc::new(Message(Weak::clone(shared))));
    bus
}

struct Initialized(Weak<Shared>);

#[async_trait]
impl BusHandler for Initialized {
    async fn handle(&self, event: &BusEvent) {
        let (Some(shared), BusEvent::Initialized { process, events }) = (self.0.upgrade(), event)
        else {
            return;
        };
        if !shared
            .workers
            .mark_initialized(process.id(), events.clone())
            .await
        {
            debug!(
                target: MANAGER_TARGET,
                instance = %process.id(),
                "initialized event for untracked instance"
            );
        }
    }
}

struct Ready(Weak<Shared>);

#[async_trait]
impl BusHandler for Ready {
    async fn handle(&self, event: &BusEvent) {
        let Some(shared) = self.0.upgrade() else {
            return;
        };
        let id = event.process().id();
        if shared.workers.mark_ready(id).await {
            debug!(target: MANAGER_TARGET, instance = %id, "worker ready");
        } else {
            debug!(target: MANAGER_TARGET, instance = %id, "ready event for untracked instance");
        }
    }
}

struct Exit(Weak<Shared>);

#[async_trait]
impl BusHandler for Exit {
    async fn handle(&self, event: &BusEvent) {
        let Some(shared) = self.0.upgrade() else {
            return;
        };
        let id = event.process().id();
        match shared.workers.handle_exit(id).await {
            Some(instance) => shared.instance_gone(&instance).await,
            None => debug!(
                target: MANAGER_TARGET,
                instance = %id,
                "exit of untracked instance ignored"
            ),
        }
    }
}

struct Message(Weak<Shared>);

#[async_trait]
impl BusHandler for Message {
    async fn handle(&self, event: &BusEvent) {
        let (Some(shared), BusEvent::Message { process, payload }) = (self.0.upgrade(), event)
        else {
            return;
        };
        match WorkerReport::task_result(payload) {
            Some((task_id, outcome)) => {
                if !shared.tasks.resolve(task_id, outcome) {
                    debug!(
                        target: MANAGER_TARGET,
                        instance = %process.id(),
                        task_id,
                        "result for unknown or expired task"
                    );
                }
            }
            None => debug!(
                target: MANAGER_TARGET,
                instance = %process.id(),
                "unsolicited worker message"
            ),
        }
    }
}
