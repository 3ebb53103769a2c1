//! In-memory process manager for tests.
//!
//! [`FakeSupervisor`] keeps a process table, assigns increasing ids, records
//! every call, and publishes bus events only when the test asks it to. It can
//! be told to start fewer instances than requested, to fail opening the bus,
//! to answer task messages automatically, or to never complete a send.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::protocol::{TaskOutcome, WorkerMessage, WorkerReport};
use crate::supervisor::{
    BusEvent, BusSubscription, InstanceId, ProcessInfo, ProcessSpec, ProcessSupervisor,
    SupervisorError,
};

/// How the fake answers `task` messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskReply {
    /// Leave tasks unanswered.
    Silent,
    /// Answer with the task payload.
    Echo,
    /// Answer with an error outcome carrying this message.
    Fail(String),
}

#[derive(Debug)]
struct FakeState {
    processes: Vec<ProcessInfo>,
    start_calls: Vec<ProcessSpec>,
    deleted: Vec<InstanceId>,
    sent: Vec<(InstanceId, serde_json::Value)>,
    start_limit: Option<u32>,
    bus_failures: usize,
    bus_opened: usize,
    task_reply: TaskReply,
    hang_sends: bool,
    bus: broadcast::Sender<BusEvent>,
}

/// A scripted [`ProcessSupervisor`].
///
/// Processes live only in memory. Tests drive the bus by hand through
/// [`FakeSupervisor::emit_ready`], [`FakeSupervisor::crash`] and friends.
#[derive(Debug)]
pub struct FakeSupervisor {
    next_id: AtomicU64,
    state: Mutex<FakeState>,
}

impl Default for FakeSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSupervisor {
    /// Creates an empty fake with an open bus.
    #[must_use]
    pub fn new() -> Self {
        let (bus, _) = broadcast::channel(64);
        Self {
            next_id: AtomicU64::new(1),
            state: Mutex::new(FakeState {
                processes: Vec::new(),
                start_calls: Vec::new(),
                deleted: Vec::new(),
                sent: Vec::new(),
                start_limit: None,
                bus_failures: 0,
                bus_opened: 0,
                task_reply: TaskReply::Silent,
                hang_sends: false,
                bus,
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts at most `limit` instances per call, failing the call if more
    /// were requested.
    pub fn set_start_limit(&self, limit: Option<u32>) {
        self.state().start_limit = limit;
    }

    /// Makes the next `count` bus openings fail.
    pub fn fail_bus_openings(&self, count: usize) {
        self.state().bus_failures = count;
    }

    /// Chooses how task messages are answered.
    pub fn set_task_reply(&self, reply: TaskReply) {
        self.state().task_reply = reply;
    }

    /// Makes every send wait forever.
    pub fn hang_sends(&self) {
        self.state().hang_sends = true;
    }

    /// Returns the running processes.
    #[must_use]
    pub fn processes(&self) -> Vec<ProcessInfo> {
        self.state().processes.clone()
    }

    /// Returns the start requests received so far.
    #[must_use]
    pub fn start_calls(&self) -> Vec<ProcessSpec> {
        self.state().start_calls.clone()
    }

    /// Returns the ids passed to `delete`, including unknown ones.
    #[must_use]
    pub fn deleted(&self) -> Vec<InstanceId> {
        self.state().deleted.clone()
    }

    /// Returns the payloads delivered through `send_data_to_instance`.
    #[must_use]
    pub fn sent(&self) -> Vec<(InstanceId, serde_json::Value)> {
        self.state().sent.clone()
    }

    /// Returns how many bus subscriptions were opened successfully.
    #[must_use]
    pub fn bus_openings(&self) -> usize {
        self.state().bus_opened
    }

    /// Publishes `event` on the bus.
    pub fn emit(&self, event: BusEvent) {
        let _receivers = self.state().bus.send(event);
    }

    /// Publishes an `initialized` event for `id`.
    pub fn emit_initialized(&self, id: InstanceId, events: &[&str]) {
        if let Some(process) = self.find(id) {
            self.emit(BusEvent::Initialized {
                process,
                events: events.iter().map(|e| (*e).to_owned()).collect(),
            });
        }
    }

    /// Publishes a `ready` event for `id`.
    pub fn emit_ready(&self, id: InstanceId) {
        if let Some(process) = self.find(id) {
            self.emit(BusEvent::Ready { process });
        }
    }

    /// Removes `id` from the process table and publishes its exit.
    ///
    /// Returns the published event.
    pub fn crash(&self, id: InstanceId) -> Option<BusEvent> {
        let process = self.vanish(id)?;
        let event = BusEvent::Exit { process };
        self.emit(event.clone());
        Some(event)
    }

    /// Removes `id` from the process table without publishing anything.
    pub fn vanish(&self, id: InstanceId) -> Option<ProcessInfo> {
        let mut state = self.state();
        let index = state.processes.iter().position(|p| p.id() == id)?;
        Some(state.processes.remove(index))
    }

    /// Closes every open bus subscription.
    pub fn close_bus(&self) {
        let (bus, _) = broadcast::channel(64);
        self.state().bus = bus;
    }

    fn find(&self, id: InstanceId) -> Option<ProcessInfo> {
        self.state().processes.iter().find(|p| p.id() == id).cloned()
    }

    fn answer_task(&self, id: InstanceId, payload: &serde_json::Value) {
        let Ok(WorkerMessage::Task {
            task_id,
            payload: input,
        }) = serde_json::from_value::<WorkerMessage>(payload.clone())
        else {
            return;
        };
        let outcome = match self.state().task_reply.clone() {
            TaskReply::Silent => return,
            TaskReply::Echo => TaskOutcome::Ok(input),
            TaskReply::Fail(message) => TaskOutcome::Error(message),
        };
        let Some(process) = self.find(id) else {
            return;
        };
        let Ok(report) = serde_json::to_value(WorkerReport::TaskResult { task_id, outcome }) else {
            return;
        };
        self.emit(BusEvent::Message {
            process,
            payload: report,
        });
    }
}

#[async_trait]
impl ProcessSupervisor for FakeSupervisor {
    async fn list(&self) -> Result<Vec<ProcessInfo>, SupervisorError> {
        Ok(self.processes())
    }

    async fn start(&self, spec: ProcessSpec) -> Result<(), SupervisorError> {
        let mut state = self.state();
        state.start_calls.push(spec.clone());
        let allowed = state
            .start_limit
            .map_or(spec.instances(), |limit| limit.min(spec.instances()));
        for _ in 0..allowed {
            let id = InstanceId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
            state.processes.push(ProcessInfo::new(id, spec.name()));
        }
        if allowed < spec.instances() {
            return Err(SupervisorError::Rejected {
                operation: "start",
                message: format!("only {allowed} of {} instances started", spec.instances()),
            });
        }
        Ok(())
    }

    async fn delete(&self, id: InstanceId) -> Result<(), SupervisorError> {
        let mut state = self.state();
        state.deleted.push(id);
        let Some(index) = state.processes.iter().position(|p| p.id() == id) else {
            return Err(SupervisorError::UnknownInstance { id });
        };
        state.processes.remove(index);
        Ok(())
    }

    async fn launch_bus(&self) -> Result<BusSubscription, SupervisorError> {
        let mut state = self.state();
        if state.bus_failures > 0 {
            state.bus_failures -= 1;
            return Err(SupervisorError::Unavailable {
                message: String::from("bus refused"),
            });
        }
        state.bus_opened += 1;
        Ok(BusSubscription::new(state.bus.subscribe()))
    }

    async fn send_data_to_instance(
        &self,
        id: InstanceId,
        payload: serde_json::Value,
    ) -> Result<(), SupervisorError> {
        let hang = {
            let mut state = self.state();
            if !state.processes.iter().any(|p| p.id() == id) {
                return Err(SupervisorError::UnknownInstance { id });
            }
            state.sent.push((id, payload.clone()));
            state.hang_sends
        };
        if hang {
            std::future::pending::<()>().await;
        }
        self.answer_task(id, &payload);
        Ok(())
    }
}
