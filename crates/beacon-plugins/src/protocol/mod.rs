//! Message types exchanged between the orchestrator and worker processes.
//!
//! Messages are JSON objects tagged by a `type` field. The orchestrator sends
//! [`WorkerMessage`] values through
//! [`ProcessSupervisor::send_data_to_instance`](crate::supervisor::ProcessSupervisor::send_data_to_instance);
//! workers answer with [`WorkerReport`] values, which the process manager
//! relays on the bus. [`LocalSupervisor`](crate::supervisor::LocalSupervisor)
//! carries both directions as JSONL over the worker's stdio.

use serde::{Deserialize, Serialize};

use crate::error::PluginError;

/// Message sent from the orchestrator to a worker.
///
/// # Example
///
/// ```
/// use beacon_plugins::protocol::WorkerMessage;
/// use serde_json::json;
///
/// let message = WorkerMessage::Task { task_id: 7, payload: json!({"index": "users"}) };
/// let value = message.to_value().expect("serialise");
/// assert_eq!(value["type"], "task");
/// assert_eq!(value["task_id"], 7);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// A triggered event the worker declared interest in.
    Event {
        /// Event name.
        event: String,
        /// Event payload.
        payload: serde_json::Value,
    },
    /// Opaque data for the worker.
    Data {
        /// Payload forwarded untouched.
        payload: serde_json::Value,
    },
    /// A unit of work the orchestrator awaits an answer for.
    Task {
        /// Correlation identifier echoed in the [`WorkerReport::TaskResult`].
        task_id: u64,
        /// Task input.
        payload: serde_json::Value,
    },
}

impl WorkerMessage {
    /// Serialises the message into a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Serialize`] if serialisation fails.
    pub fn to_value(&self) -> Result<serde_json::Value, PluginError> {
        serde_json::to_value(self).map_err(PluginError::Serialize)
    }
}

/// Report sent from a worker to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerReport {
    /// The worker booted; `events` lists the triggers it wants forwarded.
    Initialized {
        /// Declared event interests.
        #[serde(default)]
        events: Vec<String>,
    },
    /// The worker accepts work.
    Ready,
    /// Answer to a [`WorkerMessage::Task`].
    TaskResult {
        /// Identifier of the task being answered.
        task_id: u64,
        /// Result of the task.
        outcome: TaskOutcome,
    },
}

impl WorkerReport {
    /// Parses a task result out of a raw bus payload.
    ///
    /// Returns `None` for anything other than a well-formed `task_result`.
    #[must_use]
    pub fn task_result(payload: &serde_json::Value) -> Option<(u64, TaskOutcome)> {
        match serde_json::from_value::<Self>(payload.clone()) {
            Ok(Self::TaskResult { task_id, outcome }) => Some((task_id, outcome)),
            _ => None,
        }
    }
}

/// Result of a task executed by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The task completed with the given value.
    Ok(serde_json::Value),
    /// The task failed with the given message.
    Error(String),
}
