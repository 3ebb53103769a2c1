//! Correlation of submitted worker tasks with their results.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;

use crate::error::PluginError;
use crate::protocol::TaskOutcome;
use crate::supervisor::InstanceId;

/// Result delivered to a waiting submitter.
pub(crate) type TaskResult = Result<serde_json::Value, PluginError>;

struct PendingTask {
    instance: InstanceId,
    plugin: String,
    sender: oneshot::Sender<TaskResult>,
}

/// Tasks sent to workers and not yet answered.
#[derive(Default)]
pub(crate) struct PendingTasks {
    next_id: AtomicU64,
    tasks: Mutex<HashMap<u64, PendingTask>>,
}

impl PendingTasks {
    /// Allocates a task id bound to `instance` and returns its receiver.
    pub(crate) fn register(
        &self,
        instance: InstanceId,
        plugin: &str,
    ) -> (u64, oneshot::Receiver<TaskResult>) {
        let task_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (sender, receiver) = oneshot::channel();
        self.lock().insert(
            task_id,
            PendingTask {
                instance,
                plugin: plugin.to_owned(),
                sender,
            },
        );
        (task_id, receiver)
    }

    /// Completes a task with the worker's outcome.
    ///
    /// Returns `false` when no such task is pending.
    pub(crate) fn resolve(&self, task_id: u64, outcome: TaskOutcome) -> bool {
        let Some(task) = self.lock().remove(&task_id) else {
            return false;
        };
        let result = match outcome {
            TaskOutcome::Ok(value) => Ok(value),
            TaskOutcome::Error(message) => Err(PluginError::TaskFailed {
                name: task.plugin,
                message,
            }),
        };
        // The submitter may have timed out already.
        let _delivered = task.sender.send(result);
        true
    }

    /// Forgets a task without answering it.
    pub(crate) fn cancel(&self, task_id: u64) {
        self.lock().remove(&task_id);
    }

    /// Fails every task pending on `instance` with `WorkerExited`.
    pub(crate) fn fail_instance(&self, instance: InstanceId) -> usize {
        let failed: Vec<PendingTask> = {
            let mut tasks = self.lock();
            let ids: Vec<u64> = tasks
                .iter()
                .filter(|(_, task)| task.instance == instance)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| tasks.remove(id)).collect()
        };
        let count = failed.len();
        for task in failed {
            let _delivered = task.sender.send(Err(PluginError::WorkerExited {
                name: task.plugin,
                instance,
            }));
        }
        count
    }

    /// Returns the number of pending tasks.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, PendingTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
