//! Process manager backed by `tokio::process`.
//!
//! Every instance is a child process with piped stdio. Lines the worker
//! writes to stdout are parsed as [`WorkerReport`] JSON and published on the
//! bus; anything else that is valid JSON is published as a
//! [`BusEvent::Message`]. Payloads sent to an instance are written to its
//! stdin as single JSONL lines. Stderr is drained into debug logs.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

use super::{
    BusEvent, BusSubscription, InstanceId, ProcessInfo, ProcessSpec, ProcessSupervisor,
    SupervisorError,
};
use crate::protocol::WorkerReport;

/// Tracing target for local process management.
const LOCAL_TARGET: &str = "beacon_plugins::supervisor::local";

/// Capacity of the broadcast bus.
const BUS_CAPACITY: usize = 256;

struct LocalProcess {
    info: ProcessInfo,
    stdin: Arc<tokio::sync::Mutex<ChildStdin>>,
    kill: Option<oneshot::Sender<()>>,
}

type ProcessTable = Arc<Mutex<HashMap<InstanceId, LocalProcess>>>;

/// Runs worker instances as local child processes.
///
/// # Example
///
/// ```rust,no_run
/// use beacon_plugins::supervisor::{LocalSupervisor, ProcessSpec, ProcessSupervisor};
///
/// # async fn demo() -> Result<(), beacon_plugins::supervisor::SupervisorError> {
/// let supervisor = LocalSupervisor::new();
/// let mut bus = supervisor.launch_bus().await?;
/// supervisor
///     .start(ProcessSpec::new("beacon-plugin-indexer", "/usr/bin/indexer", 2))
///     .await?;
/// while let Some(event) = bus.recv().await {
///     println!("{event:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct LocalSupervisor {
    processes: ProcessTable,
    next_id: AtomicU64,
    bus: broadcast::Sender<BusEvent>,
}

impl LocalSupervisor {
    /// Creates a supervisor with no running instances.
    #[must_use]
    pub fn new() -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            processes: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            bus,
        }
    }

    fn spawn_instance(&self, spec: &ProcessSpec) -> Result<(), SupervisorError> {
        let mut command = Command::new(spec.executable());
        command
            .args(spec.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|err| SupervisorError::Io(Arc::new(err)))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            drop(child.start_kill());
            return Err(SupervisorError::Rejected {
                operation: "start",
                message: String::from("failed to capture worker stdio"),
            });
        };
        let stderr = child.stderr.take();

        let id = InstanceId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let info = ProcessInfo::new(id, spec.name());
        let (kill_tx, kill_rx) = oneshot::channel();

        debug!(
            target: LOCAL_TARGET,
            instance = %id,
            name = spec.name(),
            executable = %spec.executable().display(),
            "worker process spawned"
        );

        self.processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                LocalProcess {
                    info: info.clone(),
                    stdin: Arc::new(tokio::sync::Mutex::new(stdin)),
                    kill: Some(kill_tx),
                },
            );

        if let Some(stderr) = stderr {
            tokio::spawn(drain_stderr(info.clone(), stderr));
        }
        tokio::spawn(monitor(
            info,
            child,
            stdout,
            kill_rx,
            Arc::clone(&self.processes),
            self.bus.clone(),
        ));
        Ok(())
    }
}

impl Default for LocalSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessSupervisor for LocalSupervisor {
    async fn list(&self) -> Result<Vec<ProcessInfo>, SupervisorError> {
        let table = self.processes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut processes: Vec<ProcessInfo> =
            table.values().map(|process| process.info.clone()).collect();
        processes.sort_by_key(ProcessInfo::id);
        Ok(processes)
    }

    async fn start(&self, spec: ProcessSpec) -> Result<(), SupervisorError> {
        for _ in 0..spec.instances() {
            self.spawn_instance(&spec)?;
        }
        Ok(())
    }

    async fn delete(&self, id: InstanceId) -> Result<(), SupervisorError> {
        let removed = self
            .processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        let Some(mut process) = removed else {
            return Err(SupervisorError::UnknownInstance { id });
        };
        if let Some(kill) = process.kill.take() {
            // The monitor may already have observed the exit.
            drop(kill.send(()));
        }
        Ok(())
    }

    async fn launch_bus(&self) -> Result<BusSubscription, SupervisorError> {
        Ok(BusSubscription::new(self.bus.subscribe()))
    }

    async fn send_data_to_instance(
        &self,
        id: InstanceId,
        payload: serde_json::Value,
    ) -> Result<(), SupervisorError> {
        let stdin = self
            .processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|process| Arc::clone(&process.stdin))
            .ok_or(SupervisorError::UnknownInstance { id })?;

        let mut line = serde_json::to_vec(&payload).map_err(|err| SupervisorError::Rejected {
            operation: "send",
            message: err.to_string(),
        })?;
        line.push(b'\n');

        let mut stdin = stdin.lock().await;
        stdin
            .write_all(&line)
            .await
            .map_err(|err| SupervisorError::Io(Arc::new(err)))?;
        stdin
            .flush()
            .await
            .map_err(|err| SupervisorError::Io(Arc::new(err)))
    }
}

/// Relays a worker's stdout onto the bus until it exits or is killed.
async fn monitor(
    info: ProcessInfo,
    mut child: Child,
    stdout: impl AsyncRead + Unpin,
    mut kill: oneshot::Receiver<()>,
    processes: ProcessTable,
    bus: broadcast::Sender<BusEvent>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        tokio::select! {
            _ = &mut kill => {
                drop(child.start_kill());
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(event) = parse_line(&info, &line) {
                        drop(bus.send(event));
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(
                        target: LOCAL_TARGET,
                        instance = %info.id(),
                        error = %err,
                        "failed to read worker stdout"
                    );
                    break;
                }
            },
        }
    }

    let status = child.wait().await;
    debug!(
        target: LOCAL_TARGET,
        instance = %info.id(),
        ?status,
        "worker process exited"
    );
    processes
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&info.id());
    drop(bus.send(BusEvent::Exit { process: info }));
}

/// Maps one stdout line to a bus event.
fn parse_line(info: &ProcessInfo, line: &str) -> Option<BusEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Ok(payload) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        debug!(
            target: LOCAL_TARGET,
            instance = %info.id(),
            line = trimmed,
            "ignoring non-JSON worker output"
        );
        return None;
    };
    let process = info.clone();
    match serde_json::from_value::<WorkerReport>(payload.clone()) {
        Ok(WorkerReport::Initialized { events }) => Some(BusEvent::Initialized { process, events }),
        Ok(WorkerReport::Ready) => Some(BusEvent::Ready { process }),
        Ok(WorkerReport::TaskResult { .. }) | Err(_) => Some(BusEvent::Message { process, payload }),
    }
}

/// Drains stderr so the child never blocks on a full pipe.
async fn drain_stderr(info: ProcessInfo, stderr: impl AsyncRead + Unpin) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(
            target: LOCAL_TARGET,
            instance = %info.id(),
            stderr = %line.trim(),
            "worker stderr output"
        );
    }
}
