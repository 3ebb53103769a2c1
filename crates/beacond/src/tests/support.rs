//! Test doubles shared by the daemon tests.

use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoError};

use beacon_config::Config;
use beacon_plugins::{ActivationReport, BoxError, Plugin, PluginContext, VerifyFn};

use crate::bootstrap::{BootstrapError, ConfigLoader};
use crate::health::HealthReporter;

/// Structured health events tracked during tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    PluginsActivated { activated: usize, failed: usize },
    ShutdownStarting,
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub(super) struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub(super) fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn plugins_activated(&self, report: &ActivationReport) {
        self.record(HealthEvent::PluginsActivated {
            activated: report.activated.len(),
            failed: report.failures.len(),
        });
    }

    fn shutdown_starting(&self) {
        self.record(HealthEvent::ShutdownStarting);
    }
}

/// Loader that fails by passing an unparsable flag value.
pub(super) struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter(vec![
            OsString::from("beacond"),
            OsString::from("--restart-max"),
            OsString::from("many"),
        ])
    }
}

/// Configuration suited to tests: no periodic reconcile, quick timeouts.
pub(super) fn test_config(catalog: Option<Utf8PathBuf>) -> Config {
    Config {
        plugin_catalog: catalog,
        plugin_init_timeout_ms: 2_000,
        worker_call_timeout_ms: 1_000,
        reconcile_interval_secs: 0,
        bus_reconnect_backoff_ms: 10,
        ..Config::default()
    }
}

/// Writes `json` as a catalogue under `dir` and returns its path.
pub(super) fn write_catalog(dir: &Path, json: &str) -> Utf8PathBuf {
    let path = dir.join("plugins.json");
    fs::write(&path, json).expect("write catalogue");
    Utf8PathBuf::from_path_buf(path).expect("utf-8 temp path")
}

/// In-process plugin registering the strategy named in its config.
pub(super) struct ConfiguredAuth;

impl Plugin for ConfiguredAuth {
    fn init(&self, config: &serde_json::Value, context: &PluginContext) -> Result<(), BoxError> {
        let name = config
            .get("strategy")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("local");
        let verify: VerifyFn = Arc::new(|_: &serde_json::Value| Ok(None));
        context.register_strategy(Arc::new(()), name, verify)?;
        Ok(())
    }
}

/// Polls `done` until it holds or a generous deadline passes.
pub(super) async fn settle<F>(mut done: F)
where
    F: AsyncFnMut() -> bool,
{
    for _ in 0..300 {
        if done().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
