//! Unit tests for the plugins manager.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::capability::VerifyFn;
use crate::error::BoxError;
use crate::restart::RestartSettings;
use crate::supervisor::{
    BusSubscription, InstanceId, ProcessInfo, ProcessSpec, ProcessSupervisor, SupervisorError,
};
use crate::test_support::{FakeSupervisor, TaskReply};
use crate::worker::WorkerState;

mock! {
    Supervisor {}
    #[async_trait]
    impl ProcessSupervisor for Supervisor {
        async fn list(&self) -> Result<Vec<ProcessInfo>, SupervisorError>;
        async fn start(&self, spec: ProcessSpec) -> Result<(), SupervisorError>;
        async fn delete(&self, id: InstanceId) -> Result<(), SupervisorError>;
        async fn launch_bus(&self) -> Result<BusSubscription, SupervisorError>;
        async fn send_data_to_instance(
            &self,
            id: InstanceId,
            payload: serde_json::Value,
        ) -> Result<(), SupervisorError>;
    }
}

// ---------------------------------------------------------------------------
// Test plugins
// ---------------------------------------------------------------------------

fn accept_all() -> VerifyFn {
    Arc::new(|credentials: &serde_json::Value| Ok(Some(credentials.clone())))
}

/// Registers the given strategy names.
struct Registers(&'static [&'static str]);

impl Plugin for Registers {
    fn init(&self, _config: &serde_json::Value, context: &PluginContext) -> Result<(), BoxError> {
        for name in self.0 {
            context.register_strategy(Arc::new(context.plugin().to_owned()), name, accept_all())?;
        }
        Ok(())
    }
}

/// Registers a strategy, then fails.
struct FailsAfterRegistering;

impl Plugin for FailsAfterRegistering {
    fn init(&self, _config: &serde_json::Value, context: &PluginContext) -> Result<(), BoxError> {
        context.register_strategy(Arc::new(()), "partial", accept_all())?;
        Err("database unreachable".into())
    }

    fn hooks(&self) -> Vec<Hook> {
        vec![Hook::new("never", |_| Ok(Some(json!("registered"))))]
    }
}

/// Registers a strategy, then panics.
struct PanicsAfterRegistering;

impl Plugin for PanicsAfterRegistering {
    fn init(&self, _config: &serde_json::Value, context: &PluginContext) -> Result<(), BoxError> {
        context.register_strategy(Arc::new(()), "partial", accept_all())?;
        panic!("init exploded");
    }
}

/// Sleeps past the init deadline, then tries to register.
struct Sleeper {
    delay: Duration,
    late_registration: Arc<Mutex<Option<bool>>>,
}

impl Plugin for Sleeper {
    fn init(&self, _config: &serde_json::Value, context: &PluginContext) -> Result<(), BoxError> {
        std::thread::sleep(self.delay);
        let accepted = context
            .register_strategy(Arc::new(()), "late", accept_all())
            .is_ok();
        *self.late_registration.lock().expect("late lock") = Some(accepted);
        Ok(())
    }
}

/// Reads its configuration and contributes a hook.
struct Configured;

impl Plugin for Configured {
    fn init(&self, config: &serde_json::Value, context: &PluginContext) -> Result<(), BoxError> {
        let name = config["strategy"].as_str().ok_or("missing strategy")?;
        context.register_strategy(Arc::new(()), name, accept_all())?;
        Ok(())
    }

    fn hooks(&self) -> Vec<Hook> {
        vec![Hook::new("cleanDb:deleteIndexes", |payload| {
            Ok(Some(json!({"rewritten": payload.clone()})))
        })]
    }
}

/// Verify callbacks that fail in different ways.
struct Troublemaker;

impl Plugin for Troublemaker {
    fn init(&self, _config: &serde_json::Value, context: &PluginContext) -> Result<(), BoxError> {
        let failing: VerifyFn = Arc::new(
            |_: &serde_json::Value| -> Result<Option<serde_json::Value>, BoxError> {
                Err("ldap down".into())
            },
        );
        let panicking: VerifyFn = Arc::new(
            |_: &serde_json::Value| -> Result<Option<serde_json::Value>, BoxError> {
                panic!("verify exploded")
            },
        );
        context.register_strategy(Arc::new(()), "failing", failing)?;
        context.register_strategy(Arc::new(()), "panicking", panicking)?;
        Ok(())
    }
}

fn in_process(name: &str, plugin: impl Plugin + 'static) -> InstalledPlugin {
    InstalledPlugin::in_process(PluginDescriptor::in_process(name, "1.0.0"), Arc::new(plugin))
}

fn worker(name: &str, instances: u32) -> InstalledPlugin {
    InstalledPlugin::worker(PluginDescriptor::worker(
        name,
        "1.0.0",
        "/opt/beacon/worker".into(),
        instances,
    ))
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[fixture]
fn settings() -> ManagerSettings {
    ManagerSettings {
        init_timeout: Duration::from_secs(2),
        reconcile_interval: Duration::ZERO,
        bus_reconnect_attempts: 3,
        bus_reconnect_backoff: Duration::from_millis(10),
        restart: RestartSettings {
            max_restarts: 2,
            window: Duration::from_secs(60),
            backoff_base: Duration::ZERO,
            backoff_cap: Duration::ZERO,
        },
        ..ManagerSettings::default()
    }
}

#[fixture]
fn fake() -> Arc<FakeSupervisor> {
    Arc::new(FakeSupervisor::new())
}

fn manager_over(fake: &Arc<FakeSupervisor>, settings: ManagerSettings) -> PluginsManager {
    PluginsManager::new(Arc::clone(fake) as Arc<dyn ProcessSupervisor>, settings)
}

async fn settle(mut done: impl FnMut() -> bool) {
    for _ in 0..300 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

async fn ready_worker(manager: &PluginsManager, fake: &FakeSupervisor, plugin: &str) -> InstanceId {
    let report = manager.load_and_activate(vec![worker(plugin, 1)]).await;
    assert!(report.is_complete(), "{report:?}");
    let id = manager.instances_for(plugin).await[0].id();
    fake.emit_ready(id);
    manager
        .dispatch_bus_event(&BusEvent::Ready {
            process: ProcessInfo::new(id, format!("{DEFAULT_WORKER_PREFIX}{plugin}")),
        })
        .await;
    id
}

// ---------------------------------------------------------------------------
// Strategy listing
// ---------------------------------------------------------------------------

#[rstest]
#[tokio::test]
async fn activations_without_registrations_list_nothing(
    fake: Arc<FakeSupervisor>,
    settings: ManagerSettings,
) {
    let manager = manager_over(&fake, settings);
    let report = manager
        .load_and_activate(vec![in_process("a", Registers(&[])), in_process("b", Registers(&[]))])
        .await;

    assert!(report.is_complete());
    assert_eq!(report.activated, vec!["a", "b"]);
    assert!(manager.list_strategies().is_empty());
}

#[rstest]
#[tokio::test]
async fn single_registration_is_listed(fake: Arc<FakeSupervisor>, settings: ManagerSettings) {
    let manager = manager_over(&fake, settings);
    manager
        .load_and_activate(vec![in_process("auth-local", Registers(&["local"]))])
        .await;

    assert_eq!(manager.list_strategies(), vec!["local"]);
}

#[rstest]
#[case::a_first("auth-a", "auth-b")]
#[case::b_first("auth-b", "auth-a")]
#[tokio::test]
async fn same_name_from_two_plugins_is_listed_once(
    fake: Arc<FakeSupervisor>,
    settings: ManagerSettings,
    #[case] first: &str,
    #[case] second: &str,
) {
    let manager = manager_over(&fake, settings);
    manager
        .load_and_activate(vec![
            in_process(first, Registers(&["local"])),
            in_process(second, Registers(&["local"])),
        ])
        .await;

    assert_eq!(manager.list_strategies(), vec!["local"]);
    let entry = manager.strategy("local").expect("strategy registered");
    assert_eq!(entry.owner(), second);
    assert_eq!(entry.handler_as::<String>().map(String::as_str), Some(second));
}

#[rstest]
#[tokio::test]
async fn unloading_overwritten_owner_keeps_last_writer(
    fake: Arc<FakeSupervisor>,
    settings: ManagerSettings,
) {
    let manager = manager_over(&fake, settings);
    manager
        .load_and_activate(vec![
            in_process("auth-a", Registers(&["local"])),
            in_process("auth-b", Registers(&["local"])),
        ])
        .await;

    manager.unload_plugin("auth-a").await.expect("unload a");

    assert_eq!(manager.list_strategies(), vec!["local"]);
    assert_eq!(
        manager.strategy("local").map(|e| e.owner().to_owned()),
        Some("auth-b".to_owned())
    );
    assert_eq!(manager.loaded_plugins(), vec!["auth-b"]);
}

// ---------------------------------------------------------------------------
// Activation isolation
// ---------------------------------------------------------------------------

#[rstest]
#[case::returns_error(in_process("bad", FailsAfterRegistering), "database unreachable")]
#[case::panics(in_process("bad", PanicsAfterRegistering), "init exploded")]
#[tokio::test]
async fn failing_plugin_is_isolated_and_rolled_back(
    fake: Arc<FakeSupervisor>,
    settings: ManagerSettings,
    #[case] bad: InstalledPlugin,
    #[case] fragment: &str,
) {
    let manager = manager_over(&fake, settings);
    let report = manager
        .load_and_activate(vec![
            in_process("first", Registers(&["local"])),
            bad,
            in_process("last", Registers(&["token"])),
        ])
        .await;

    assert_eq!(report.activated, vec!["first", "last"]);
    let failure = report.failure("bad").expect("failure recorded");
    assert!(matches!(failure, PluginError::Activation { .. }));
    assert!(failure.to_string().contains(fragment), "{failure}");
    assert_eq!(manager.list_strategies(), vec!["local", "token"]);
    assert!(manager.trigger("never", &json!({})).is_none());
    assert!(manager.loaded_plugins().iter().all(|name| name != "bad"));
}

#[rstest]
#[tokio::test]
async fn slow_init_times_out_and_late_registration_is_rejected(
    fake: Arc<FakeSupervisor>,
    settings: ManagerSettings,
) {
    let late_registration = Arc::new(Mutex::new(None));
    let manager = manager_over(
        &fake,
        ManagerSettings {
            init_timeout: Duration::from_millis(50),
            ..settings
        },
    );

    let report = manager
        .load_and_activate(vec![
            in_process(
                "slow",
                Sleeper {
                    delay: Duration::from_millis(300),
                    late_registration: Arc::clone(&late_registration),
                },
            ),
            in_process("fast", Registers(&["local"])),
        ])
        .await;

    assert!(matches!(
        report.failure("slow"),
        Some(PluginError::InitTimeout { timeout_ms: 50, .. })
    ));
    assert_eq!(report.activated, vec!["fast"]);
    settle(|| late_registration.lock().expect("late lock").is_some()).await;
    assert_eq!(*late_registration.lock().expect("late lock"), Some(false));
    assert_eq!(manager.list_strategies(), vec!["local"]);
}

#[rstest]
#[tokio::test]
async fn descriptor_problems_are_reported(fake: Arc<FakeSupervisor>, settings: ManagerSettings) {
    let manager = manager_over(&fake, settings);
    let report = manager
        .load_and_activate(vec![
            in_process("dup", Registers(&[])),
            in_process("dup", Registers(&[])),
            in_process("  ", Registers(&[])),
            InstalledPlugin::worker(PluginDescriptor::in_process("no-entry", "1.0")),
        ])
        .await;

    assert_eq!(report.activated, vec!["dup"]);
    assert_eq!(report.failures.len(), 3);
    assert!(matches!(
        report.failures[0].error,
        PluginError::Descriptor { .. }
    ));
    assert!(matches!(
        report.failures[1].error,
        PluginError::Descriptor { .. }
    ));
    assert!(matches!(
        report.failure("no-entry"),
        Some(PluginError::Activation { .. })
    ));
}

#[rstest]
#[tokio::test]
async fn plugin_config_and_hooks_are_wired(fake: Arc<FakeSupervisor>, settings: ManagerSettings) {
    let manager = manager_over(&fake, settings);
    let descriptor =
        PluginDescriptor::in_process("configured", "1.0").with_config(json!({"strategy": "oauth"}));
    manager
        .load_and_activate(vec![InstalledPlugin::in_process(
            descriptor,
            Arc::new(Configured),
        )])
        .await;

    assert_eq!(manager.list_strategies(), vec!["oauth"]);
    assert_eq!(
        manager.trigger("cleanDb:deleteIndexes", &json!(["users"])),
        Some(json!({"rewritten": ["users"]}))
    );

    manager.unload_plugin("configured").await.expect("unload");
    assert!(manager.trigger("cleanDb:deleteIndexes", &json!([])).is_none());
    assert!(manager.list_strategies().is_empty());
}

#[rstest]
#[tokio::test]
async fn notify_runs_hooks_and_discards_answers(fake: Arc<FakeSupervisor>, settings: ManagerSettings) {
    let manager = manager_over(&fake, settings);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    manager.register_hook(
        "observer",
        Hook::new("cleanDb:done", move |payload: &serde_json::Value| {
            sink.lock().expect("sink").push(payload.clone());
            Ok(Some(json!("ignored")))
        }),
    );

    manager.notify("cleanDb:done", &json!({"indexes": 1}));

    assert_eq!(*seen.lock().expect("seen"), vec![json!({"indexes": 1})]);
}

#[rstest]
#[tokio::test]
async fn unloading_unknown_plugin_fails(fake: Arc<FakeSupervisor>, settings: ManagerSettings) {
    let manager = manager_over(&fake, settings);
    let err = manager.unload_plugin("ghost").await.expect_err("not loaded");
    assert!(matches!(err, PluginError::NotFound { .. }));
}

// ---------------------------------------------------------------------------
// Credential verification
// ---------------------------------------------------------------------------

#[rstest]
#[tokio::test]
async fn verify_credentials_isolates_callback_failures(
    fake: Arc<FakeSupervisor>,
    settings: ManagerSettings,
) {
    let manager = manager_over(&fake, settings);
    manager
        .load_and_activate(vec![
            in_process("auth-local", Registers(&["local"])),
            in_process("trouble", Troublemaker),
        ])
        .await;

    let identity = manager
        .verify_credentials("local", &json!({"user": "ada"}))
        .expect("verify runs");
    assert_eq!(identity, Some(json!({"user": "ada"})));

    for name in ["failing", "panicking"] {
        let err = manager
            .verify_credentials(name, &json!({}))
            .expect_err("callback fails");
        assert!(matches!(err, PluginError::Verify { .. }), "{err}");
    }
    let err = manager
        .verify_credentials("missing", &json!({}))
        .expect_err("unknown");
    assert!(matches!(err, PluginError::UnknownStrategy { .. }));
}

// ---------------------------------------------------------------------------
// Worker accounting
// ---------------------------------------------------------------------------

#[rstest]
#[tokio::test]
async fn worker_plugin_spawns_requested_instances(
    fake: Arc<FakeSupervisor>,
    settings: ManagerSettings,
) {
    let manager = manager_over(&fake, settings);
    let report = manager.load_and_activate(vec![worker("indexer", 3)]).await;

    assert!(report.is_complete());
    let instances = manager.instances_for("indexer").await;
    assert_eq!(instances.len(), 3);
    assert!(instances.iter().all(|i| i.state() == WorkerState::Starting));
    let calls = fake.start_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name(), "beacon-plugin-indexer");
}

#[rstest]
#[tokio::test]
async fn partial_spawn_is_reported_and_kept(fake: Arc<FakeSupervisor>, settings: ManagerSettings) {
    fake.set_start_limit(Some(1));
    let manager = manager_over(&fake, settings);

    let report = manager.load_and_activate(vec![worker("indexer", 3)]).await;

    assert!(matches!(
        report.failure("indexer"),
        Some(PluginError::Spawn { started: 1, .. })
    ));
    assert_eq!(manager.instances_for("indexer").await.len(), 1);
    assert_eq!(manager.loaded_plugins(), vec!["indexer"]);
}

#[rstest]
#[tokio::test]
async fn exit_removes_instance_and_respawns_once(
    fake: Arc<FakeSupervisor>,
    settings: ManagerSettings,
) {
    let manager = manager_over(&fake, settings);
    manager.load_and_activate(vec![worker("indexer", 2)]).await;
    let before = manager.instances_for("indexer").await;
    let crashed = before[0].id();

    let exit = fake.crash(crashed).expect("instance running");
    manager.dispatch_bus_event(&exit).await;

    let after: Vec<InstanceId> = manager
        .instances_for("indexer")
        .await
        .iter()
        .map(WorkerInstance::id)
        .collect();
    assert_eq!(after.len(), 2);
    assert!(!after.contains(&crashed));
    assert!(after.contains(&before[1].id()));
    let calls = fake.start_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].instances(), 1);
}

#[rstest]
#[tokio::test]
async fn exit_of_listed_instance_deletes_it_and_is_not_readopted(
    fake: Arc<FakeSupervisor>,
    settings: ManagerSettings,
) {
    let manager = manager_over(&fake, settings);
    manager.load_and_activate(vec![worker("indexer", 1)]).await;
    let exited = manager.instances_for("indexer").await[0].id();

    manager
        .dispatch_bus_event(&BusEvent::Exit {
            process: ProcessInfo::new(exited, "beacon-plugin-indexer"),
        })
        .await;

    let after: Vec<InstanceId> = manager
        .instances_for("indexer")
        .await
        .iter()
        .map(WorkerInstance::id)
        .collect();
    assert_eq!(after.len(), 1);
    assert!(!after.contains(&exited));
    assert_eq!(fake.deleted(), vec![exited]);
    assert!(fake.processes().iter().all(|process| process.id() != exited));
    assert_eq!(manager.reconcile_workers().await.expect("reconcile"), 0);
    assert_eq!(manager.instances_for("indexer").await.len(), 1);
}

#[rstest]
#[tokio::test]
async fn restart_storms_are_bounded(fake: Arc<FakeSupervisor>, settings: ManagerSettings) {
    let manager = manager_over(&fake, settings);
    manager.load_and_activate(vec![worker("indexer", 1)]).await;

    for _ in 0..4 {
        let Some(instance) = manager.instances_for("indexer").await.first().cloned() else {
            break;
        };
        let exit = fake.crash(instance.id()).expect("instance running");
        manager.dispatch_bus_event(&exit).await;
    }

    assert_eq!(fake.start_calls().len(), 3);
    assert!(manager.instances_for("indexer").await.is_empty());
}

#[rstest]
#[tokio::test]
async fn exit_of_untracked_instance_is_ignored(
    fake: Arc<FakeSupervisor>,
    settings: ManagerSettings,
) {
    let manager = manager_over(&fake, settings);
    manager
        .dispatch_bus_event(&BusEvent::Exit {
            process: ProcessInfo::new(InstanceId::new(42), "beacon-plugin-ghost"),
        })
        .await;
    assert!(fake.start_calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn explicit_remove_is_idempotent_and_not_respawned(
    fake: Arc<FakeSupervisor>,
    settings: ManagerSettings,
) {
    let manager = manager_over(&fake, settings);
    manager.load_and_activate(vec![worker("indexer", 1)]).await;
    let id = manager.instances_for("indexer").await[0].id();

    assert!(manager.workers().remove(id).await.expect("first remove"));
    assert!(!manager.workers().remove(id).await.expect("second remove"));
    manager
        .dispatch_bus_event(&BusEvent::Exit {
            process: ProcessInfo::new(id, "beacon-plugin-indexer"),
        })
        .await;

    assert_eq!(fake.deleted(), vec![id]);
    assert_eq!(fake.start_calls().len(), 1);
}

#[rstest]
#[tokio::test]
async fn reconcile_drops_vanished_instances_and_respawns(
    fake: Arc<FakeSupervisor>,
    settings: ManagerSettings,
) {
    let manager = manager_over(&fake, settings);
    manager.load_and_activate(vec![worker("indexer", 2)]).await;
    let vanished = manager.instances_for("indexer").await[0].id();
    fake.vanish(vanished);

    assert_eq!(manager.reconcile_workers().await.expect("reconcile"), 1);

    let ids: Vec<InstanceId> = manager
        .instances_for("indexer")
        .await
        .iter()
        .map(WorkerInstance::id)
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(!ids.contains(&vanished));
}

// ---------------------------------------------------------------------------
// Delegation to workers
// ---------------------------------------------------------------------------

#[rstest]
#[tokio::test]
async fn send_without_ready_worker_makes_no_supervisor_call(settings: ManagerSettings) {
    let mut supervisor = MockSupervisor::new();
    supervisor.expect_send_data_to_instance().never();
    let manager = PluginsManager::new(Arc::new(supervisor), settings);

    let err = manager
        .send_to_worker("indexer", json!({"job": 1}), Duration::from_secs(1))
        .await
        .expect_err("nothing ready");

    assert!(matches!(err, PluginError::NoAvailableWorker { .. }));
}

#[rstest]
#[tokio::test]
async fn starting_instances_are_not_eligible(fake: Arc<FakeSupervisor>, settings: ManagerSettings) {
    let manager = manager_over(&fake, settings);
    manager.load_and_activate(vec![worker("indexer", 2)]).await;

    let err = manager
        .send_to_worker("indexer", json!({}), Duration::from_secs(1))
        .await
        .expect_err("nothing ready");

    assert!(matches!(err, PluginError::NoAvailableWorker { .. }));
    assert!(fake.sent().is_empty());
}

#[rstest]
#[tokio::test]
async fn send_reaches_first_ready_worker(fake: Arc<FakeSupervisor>, settings: ManagerSettings) {
    let manager = manager_over(&fake, settings);
    let id = ready_worker(&manager, &fake, "indexer").await;

    let target = manager
        .send_to_worker("indexer", json!({"job": 1}), Duration::from_secs(1))
        .await
        .expect("delivered");

    assert_eq!(target, id);
    assert_eq!(
        fake.sent(),
        vec![(id, json!({"type": "data", "payload": {"job": 1}}))]
    );
}

#[rstest]
#[tokio::test]
async fn slow_delivery_times_out_without_killing_worker(
    fake: Arc<FakeSupervisor>,
    settings: ManagerSettings,
) {
    let manager = manager_over(&fake, settings);
    let id = ready_worker(&manager, &fake, "indexer").await;
    fake.hang_sends();

    let err = manager
        .send_to_worker("indexer", json!({}), Duration::from_millis(50))
        .await
        .expect_err("times out");

    assert!(matches!(
        err,
        PluginError::WorkerTimeout { timeout_ms: 50, .. }
    ));
    assert_eq!(manager.workers().first_ready("indexer").await, Some(id));
    assert!(fake.deleted().is_empty());
}

#[rstest]
#[case::echo(TaskReply::Echo)]
#[case::failure(TaskReply::Fail("disk full".into()))]
#[tokio::test]
async fn submitted_tasks_resolve_from_worker_reports(
    fake: Arc<FakeSupervisor>,
    settings: ManagerSettings,
    #[case] reply: TaskReply,
) {
    let manager = manager_over(&fake, settings);
    manager.start().await.expect("start");
    ready_worker(&manager, &fake, "writer").await;
    fake.set_task_reply(reply.clone());

    let result = manager
        .submit_task("writer", json!({"delete": ["users"]}), Duration::from_secs(2))
        .await;

    match reply {
        TaskReply::Echo => assert_eq!(result.expect("task ok"), json!({"delete": ["users"]})),
        _ => assert!(matches!(
            result,
            Err(PluginError::TaskFailed { ref message, .. }) if message == "disk full"
        )),
    }
    manager.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn unanswered_task_times_out(fake: Arc<FakeSupervisor>, settings: ManagerSettings) {
    let manager = manager_over(&fake, settings);
    manager.start().await.expect("start");
    ready_worker(&manager, &fake, "writer").await;

    let err = manager
        .submit_task("writer", json!({}), Duration::from_millis(50))
        .await
        .expect_err("no answer");

    assert!(matches!(err, PluginError::WorkerTimeout { .. }));
    manager.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn worker_exit_fails_pending_task(fake: Arc<FakeSupervisor>, settings: ManagerSettings) {
    let manager = manager_over(&fake, settings);
    let id = ready_worker(&manager, &fake, "writer").await;

    let submit = manager.submit_task("writer", json!({}), Duration::from_secs(2));
    let crash = async {
        settle(|| !fake.sent().is_empty()).await;
        let exit = fake.crash(id).expect("instance running");
        manager.dispatch_bus_event(&exit).await;
    };
    let (result, ()) = tokio::join!(submit, crash);

    assert!(matches!(
        result,
        Err(PluginError::WorkerExited { instance, .. }) if instance == id
    ));
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

#[rstest]
#[tokio::test]
async fn triggered_events_reach_interested_workers(
    fake: Arc<FakeSupervisor>,
    settings: ManagerSettings,
) {
    let manager = manager_over(&fake, settings);
    manager.start().await.expect("start");
    manager.load_and_activate(vec![worker("audit", 2)]).await;
    let ids: Vec<InstanceId> = manager
        .instances_for("audit")
        .await
        .iter()
        .map(WorkerInstance::id)
        .collect();
    fake.emit_initialized(ids[0], &["cleanDb:done"]);
    fake.emit_initialized(ids[1], &["other"]);
    for _ in 0..100 {
        if manager.workers().interested("cleanDb:done").await == vec![ids[0]] {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(manager.trigger("cleanDb:done", &json!({"indexes": 3})).is_none());

    settle(|| !fake.sent().is_empty()).await;
    assert_eq!(
        fake.sent(),
        vec![(
            ids[0],
            json!({"type": "event", "event": "cleanDb:done", "payload": {"indexes": 3}})
        )]
    );
    manager.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn unstarted_manager_does_not_queue_triggered_events(
    fake: Arc<FakeSupervisor>,
    settings: ManagerSettings,
) {
    let manager = manager_over(&fake, settings);

    for index in 0..3 {
        assert!(manager.trigger("user:login", &json!({"n": index})).is_none());
    }

    let mut queue = manager
        .shared
        .forward_queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
        .expect("queue not yet taken");
    assert!(queue.try_recv().is_err());
}

#[rstest]
#[tokio::test]
async fn bus_is_reopened_after_closing(fake: Arc<FakeSupervisor>, settings: ManagerSettings) {
    let manager = manager_over(&fake, settings);
    manager.start().await.expect("start");
    manager.load_and_activate(vec![worker("indexer", 1)]).await;
    let id = manager.instances_for("indexer").await[0].id();

    fake.fail_bus_openings(1);
    fake.close_bus();
    settle(|| fake.bus_openings() == 2).await;

    fake.emit_ready(id);
    for _ in 0..100 {
        if manager.workers().first_ready("indexer").await == Some(id) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(manager.workers().first_ready("indexer").await, Some(id));
    manager.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn start_fails_when_bus_is_unavailable(
    fake: Arc<FakeSupervisor>,
    settings: ManagerSettings,
) {
    fake.fail_bus_openings(1);
    let manager = manager_over(&fake, settings);

    let err = manager.start().await.expect_err("bus refused");
    assert!(matches!(
        err,
        PluginError::Supervisor {
            operation: "launch_bus",
            ..
        }
    ));
    manager.start().await.expect("second start succeeds");
    manager.start().await.expect("repeated start is a no-op");
    assert_eq!(fake.bus_openings(), 1);
    manager.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn shutdown_deletes_workers_without_respawning(
    fake: Arc<FakeSupervisor>,
    settings: ManagerSettings,
) {
    let manager = manager_over(&fake, settings);
    manager.start().await.expect("start");
    manager.load_and_activate(vec![worker("indexer", 2)]).await;

    manager.shutdown().await;

    assert!(fake.processes().is_empty());
    assert_eq!(fake.deleted().len(), 2);
    assert_eq!(fake.start_calls().len(), 1);
    assert!(manager.workers().snapshot().await.is_empty());
}
