//! Behaviour-driven tests for strategy registration.

use std::collections::HashMap;
use std::sync::Arc;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::capability::{CapabilityRegistry, StrategyHandler, VerifyFn};
use crate::context::PluginContext;
use crate::error::PluginError;
use crate::hooks::{EventDispatcher, HookRegistry};

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

struct TestWorld {
    capabilities: Arc<CapabilityRegistry>,
    events: EventDispatcher,
    contexts: HashMap<String, PluginContext>,
    outcome: Option<Result<(), PluginError>>,
}

impl Default for TestWorld {
    fn default() -> Self {
        let (events, _queue) = EventDispatcher::new(Arc::new(HookRegistry::new()));
        Self {
            capabilities: Arc::new(CapabilityRegistry::new()),
            events,
            contexts: HashMap::new(),
            outcome: None,
        }
    }
}

impl TestWorld {
    fn context(&mut self, plugin: &str) -> PluginContext {
        let capabilities = Arc::clone(&self.capabilities);
        let events = self.events.clone();
        self.contexts
            .entry(plugin.to_owned())
            .or_insert_with(|| PluginContext::new(plugin, capabilities, events))
            .clone()
    }
}

#[fixture]
fn world() -> TestWorld {
    TestWorld::default()
}

fn accept_all() -> VerifyFn {
    Arc::new(|credentials: &serde_json::Value| Ok(Some(credentials.clone())))
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("an empty strategy registry")]
fn given_empty_registry(world: &mut TestWorld) {
    assert!(world.capabilities.is_empty());
}

#[given("the context of plugin {plugin} is revoked")]
fn given_revoked_context(world: &mut TestWorld, plugin: String) {
    world.context(plugin.trim_matches('"')).revoke();
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("plugin {plugin} registers strategy {strategy}")]
fn when_register(world: &mut TestWorld, plugin: String, strategy: String) {
    let plugin_name = plugin.trim_matches('"');
    let strategy_name = strategy.trim_matches('"');
    let handler: StrategyHandler = Arc::new(format!("{plugin_name}/{strategy_name}"));
    let context = world.context(plugin_name);
    world.outcome = Some(context.register_strategy(handler, strategy_name, accept_all()));
}

#[when("the strategies of plugin {plugin} are unregistered")]
fn when_unregister(world: &mut TestWorld, plugin: String) {
    world.capabilities.unregister_all(plugin.trim_matches('"'));
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("the listed strategies are {names}")]
fn then_listed(world: &mut TestWorld, names: String) {
    let expected: Vec<String> = names
        .trim_matches('"')
        .split(',')
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect();
    assert_eq!(world.capabilities.list(), expected);
}

#[then("strategy {strategy} is owned by {plugin}")]
fn then_owned_by(world: &mut TestWorld, strategy: String, plugin: String) {
    let owner = world.capabilities.owner_of(strategy.trim_matches('"'));
    assert_eq!(owner.as_deref(), Some(plugin.trim_matches('"')));
}

#[then("the registration is rejected")]
fn then_rejected(world: &mut TestWorld) {
    let outcome = world.outcome.take().expect("no registration attempted");
    assert!(
        matches!(outcome, Err(PluginError::ContextRevoked { .. })),
        "expected revoked context, got {outcome:?}"
    );
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/strategy_registry.feature",
    name = "An empty registry lists no strategies"
)]
fn empty_registry(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/strategy_registry.feature",
    name = "A plugin registers the local strategy"
)]
fn single_local_strategy(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/strategy_registry.feature",
    name = "Two plugins register distinct strategies"
)]
fn two_plugins(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/strategy_registry.feature",
    name = "Unloading a plugin keeps the strategies of others"
)]
fn unload_keeps_others(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/strategy_registry.feature",
    name = "The last registration of a name wins"
)]
fn last_writer_wins(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/strategy_registry.feature",
    name = "A revoked context cannot register strategies"
)]
fn revoked_context(world: TestWorld) {
    let _ = world;
}
