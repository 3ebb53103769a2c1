//! Respawn policy applied when a worker instance exits.
//!
//! The default policy replaces each exited instance with one new instance,
//! delayed by an exponential backoff, and stops replacing once a plugin has
//! been restarted `max_restarts` times within the sliding `window`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// What to do after a worker exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Start one replacement instance after `delay`.
    Respawn {
        /// Time to wait before starting the replacement.
        delay: Duration,
    },
    /// Leave the plugin with fewer instances.
    Suppress,
}

/// Decides whether an exited worker is replaced.
///
/// Called once per exit, from the bus listener; implementations must not
/// block.
pub trait RestartPolicy: Send + Sync {
    /// Returns the decision for an exit of one of `plugin`'s instances.
    fn on_exit(&self, plugin: &str) -> RestartDecision;

    /// Forgets the restart history of `plugin`.
    fn reset(&self, _plugin: &str) {}
}

/// Bounds of the default restart policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartSettings {
    /// Restarts allowed per plugin within `window`.
    pub max_restarts: u32,
    /// Length of the sliding window.
    pub window: Duration,
    /// Delay before the second restart within the window; doubles after.
    pub backoff_base: Duration,
    /// Upper bound on the delay.
    pub backoff_cap: Duration,
}

impl Default for RestartSettings {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            window: Duration::from_secs(60),
            backoff_base: Duration::from_millis(250),
            backoff_cap: Duration::from_secs(10),
        }
    }
}

/// Sliding-window restart limit with exponential backoff.
///
/// The first restart in a window is immediate; the n-th waits
/// `backoff_base * 2^(n-2)`, capped at `backoff_cap`.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use beacon_plugins::restart::{
///     DefaultRestartPolicy, RestartDecision, RestartPolicy, RestartSettings,
/// };
///
/// let policy = DefaultRestartPolicy::new(RestartSettings {
///     max_restarts: 1,
///     ..RestartSettings::default()
/// });
/// assert_eq!(policy.on_exit("indexer"), RestartDecision::Respawn { delay: Duration::ZERO });
/// assert_eq!(policy.on_exit("indexer"), RestartDecision::Suppress);
/// ```
#[derive(Debug)]
pub struct DefaultRestartPolicy {
    settings: RestartSettings,
    history: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl DefaultRestartPolicy {
    /// Creates a policy with the given bounds.
    #[must_use]
    pub fn new(settings: RestartSettings) -> Self {
        Self {
            settings,
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the configured bounds.
    #[must_use]
    pub const fn settings(&self) -> &RestartSettings {
        &self.settings
    }

    fn delay_for(&self, previous: usize) -> Duration {
        if previous == 0 {
            return Duration::ZERO;
        }
        let exponent = u32::try_from(previous - 1).unwrap_or(u32::MAX).min(16);
        self.settings
            .backoff_base
            .saturating_mul(1_u32 << exponent)
            .min(self.settings.backoff_cap)
    }
}

impl Default for DefaultRestartPolicy {
    fn default() -> Self {
        Self::new(RestartSettings::default())
    }
}

impl RestartPolicy for DefaultRestartPolicy {
    fn on_exit(&self, plugin: &str) -> RestartDecision {
        let now = Instant::now();
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let restarts = history.entry(plugin.to_owned()).or_default();
        while restarts
            .front()
            .is_some_and(|at| now.duration_since(*at) > self.settings.window)
        {
            restarts.pop_front();
        }
        let previous = restarts.len();
        if previous >= self.settings.max_restarts as usize {
            return RestartDecision::Suppress;
        }
        restarts.push_back(now);
        RestartDecision::Respawn {
            delay: self.delay_for(previous),
        }
    }

    fn reset(&self, plugin: &str) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(plugin);
    }
}

/// Policy that never replaces exited workers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRestart;

impl RestartPolicy for NeverRestart {
    fn on_exit(&self, _plugin: &str) -> RestartDecision {
        RestartDecision::Suppress
    }
}
