//! The plugin catalogue: which plugins the daemon activates at startup.
//!
//! The catalogue is a JSON document listing plugin descriptors in
//! activation order:
//!
//! ```json
//! {
//!   "plugins": [
//!     { "name": "auth-local", "version": "1.0.0", "mode": "in_process",
//!       "config": { "strategy": "local" } },
//!     { "name": "writer", "version": "1.0.0", "mode": "worker",
//!       "executable": "/opt/beacon/plugins/writer", "instances": 2 }
//!   ]
//! }
//! ```
//!
//! Worker entries carry everything needed to spawn them. In-process entries
//! name a plugin compiled into the daemon and are matched against
//! [`BuiltinPlugins`].

use std::collections::HashMap;
use std::fs;
use std::io;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use thiserror::Error;

use beacon_plugins::{
    ActivationFailure, ActivationMode, InstalledPlugin, Plugin, PluginDescriptor, PluginError,
};

/// Errors raised while reading a catalogue.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalogue file could not be read.
    #[error("failed to read plugin catalogue '{path}': {source}")]
    Read {
        /// Catalogue path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The catalogue is not valid JSON of the expected shape.
    #[error("malformed plugin catalogue: {source}")]
    Parse {
        /// Underlying parse error.
        #[from]
        source: serde_json::Error,
    },
}

/// Plugins compiled into the daemon, keyed by name.
#[derive(Default, Clone)]
pub struct BuiltinPlugins {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl BuiltinPlugins {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `plugin` under `name`, replacing any previous entry.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.insert(name.into(), plugin);
        self
    }

    /// Returns the plugin registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).map(Arc::clone)
    }

    /// Number of built-in plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns `true` when no plugin is built in.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl std::fmt::Debug for BuiltinPlugins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("BuiltinPlugins")
            .field("plugins", &names)
            .finish()
    }
}

/// Catalogue entries resolved against the built-in plugins.
#[derive(Debug, Default)]
pub struct ResolvedCatalog {
    /// Plugins ready for activation, in catalogue order.
    pub plugins: Vec<InstalledPlugin>,
    /// In-process entries that name no built-in plugin.
    pub unresolved: Vec<ActivationFailure>,
}

/// A parsed plugin catalogue.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PluginCatalog {
    #[serde(default)]
    plugins: Vec<PluginDescriptor>,
}

impl PluginCatalog {
    /// Builds a catalogue from descriptors.
    #[must_use]
    pub const fn new(plugins: Vec<PluginDescriptor>) -> Self {
        Self { plugins }
    }

    /// Reads and parses the catalogue at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Read`] when the file cannot be read and
    /// [`CatalogError::Parse`] when it is not a valid catalogue.
    pub fn load(path: &Utf8Path) -> Result<Self, CatalogError> {
        let text = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source: Arc::new(source),
        })?;
        Self::from_json(&text)
    }

    /// Parses a catalogue document.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Parse`] when `text` is not a valid catalogue.
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Descriptors in catalogue order.
    #[must_use]
    pub fn descriptors(&self) -> &[PluginDescriptor] {
        &self.plugins
    }

    /// Pairs in-process entries with their built-in implementation.
    ///
    /// The catalogue's descriptor, including its `config`, is kept for
    /// matched entries. Unmatched in-process entries are reported as
    /// activation failures rather than dropped.
    #[must_use]
    pub fn resolve(self, builtins: &BuiltinPlugins) -> ResolvedCatalog {
        let mut resolved = ResolvedCatalog::default();
        for descriptor in self.plugins {
            match descriptor.mode() {
                ActivationMode::Worker => {
                    resolved.plugins.push(InstalledPlugin::worker(descriptor));
                }
                ActivationMode::InProcess => match builtins.get(descriptor.name()) {
                    Some(plugin) => resolved
                        .plugins
                        .push(InstalledPlugin::in_process(descriptor, plugin)),
                    None => resolved.unresolved.push(ActivationFailure {
                        plugin: descriptor.name().to_owned(),
                        error: PluginError::Activation {
                            name: descriptor.name().to_owned(),
                            message: String::from("no built-in plugin with this name"),
                        },
                    }),
                },
            }
        }
        resolved
    }
}
