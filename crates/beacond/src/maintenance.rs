//! Administrative database reset.
//!
//! A reset lists every index, lets plugins amend the deletion request through
//! the `cleanDb:deleteIndexes` hook, hands the request to the writer worker
//! plugin and finally clears the index cache. Observers learn the outcome
//! through `cleanDb:done` or `cleanDb:error`. Only a server node may reset;
//! a worker node is refused before anything is touched.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use beacon_plugins::{BoxError, PluginError, PluginsManager};

const MAINTENANCE_TARGET: &str = "beacond::maintenance";

/// Event triggered with the deletion request; hooks may return a rewrite.
pub const DELETE_INDEXES_EVENT: &str = "cleanDb:deleteIndexes";
/// Event triggered once the reset completed.
pub const RESET_DONE_EVENT: &str = "cleanDb:done";
/// Event triggered with the failure when the reset fails.
pub const RESET_ERROR_EVENT: &str = "cleanDb:error";

/// Storage-side operations a reset relies on.
#[async_trait]
pub trait IndexCatalog: Send + Sync {
    /// Lists the indexes currently stored.
    ///
    /// # Errors
    ///
    /// Returns the storage error when the listing fails.
    async fn list_indexes(&self) -> Result<Vec<String>, BoxError>;

    /// Forgets every cached index.
    fn reset_cache(&self);
}

/// Which side of the deployment the reset runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NodeRole {
    /// The orchestrating server.
    #[default]
    Server,
    /// A worker process.
    Worker,
}

/// Errors raised by [`DatabaseReset::run`].
#[derive(Debug, Error)]
pub enum MaintenanceError {
    /// The reset was requested on a worker node.
    #[error("only a server node can reset the database")]
    NotServer,
    /// Indexes could not be listed.
    #[error("failed to list indexes: {0}")]
    ListIndexes(#[source] BoxError),
    /// The writer worker did not carry out the deletion.
    #[error("index deletion failed: {0}")]
    Delete(#[source] PluginError),
}

/// Resets the database through the writer worker plugin.
pub struct DatabaseReset {
    manager: Arc<PluginsManager>,
    catalog: Arc<dyn IndexCatalog>,
    writer: String,
    timeout: Duration,
    role: NodeRole,
}

impl DatabaseReset {
    /// Builds a reset that delegates deletions to the `writer` plugin.
    ///
    /// The deletion is bounded by the manager's worker call timeout.
    #[must_use]
    pub fn new(
        manager: Arc<PluginsManager>,
        catalog: Arc<dyn IndexCatalog>,
        writer: impl Into<String>,
    ) -> Self {
        let timeout = manager.settings().worker_call_timeout;
        Self {
            manager,
            catalog,
            writer: writer.into(),
            timeout,
            role: NodeRole::Server,
        }
    }

    /// Sets the role of the node running the reset.
    #[must_use]
    pub const fn with_role(mut self, role: NodeRole) -> Self {
        self.role = role;
        self
    }

    /// Overrides the deletion deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs the reset and returns `{ "databaseReset": true }` on success.
    ///
    /// # Errors
    ///
    /// Returns [`MaintenanceError::NotServer`] on a worker node without
    /// publishing anything. Returns [`MaintenanceError`] when listing or
    /// deletion fails; that failure is also published on `cleanDb:error`.
    pub async fn run(&self) -> Result<serde_json::Value, MaintenanceError> {
        if self.role != NodeRole::Server {
            warn!(target: MAINTENANCE_TARGET, "database reset refused on worker node");
            return Err(MaintenanceError::NotServer);
        }
        match self.reset().await {
            Ok(()) => {
                self.manager.notify(
                    RESET_DONE_EVENT,
                    &json!({ "message": "database reset done" }),
                );
                info!(target: MAINTENANCE_TARGET, writer = self.writer.as_str(), "database reset");
                Ok(json!({ "databaseReset": true }))
            }
            Err(error) => {
                warn!(target: MAINTENANCE_TARGET, %error, "database reset failed");
                self.manager
                    .notify(RESET_ERROR_EVENT, &json!({ "message": error.to_string() }));
                Err(error)
            }
        }
    }

    async fn reset(&self) -> Result<(), MaintenanceError> {
        let indexes = self
            .catalog
            .list_indexes()
            .await
            .map_err(MaintenanceError::ListIndexes)?;
        let listed = json!({
            "controller": "admin",
            "action": "deleteIndexes",
            "body": { "indexes": indexes },
        });
        let request = self
            .manager
            .trigger(DELETE_INDEXES_EVENT, &listed)
            .unwrap_or(listed);
        self.manager
            .submit_task(self.writer.as_str(), request, self.timeout)
            .await
            .map_err(MaintenanceError::Delete)?;
        self.catalog.reset_cache();
        Ok(())
    }
}

impl std::fmt::Debug for DatabaseReset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseReset")
            .field("writer", &self.writer)
            .field("timeout", &self.timeout)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}
