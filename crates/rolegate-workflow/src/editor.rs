//! Entry point for role configuration edits.

use rolegate_core::config::StoreConfig;
use rolegate_core::{Result, RoleId};
use rolegate_store::RoleStore;
use std::sync::Arc;
use std::time::Duration;

use crate::directory::IdentityDirectory;
use crate::session::EditSession;

/// Opens [`EditSession`]s against a role store.
#[derive(Clone)]
pub struct RoleEditor {
    store: Arc<dyn RoleStore>,
    directory: Option<Arc<dyn IdentityDirectory>>,
    submit_timeout: Duration,
}

impl RoleEditor {
    /// Creates an editor using the default submission timeout.
    pub fn new(store: Arc<dyn RoleStore>) -> Self {
        Self {
            store,
            directory: None,
            submit_timeout: StoreConfig::default().submit_timeout(),
        }
    }

    /// Creates an editor configured from the `[store]` section.
    pub fn from_config(store: Arc<dyn RoleStore>, config: &StoreConfig) -> Self {
        Self::new(store).with_submit_timeout(config.submit_timeout())
    }

    /// Sets how long a submission may wait on the store.
    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    /// Wires an identity directory so validation can warn about stranded
    /// identities.
    pub fn with_directory(mut self, directory: Arc<dyn IdentityDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Loads a role and pins its version.
    pub async fn open(&self, role_id: &RoleId) -> Result<EditSession> {
        EditSession::open(
            self.store.clone(),
            self.directory.clone(),
            self.submit_timeout,
            role_id,
        )
        .await
    }
}
