//! Lookup of identities currently assigned to a role.

use async_trait::async_trait;
use rolegate_core::{Result, RoleId};
use std::collections::HashMap;

/// Source of truth for which identities hold which role.
///
/// Identities are owned by the identity provider, not by Rolegate; the edit
/// workflow only asks how many would be affected by a change.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Number of active identities assigned `role_id`.
    async fn active_identities(&self, role_id: &RoleId) -> Result<usize>;
}

/// Fixed role → count table.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    counts: HashMap<RoleId, usize>,
}

impl StaticDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the active identity count for a role.
    pub fn with_count(mut self, role_id: RoleId, count: usize) -> Self {
        self.counts.insert(role_id, count);
        self
    }
}

#[async_trait]
impl IdentityDirectory for StaticDirectory {
    async fn active_identities(&self, role_id: &RoleId) -> Result<usize> {
        Ok(self.counts.get(role_id).copied().unwrap_or(0))
    }
}
