//! The role store contract.

use async_trait::async_trait;
use rolegate_core::{
    ActorId, AuditEntry, EffectiveGrants, Grant, NewRole, PermissionCatalog, PermissionSet,
    Result, Role, RoleId,
};
use std::sync::Arc;

/// Result of a successful mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Role state after the mutation
    pub role: Role,
    /// Audit entry written for the mutation
    pub audit: AuditEntry,
}

impl Commit {
    /// Version the role moved to.
    pub fn version(&self) -> u64 {
        self.role.version
    }
}

/// Storage for roles, grants and audit history.
///
/// Mutations take the caller's last-seen `expected_version` and fail with
/// `VersionConflict` if somebody else committed in between. Nothing is ever
/// merged: the loser re-reads and decides again. Every successful mutation
/// bumps the version by exactly one, writes one audit entry and publishes one
/// invalidation event.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// The catalog grants are validated against.
    fn catalog(&self) -> &Arc<PermissionCatalog>;

    /// Creates a role at version 1.
    ///
    /// Fails with `DuplicateRole` if the id or name is taken and with
    /// `UnknownPermission` if the initial grants reference unregistered keys.
    async fn create_role(&self, role: NewRole, actor: &ActorId) -> Result<Role>;

    /// Fetches a role. `NotFound` if absent.
    async fn get_role(&self, id: &RoleId) -> Result<Role>;

    /// Every role, ordered by id.
    async fn list_roles(&self) -> Result<Vec<Role>>;

    /// The role's granted keys; the full catalog for system roles.
    async fn get_grants(&self, id: &RoleId) -> Result<PermissionSet>;

    /// Stored grant rows with their provenance, ordered by key.
    async fn grant_rows(&self, id: &RoleId) -> Result<Vec<Grant>>;

    /// Role version and effective grants read atomically together.
    async fn effective_grants(&self, id: &RoleId) -> Result<EffectiveGrants>;

    /// Effective grants of every role, for full cache loads.
    async fn load_all(&self) -> Result<Vec<(RoleId, EffectiveGrants)>>;

    /// Atomically replaces the role's whole grant set.
    ///
    /// Fails with `ImmutableRole` for system roles, `RoleRetired` for retired
    /// roles, `UnknownPermission` for unregistered keys and `VersionConflict`
    /// when `expected_version` is stale. An empty set is accepted.
    async fn replace_grants(
        &self,
        id: &RoleId,
        new_set: PermissionSet,
        expected_version: u64,
        actor: &ActorId,
    ) -> Result<Commit>;

    /// Soft-retires a role. Its grant rows are cleared; the record and audit
    /// history are kept.
    async fn retire_role(
        &self,
        id: &RoleId,
        expected_version: u64,
        actor: &ActorId,
    ) -> Result<Commit>;

    /// Audit history for a role, oldest first.
    async fn audit_log(&self, id: &RoleId) -> Result<Vec<AuditEntry>>;
}
