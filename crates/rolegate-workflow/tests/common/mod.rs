//! Common test utilities and harness for workflow integration tests.

use async_trait::async_trait;
use rolegate_cache::{Refresher, SnapshotCache};
use rolegate_core::config::CacheConfig;
use rolegate_core::{
    ActorId, AuditEntry, EffectiveGrants, Grant, NewRole, PermissionCatalog, PermissionKey,
    PermissionSet, Result, Role, RoleId,
};
use rolegate_store::bootstrap::seed_roles;
use rolegate_store::{Commit, InMemoryRoleStore, InvalidationBus, LocalBus, RoleStore};
use rolegate_workflow::RoleEditor;
use std::sync::Arc;
use std::time::Duration;

/// Store and bus seeded with the grade-book catalog:
/// - `teacher` holding `view_grades` at version 1
/// - `super_admin`, a system role
/// - `anonymous`, with no grants
pub struct TestHarness {
    /// Bus the store publishes on
    pub bus: Arc<LocalBus>,
    /// Seeded store
    pub store: Arc<InMemoryRoleStore>,
}

impl TestHarness {
    /// Builds a seeded harness.
    pub async fn new() -> Self {
        let mut catalog = PermissionCatalog::new();
        catalog
            .register("view_grades", "grades", "Read grades")
            .unwrap();
        catalog
            .register("edit_grades", "grades", "Edit grades")
            .unwrap();
        let bus = Arc::new(LocalBus::default());
        let store = Arc::new(InMemoryRoleStore::new(Arc::new(catalog), bus.clone()));

        let roles = vec![
            NewRole::new(role_id("super_admin"), "Super Admin").system(),
            NewRole::new(role_id("anonymous"), "Anonymous"),
            NewRole::new(role_id("teacher"), "Teacher").with_grants(set(&["view_grades"])),
        ];
        seed_roles(store.as_ref(), &roles).await.unwrap();
        Self { bus, store }
    }

    /// Editor over the harness store.
    pub fn editor(&self) -> RoleEditor {
        RoleEditor::new(self.store.clone())
    }

    /// Loaded cache with a running refresher subscribed to the harness bus.
    pub async fn cache(&self) -> (Arc<SnapshotCache>, Refresher) {
        let config = CacheConfig {
            refresh_attempts: 2,
            retry_min_delay_ms: 1,
            retry_max_delay_ms: 5,
            resync_interval_secs: 30,
            ready_timeout_ms: 1_000,
        };
        let subscription = self.bus.subscribe().await.unwrap();
        let cache = SnapshotCache::open(self.store.clone(), config)
            .await
            .unwrap();
        let refresher = Refresher::spawn(cache.clone(), self.bus.clone(), subscription);
        cache
            .health()
            .wait_ready(cache.config().ready_timeout())
            .await
            .unwrap();
        (cache, refresher)
    }
}

pub fn key(k: &str) -> PermissionKey {
    PermissionKey::parse(k).unwrap()
}

pub fn set(keys: &[&str]) -> PermissionSet {
    keys.iter().map(|k| key(k)).collect()
}

pub fn role_id(id: &str) -> RoleId {
    RoleId::parse(id).unwrap()
}

pub fn admin() -> ActorId {
    ActorId::new("admin@example.edu")
}

/// Store whose `replace_grants` commits, then stalls before answering.
///
/// Models a write that lands but whose acknowledgement is lost.
pub struct StallingStore {
    pub inner: Arc<InMemoryRoleStore>,
    pub stall: Duration,
}

#[async_trait]
impl RoleStore for StallingStore {
    fn catalog(&self) -> &Arc<PermissionCatalog> {
        self.inner.catalog()
    }
    async fn create_role(&self, role: NewRole, actor: &ActorId) -> Result<Role> {
        self.inner.create_role(role, actor).await
    }
    async fn get_role(&self, id: &RoleId) -> Result<Role> {
        self.inner.get_role(id).await
    }
    async fn list_roles(&self) -> Result<Vec<Role>> {
        self.inner.list_roles().await
    }
    async fn get_grants(&self, id: &RoleId) -> Result<PermissionSet> {
        self.inner.get_grants(id).await
    }
    async fn grant_rows(&self, id: &RoleId) -> Result<Vec<Grant>> {
        self.inner.grant_rows(id).await
    }
    async fn effective_grants(&self, id: &RoleId) -> Result<EffectiveGrants> {
        self.inner.effective_grants(id).await
    }
    async fn load_all(&self) -> Result<Vec<(RoleId, EffectiveGrants)>> {
        self.inner.load_all().await
    }
    async fn replace_grants(
        &self,
        id: &RoleId,
        new_set: PermissionSet,
        expected_version: u64,
        actor: &ActorId,
    ) -> Result<Commit> {
        let commit = self
            .inner
            .replace_grants(id, new_set, expected_version, actor)
            .await?;
        tokio::time::sleep(self.stall).await;
        Ok(commit)
    }
    async fn retire_role(
        &self,
        id: &RoleId,
        expected_version: u64,
        actor: &ActorId,
    ) -> Result<Commit> {
        self.inner.retire_role(id, expected_version, actor).await
    }
    async fn audit_log(&self, id: &RoleId) -> Result<Vec<AuditEntry>> {
        self.inner.audit_log(id).await
    }
}
