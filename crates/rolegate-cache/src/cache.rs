//! The snapshot cache.
//!
//! Readers load the current [`Snapshot`] through an `ArcSwap`: one atomic
//! pointer read, no lock, and the snapshot they hold stays internally
//! consistent however long they keep it. Writers (the refresher, or callers of
//! [`SnapshotCache::refresh_role`]) derive a successor snapshot and swap it in
//! with a compare-and-swap loop.
//!
//! An entry is never replaced by one with a lower version, so events that
//! arrive out of order or a resync racing a targeted refresh cannot roll a
//! role back.

use arc_swap::ArcSwap;
use backon::{ExponentialBuilder, Retryable};
use rolegate_core::config::CacheConfig;
use rolegate_core::{
    AccessDecision, AccessEvaluator, AccessMode, EffectiveGrants, Error, Identity, PermissionSet,
    Result, RoleId,
};
use rolegate_store::RoleStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::health::{CacheHealth, CacheState};
use crate::snapshot::Snapshot;

/// Process-local cache of every role's effective grants.
pub struct SnapshotCache {
    store: Arc<dyn RoleStore>,
    config: CacheConfig,
    current: ArcSwap<Snapshot>,
    generation: watch::Sender<u64>,
    health: CacheHealth,
    /// When the last full load or resync succeeded
    synced_at: ArcSwap<Instant>,
    bus_connected: AtomicBool,
}

impl SnapshotCache {
    /// Creates an empty cache in the loading state.
    ///
    /// Until [`load`](Self::load) succeeds every evaluation is a denial.
    pub fn new(store: Arc<dyn RoleStore>, config: CacheConfig) -> Arc<Self> {
        let (generation, _rx) = watch::channel(0);
        Arc::new(Self {
            store,
            config,
            current: ArcSwap::from_pointee(Snapshot::default()),
            generation,
            health: CacheHealth::new(),
            synced_at: ArcSwap::from_pointee(Instant::now()),
            bus_connected: AtomicBool::new(true),
        })
    }

    /// Creates a cache and performs the initial full load.
    pub async fn open(store: Arc<dyn RoleStore>, config: CacheConfig) -> Result<Arc<Self>> {
        let cache = Self::new(store, config);
        cache.load().await?;
        Ok(cache)
    }

    /// Full load from the store, retried on transient errors.
    ///
    /// On success the cache becomes ready; on failure it is marked failed and
    /// keeps denying.
    pub async fn load(&self) -> Result<()> {
        match self.fetch_all().await {
            Ok(entries) => {
                let count = entries.len();
                self.apply(|current| {
                    Some(Snapshot::from_entries(
                        current.generation() + 1,
                        entries.clone(),
                    ))
                });
                self.synced_at.store(Arc::new(Instant::now()));
                self.health.set_state(CacheState::Ready);
                tracing::info!(roles = count, "Snapshot cache loaded");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Initial snapshot load failed");
                self.health.set_state(CacheState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Health handle.
    pub fn health(&self) -> &CacheHealth {
        &self.health
    }

    /// Tuning in effect.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Time since the last successful full load or resync.
    pub fn stale_for(&self) -> Duration {
        self.synced_at.load().elapsed()
    }

    /// Records that the invalidation stream ended.
    ///
    /// Every cached role is marked stale and the cache reports degraded until
    /// [`bus_reconnected`](Self::bus_reconnected) is called and a later
    /// resync succeeds. Decisions keep being served from the stale snapshot.
    pub fn bus_disconnected(&self) {
        self.bus_connected.store(false, Ordering::SeqCst);
        self.apply(|current| current.with_all_stale(Instant::now()));
        self.health.set_state(CacheState::Degraded(
            "invalidation bus disconnected".to_string(),
        ));
    }

    /// Records that a fresh invalidation subscription is open.
    pub fn bus_reconnected(&self) {
        self.bus_connected.store(true, Ordering::SeqCst);
    }

    /// Returns `false` between [`bus_disconnected`](Self::bus_disconnected)
    /// and [`bus_reconnected`](Self::bus_reconnected).
    pub fn is_bus_connected(&self) -> bool {
        self.bus_connected.load(Ordering::SeqCst)
    }

    /// Re-reads one role and installs it if newer than the cached entry.
    ///
    /// A role the store no longer knows is dropped. If the store stays
    /// unreachable after all retries the cached entry is kept, marked stale,
    /// and the cache reports degraded until a later refresh succeeds.
    pub async fn refresh_role(&self, role_id: &RoleId) -> Result<()> {
        let fetched = (|| async { self.store.effective_grants(role_id).await })
            .retry(self.backoff())
            .when(Error::is_retryable)
            .notify(|e: &Error, after: Duration| {
                tracing::debug!(
                    role_id = %role_id,
                    error = %e,
                    retry_in_ms = after.as_millis() as u64,
                    "Retrying role refresh"
                );
            })
            .await;

        match fetched {
            Ok(grants) => {
                let version = grants.version;
                if self.apply(|current| current.with_role(role_id, grants.clone())) {
                    tracing::debug!(role_id = %role_id, version, "Refreshed cached role");
                }
                self.settle_health();
                Ok(())
            }
            Err(Error::NotFound { .. }) => {
                if self.apply(|current| current.without_role(role_id)) {
                    tracing::info!(role_id = %role_id, "Dropped role missing from store");
                }
                self.settle_health();
                Ok(())
            }
            Err(e) => {
                let now = Instant::now();
                self.apply(|current| current.with_stale(role_id, now));
                self.report_stale(&e);
                Err(e)
            }
        }
    }

    /// Re-reads every role and installs whatever is newer than the cache.
    ///
    /// Used after the bus reports lost events and on the periodic resync tick.
    /// Returns how many roles changed.
    pub async fn resync(&self) -> Result<usize> {
        let entries = match self.fetch_all().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    stale_for_ms = self.stale_for().as_millis() as u64,
                    "Snapshot resync failed"
                );
                self.health
                    .set_state(CacheState::Degraded(format!("resync failed: {e}")));
                return Err(e);
            }
        };

        let mut changed = 0;
        self.apply(|current| {
            let (next, n) = reconciled(current, &entries);
            changed = n;
            next
        });
        self.synced_at.store(Arc::new(Instant::now()));
        if !self.is_bus_connected() {
            // Events may still be missed until the bus is back.
            let now = Instant::now();
            self.apply(|current| current.with_all_stale(now));
        }
        if changed > 0 {
            tracing::info!(changed, "Snapshot resync installed newer grants");
        }
        self.settle_health();
        Ok(changed)
    }

    /// Waits until the cached version of `role_id` reaches `min_version`.
    ///
    /// Lets a caller that just committed an edit observe its own write.
    pub async fn wait_for_version(
        &self,
        role_id: &RoleId,
        min_version: u64,
        timeout: Duration,
    ) -> Result<()> {
        let mut rx = self.generation.subscribe();
        let reached = tokio::time::timeout(timeout, async {
            loop {
                let cached = self.current.load().version_of(role_id);
                if cached.is_some_and(|v| v >= min_version) {
                    return;
                }
                if rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        })
        .await;

        reached.map_err(|_| Error::Timeout {
            operation: "wait for cache refresh",
            millis: timeout.as_millis() as u64,
        })
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.config.retry_min_delay())
            .with_max_delay(self.config.retry_max_delay())
            .with_max_times(self.config.refresh_attempts.saturating_sub(1))
    }

    async fn fetch_all(&self) -> Result<Vec<(RoleId, EffectiveGrants)>> {
        (|| async { self.store.load_all().await })
            .retry(self.backoff())
            .when(Error::is_retryable)
            .notify(|e: &Error, after: Duration| {
                tracing::debug!(
                    error = %e,
                    retry_in_ms = after.as_millis() as u64,
                    "Retrying full load"
                );
            })
            .await
    }

    /// Swaps in `change(current)` unless it returns `None`. Returns whether a
    /// new snapshot was published.
    fn apply<F>(&self, mut change: F) -> bool
    where
        F: FnMut(&Snapshot) -> Option<Snapshot>,
    {
        let mut applied = false;
        self.current.rcu(|current| match change(&**current) {
            Some(next) => {
                applied = true;
                Arc::new(next)
            }
            None => {
                applied = false;
                Arc::clone(current)
            }
        });
        if applied {
            self.generation
                .send_replace(self.current.load().generation());
        }
        applied
    }

    fn report_stale(&self, error: &Error) {
        let stale = self.current.load().stale_roles();
        for (role_id, age) in &stale {
            tracing::warn!(
                role_id = %role_id,
                stale_for_ms = age.as_millis() as u64,
                error = %error,
                "Serving stale grants"
            );
        }
        self.health.set_state(CacheState::Degraded(format!(
            "{} stale role(s)",
            stale.len()
        )));
    }

    fn settle_health(&self) {
        if matches!(self.health.state(), CacheState::Degraded(_))
            && self.is_bus_connected()
            && !self.current.load().has_stale()
        {
            self.health.set_state(CacheState::Ready);
        }
    }
}

impl AccessEvaluator for SnapshotCache {
    fn evaluate(
        &self,
        identity: Option<&Identity>,
        required: &PermissionSet,
        mode: AccessMode,
    ) -> AccessDecision {
        let snapshot = self.current.load();
        rolegate_core::evaluate(&**snapshot, identity, required, mode)
    }
}

/// Merges a full load into `current`, never lowering a version.
///
/// Roles absent from the load are kept: a role created after the load
/// started may already have been installed by its own event.
fn reconciled(
    current: &Snapshot,
    entries: &[(RoleId, EffectiveGrants)],
) -> (Option<Snapshot>, usize) {
    let mut next: Option<Snapshot> = None;
    let mut changed = 0;
    for (role_id, grants) in entries {
        let base = next.as_ref().unwrap_or(current);
        if let Some(updated) = base.with_role(role_id, grants.clone()) {
            if base.version_of(role_id) != Some(grants.version) {
                changed += 1;
            }
            next = Some(updated);
        }
    }
    (next, changed)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rolegate_core::{
        ActorId, AuditEntry, Grant, NewRole, PermissionCatalog, PermissionKey, Role,
    };
    use rolegate_store::{Commit, InMemoryRoleStore, LocalBus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(k: &str) -> PermissionKey {
        PermissionKey::parse(k).unwrap()
    }

    fn id(s: &str) -> RoleId {
        RoleId::parse(s).unwrap()
    }

    fn set(keys: &[&str]) -> PermissionSet {
        keys.iter().map(|k| key(k)).collect()
    }

    fn fast_config() -> CacheConfig {
        CacheConfig {
            refresh_attempts: 3,
            retry_min_delay_ms: 1,
            retry_max_delay_ms: 5,
            resync_interval_secs: 1,
            ready_timeout_ms: 500,
        }
    }

    /// Store wrapper whose reads fail while `failures` is non-zero.
    struct FlakyStore {
        inner: InMemoryRoleStore,
        failures: AtomicUsize,
    }

    impl FlakyStore {
        fn fail_next(&self, n: usize) {
            self.failures.store(n, Ordering::SeqCst);
        }

        fn trip(&self) -> Result<()> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(Error::storage("connection reset"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RoleStore for FlakyStore {
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
            self.trip()?;
            self.inner.effective_grants(id).await
        }
        async fn load_all(&self) -> Result<Vec<(RoleId, EffectiveGrants)>> {
            self.trip()?;
            self.inner.load_all().await
        }
        async fn replace_grants(
            &self,
            id: &RoleId,
            new_set: PermissionSet,
            expected_version: u64,
            actor: &ActorId,
        ) -> Result<Commit> {
            self.inner
                .replace_grants(id, new_set, expected_version, actor)
                .await
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

    async fn flaky_store() -> Arc<FlakyStore> {
        let mut catalog = PermissionCatalog::new();
        catalog.register("view_grades", "grades", "Read grades").unwrap();
        catalog.register("edit_grades", "grades", "Edit grades").unwrap();
        let inner = InMemoryRoleStore::new(Arc::new(catalog), Arc::new(LocalBus::default()));
        inner
            .create_role(
                NewRole::new(id("teacher"), "Teacher").with_grants([key("view_grades")]),
                &ActorId::bootstrap(),
            )
            .await
            .unwrap();
        inner
            .create_role(NewRole::new(id("super_admin"), "Super Admin").system(), &ActorId::bootstrap())
            .await
            .unwrap();
        Arc::new(FlakyStore {
            inner,
            failures: AtomicUsize::new(0),
        })
    }

    fn alice() -> Identity {
        Identity::new("alice", id("teacher"))
    }

    #[tokio::test]
    async fn test_denies_until_loaded() {
        let store = flaky_store().await;
        let cache = SnapshotCache::new(store, fast_config());
        assert_eq!(cache.health().state(), CacheState::Loading);

        let decision = cache.evaluate(Some(&alice()), &set(&["view_grades"]), AccessMode::All);
        assert!(!decision.allowed);

        cache.load().await.unwrap();
        let decision = cache.evaluate(Some(&alice()), &set(&["view_grades"]), AccessMode::All);
        assert!(decision.allowed);
        assert!(cache.health().state().is_ready());
    }

    #[tokio::test]
    async fn test_load_retries_transient_failures() {
        let store = flaky_store().await;
        store.fail_next(2);
        let cache = SnapshotCache::open(store, fast_config()).await.unwrap();
        assert_eq!(cache.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_load_failure_marks_failed() {
        let store = flaky_store().await;
        store.fail_next(10);
        let cache = SnapshotCache::new(store, fast_config());
        assert!(cache.load().await.is_err());
        assert!(matches!(cache.health().state(), CacheState::Failed(_)));
    }

    #[tokio::test]
    async fn test_system_role_holds_whole_catalog() {
        let store = flaky_store().await;
        let cache = SnapshotCache::open(store, fast_config()).await.unwrap();
        let root = Identity::new("root", id("super_admin"));
        let decision = cache.evaluate(
            Some(&root),
            &set(&["view_grades", "edit_grades"]),
            AccessMode::All,
        );
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_refresh_installs_newer_version() {
        let store = flaky_store().await;
        let cache = SnapshotCache::open(store.clone(), fast_config()).await.unwrap();

        store
            .replace_grants(&id("teacher"), set(&["edit_grades"]), 1, &ActorId::new("admin"))
            .await
            .unwrap();
        let before = cache.snapshot();
        cache.refresh_role(&id("teacher")).await.unwrap();

        let decision = cache.evaluate(Some(&alice()), &set(&["edit_grades"]), AccessMode::All);
        assert!(decision.allowed);
        assert_eq!(decision.evaluated_against_version, 2);
        // A snapshot taken earlier is unaffected.
        assert_eq!(before.version_of(&id("teacher")), Some(1));
    }

    #[tokio::test]
    async fn test_exhausted_retries_mark_stale_then_recover() {
        let store = flaky_store().await;
        let cache = SnapshotCache::open(store.clone(), fast_config()).await.unwrap();

        store
            .replace_grants(&id("teacher"), set(&["edit_grades"]), 1, &ActorId::new("admin"))
            .await
            .unwrap();
        store.fail_next(3);
        let err = cache.refresh_role(&id("teacher")).await.unwrap_err();
        assert!(err.is_retryable());

        // Still serving the last good version.
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.version_of(&id("teacher")), Some(1));
        assert_eq!(snapshot.stale_roles().len(), 1);
        assert!(matches!(cache.health().state(), CacheState::Degraded(_)));

        assert_eq!(cache.resync().await.unwrap(), 1);
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.version_of(&id("teacher")), Some(2));
        assert!(!snapshot.has_stale());
        assert!(cache.health().state().is_ready());
    }

    #[tokio::test]
    async fn test_refresh_of_removed_role_drops_it() {
        let store = flaky_store().await;
        let cache = SnapshotCache::open(store, fast_config()).await.unwrap();
        cache.refresh_role(&id("ghost")).await.unwrap();
        assert!(cache.snapshot().get(&id("ghost")).is_none());
        assert_eq!(cache.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_resync_never_lowers_versions() {
        let store = flaky_store().await;
        let cache = SnapshotCache::open(store, fast_config()).await.unwrap();
        let newer = EffectiveGrants::new(9, set(&[]));
        cache.apply(|current| current.with_role(&id("teacher"), newer.clone()));

        assert_eq!(cache.resync().await.unwrap(), 0);
        assert_eq!(cache.snapshot().version_of(&id("teacher")), Some(9));
    }

    #[tokio::test]
    async fn test_wait_for_version() {
        let store = flaky_store().await;
        let cache = SnapshotCache::open(store.clone(), fast_config()).await.unwrap();

        cache
            .wait_for_version(&id("teacher"), 1, Duration::from_millis(10))
            .await
            .unwrap();
        let err = cache
            .wait_for_version(&id("teacher"), 2, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));

        store
            .replace_grants(&id("teacher"), set(&[]), 1, &ActorId::new("admin"))
            .await
            .unwrap();
        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .wait_for_version(&id("teacher"), 2, Duration::from_secs(2))
                    .await
            })
        };
        cache.refresh_role(&id("teacher")).await.unwrap();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failed_resync_keeps_stale_age() {
        let store = flaky_store().await;
        let cache = SnapshotCache::open(store.clone(), fast_config()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        store.fail_next(3);
        assert!(cache.resync().await.is_err());
        assert!(cache.stale_for() >= Duration::from_millis(20));
        assert!(matches!(cache.health().state(), CacheState::Degraded(_)));

        cache.resync().await.unwrap();
        assert!(cache.stale_for() < Duration::from_millis(20));
        assert!(cache.health().state().is_ready());
    }

    #[tokio::test]
    async fn test_bus_disconnect_marks_every_role_stale() {
        let store = flaky_store().await;
        let cache = SnapshotCache::open(store, fast_config()).await.unwrap();

        cache.bus_disconnected();
        assert!(!cache.is_bus_connected());
        assert_eq!(cache.snapshot().stale_roles().len(), 2);
        assert_eq!(
            cache.health().state(),
            CacheState::Degraded("invalidation bus disconnected".into())
        );
        // Decisions are still served from the last snapshot.
        let decision = cache.evaluate(Some(&alice()), &set(&["view_grades"]), AccessMode::All);
        assert!(decision.allowed);

        // A resync alone cannot vouch for freshness while events are missed.
        cache.resync().await.unwrap();
        assert_eq!(cache.snapshot().stale_roles().len(), 2);
        assert!(!cache.health().state().is_ready());

        cache.bus_reconnected();
        cache.resync().await.unwrap();
        assert!(!cache.snapshot().has_stale());
        assert!(cache.health().state().is_ready());
    }
}
