//! In-memory role store.
//!
//! # Locking
//! The role index sits behind one `RwLock` that is only write-locked briefly to
//! reserve or add a role; journal writes happen outside it. Each role record has its own `Mutex`; mutations lock just that record,
//! so edits to unrelated roles never wait on each other. Version checks happen
//! under the record lock, which serializes competing edits of the same role.
//!
//! # Durability
//! With a [`FileJournal`](crate::FileJournal) the new record is persisted
//! before it replaces the in-memory copy. A failed write abandons the mutation
//! with nothing changed. The journal rejects a write whose version does not
//! follow the stored one, which catches another store sharing the directory;
//! the in-memory copy is then refreshed from disk. With the default [`NullJournal`] all state is lost on
//! restart.

use async_trait::async_trait;
use chrono::Utc;
use rolegate_core::{
    ActorId, AuditAction, AuditEntry, EffectiveGrants, Error, Grant, GrantDiff, NewRole,
    PermissionCatalog, PermissionSet, Result, Role, RoleId,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::bus::{InvalidationBus, InvalidationEvent};
use crate::journal::{NullJournal, RoleJournal, RoleRecord};
use crate::store::{Commit, RoleStore};

#[derive(Default)]
struct RoleIndex {
    records: HashMap<RoleId, Arc<Mutex<RoleRecord>>>,
    names: HashSet<String>,
    /// Ids reserved by a create whose journal write is in flight
    pending: HashSet<RoleId>,
}

/// Role store holding every record in memory.
pub struct InMemoryRoleStore {
    catalog: Arc<PermissionCatalog>,
    bus: Arc<dyn InvalidationBus>,
    journal: Arc<dyn RoleJournal>,
    index: RwLock<RoleIndex>,
}

impl InMemoryRoleStore {
    /// Creates an empty, non-durable store.
    pub fn new(catalog: Arc<PermissionCatalog>, bus: Arc<dyn InvalidationBus>) -> Self {
        Self {
            catalog,
            bus,
            journal: Arc::new(NullJournal),
            index: RwLock::new(RoleIndex::default()),
        }
    }

    /// Opens a store backed by `journal`, loading every persisted record.
    ///
    /// Fails if a persisted grant references a key the catalog does not know:
    /// the catalog is append-only, so that means the wrong catalog was loaded.
    pub async fn open(
        catalog: Arc<PermissionCatalog>,
        bus: Arc<dyn InvalidationBus>,
        journal: Arc<dyn RoleJournal>,
    ) -> Result<Self> {
        let mut index = RoleIndex::default();
        for record in journal.load().await? {
            let unknown = catalog.unknown_keys(record.grants.iter().map(|g| &g.key));
            if !unknown.is_empty() {
                return Err(Error::storage(format!(
                    "role '{}' references unregistered permissions: {}",
                    record.role.id,
                    unknown.join(", ")
                )));
            }
            index.names.insert(record.role.name.clone());
            index
                .records
                .insert(record.role.id.clone(), Arc::new(Mutex::new(record)));
        }
        tracing::info!(roles = index.records.len(), "Opened role store");
        Ok(Self {
            catalog,
            bus,
            journal,
            index: RwLock::new(index),
        })
    }

    async fn record(&self, id: &RoleId) -> Result<Arc<Mutex<RoleRecord>>> {
        self.index
            .read()
            .await
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| Error::role_not_found(id.as_str()))
    }

    async fn all_records(&self) -> Vec<Arc<Mutex<RoleRecord>>> {
        self.index.read().await.records.values().cloned().collect()
    }

    fn effective(&self, record: &RoleRecord) -> EffectiveGrants {
        let permissions = if record.role.is_system {
            self.catalog.keys()
        } else {
            record.grant_keys()
        };
        let grants = EffectiveGrants::new(record.role.version, permissions);
        if record.role.retired {
            grants.retired()
        } else {
            grants
        }
    }

    async fn publish(&self, role: &Role) {
        let event = InvalidationEvent {
            role_id: role.id.clone(),
            version: role.version,
        };
        // The commit already happened; caches that miss this catch up on
        // their periodic resync.
        if let Err(e) = self.bus.publish(event).await {
            tracing::warn!(role_id = %role.id, version = role.version, error = %e, "Failed to publish invalidation");
        }
    }

    fn check_mutable(role: &Role) -> Result<()> {
        if role.is_system {
            return Err(Error::ImmutableRole {
                id: role.id.to_string(),
            });
        }
        if role.retired {
            return Err(Error::RoleRetired {
                id: role.id.to_string(),
            });
        }
        Ok(())
    }

    /// Persists `next` as the successor of `current`. When the journal holds a
    /// newer record than `current`, `current` is refreshed from it and the
    /// conflict is returned.
    async fn persist_next(&self, current: &mut RoleRecord, next: &RoleRecord) -> Result<()> {
        let err = match self.journal.persist(next).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_conflict() => e,
            Err(e) => return Err(e),
        };
        if let Some(stored) = self.journal.load_one(&next.role.id).await? {
            tracing::warn!(
                role_id = %next.role.id,
                cached = current.role.version,
                stored = stored.role.version,
                "Journal holds a newer record; refreshed in-memory copy"
            );
            *current = stored;
        }
        Err(err)
    }

    async fn release_reservation(&self, id: &RoleId, name: &str) {
        let mut index = self.index.write().await;
        index.pending.remove(id);
        index.names.remove(name);
    }

    fn check_version(role: &Role, expected_version: u64) -> Result<()> {
        if role.version != expected_version {
            return Err(Error::VersionConflict {
                id: role.id.to_string(),
                expected: expected_version,
                actual: role.version,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    fn catalog(&self) -> &Arc<PermissionCatalog> {
        &self.catalog
    }

    async fn create_role(&self, new: NewRole, actor: &ActorId) -> Result<Role> {
        self.catalog.validate(&new.grants)?;

        {
            let mut index = self.index.write().await;
            if index.records.contains_key(&new.id) || index.pending.contains(&new.id) {
                return Err(Error::DuplicateRole {
                    field: "id",
                    value: new.id.to_string(),
                });
            }
            if index.names.contains(&new.name) {
                return Err(Error::DuplicateRole {
                    field: "name",
                    value: new.name,
                });
            }
            index.pending.insert(new.id.clone());
            index.names.insert(new.name.clone());
        }

        let now = Utc::now();
        let role = Role {
            id: new.id.clone(),
            name: new.name.clone(),
            is_system: new.is_system,
            version: 1,
            retired: false,
            created_at: now,
        };
        let grants = new
            .grants
            .iter()
            .map(|key| Grant {
                role_id: new.id.clone(),
                key: key.clone(),
                granted_at: now,
                granted_by: actor.clone(),
            })
            .collect();
        let audit = AuditEntry {
            role_id: new.id.clone(),
            action: AuditAction::RoleCreated,
            actor: actor.clone(),
            at: now,
            version: 1,
            diff: GrantDiff::between(&PermissionSet::new(), &new.grants),
        };
        let record = RoleRecord {
            role: role.clone(),
            grants,
            audit: vec![audit],
        };

        if let Err(e) = self.journal.persist(&record).await {
            self.release_reservation(&new.id, &new.name).await;
            return Err(e);
        }
        {
            let mut index = self.index.write().await;
            index.pending.remove(&new.id);
            index
                .records
                .insert(new.id, Arc::new(Mutex::new(record)));
        }

        tracing::info!(role_id = %role.id, actor = %actor, system = role.is_system, "Created role");
        self.publish(&role).await;
        Ok(role)
    }

    async fn get_role(&self, id: &RoleId) -> Result<Role> {
        let record = self.record(id).await?;
        let guard = record.lock().await;
        Ok(guard.role.clone())
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let mut roles = Vec::new();
        for record in self.all_records().await {
            roles.push(record.lock().await.role.clone());
        }
        roles.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(roles)
    }

    async fn get_grants(&self, id: &RoleId) -> Result<PermissionSet> {
        let record = self.record(id).await?;
        let guard = record.lock().await;
        if guard.role.is_system {
            return Ok(self.catalog.keys());
        }
        Ok(guard.grant_keys())
    }

    async fn grant_rows(&self, id: &RoleId) -> Result<Vec<Grant>> {
        let record = self.record(id).await?;
        let guard = record.lock().await;
        Ok(guard.grants.clone())
    }

    async fn effective_grants(&self, id: &RoleId) -> Result<EffectiveGrants> {
        let record = self.record(id).await?;
        let guard = record.lock().await;
        Ok(self.effective(&guard))
    }

    async fn load_all(&self) -> Result<Vec<(RoleId, EffectiveGrants)>> {
        let mut all = Vec::new();
        for record in self.all_records().await {
            let guard = record.lock().await;
            all.push((guard.role.id.clone(), self.effective(&guard)));
        }
        Ok(all)
    }

    async fn replace_grants(
        &self,
        id: &RoleId,
        new_set: PermissionSet,
        expected_version: u64,
        actor: &ActorId,
    ) -> Result<Commit> {
        let record = self.record(id).await?;
        let mut guard = record.lock().await;

        // System roles are rejected whatever version was presented.
        Self::check_mutable(&guard.role)?;
        self.catalog.validate(&new_set)?;
        Self::check_version(&guard.role, expected_version)?;

        let now = Utc::now();
        let old_set = guard.grant_keys();
        let diff = GrantDiff::between(&old_set, &new_set);

        let mut next = guard.clone();
        next.grants = new_set
            .iter()
            .map(|key| {
                guard
                    .grants
                    .iter()
                    .find(|g| &g.key == key)
                    .cloned()
                    .unwrap_or_else(|| Grant {
                        role_id: id.clone(),
                        key: key.clone(),
                        granted_at: now,
                        granted_by: actor.clone(),
                    })
            })
            .collect();
        next.role.version += 1;
        let audit = AuditEntry {
            role_id: id.clone(),
            action: AuditAction::GrantsReplaced,
            actor: actor.clone(),
            at: now,
            version: next.role.version,
            diff,
        };
        next.audit.push(audit.clone());

        self.persist_next(&mut guard, &next).await?;
        *guard = next;
        let role = guard.role.clone();
        drop(guard);

        tracing::info!(
            role_id = %id,
            version = role.version,
            actor = %actor,
            added = audit.diff.added.len(),
            removed = audit.diff.removed.len(),
            "Replaced grants"
        );
        self.publish(&role).await;
        Ok(Commit { role, audit })
    }

    async fn retire_role(
        &self,
        id: &RoleId,
        expected_version: u64,
        actor: &ActorId,
    ) -> Result<Commit> {
        let record = self.record(id).await?;
        let mut guard = record.lock().await;
        Self::check_mutable(&guard.role)?;
        Self::check_version(&guard.role, expected_version)?;

        let mut next = guard.clone();
        next.grants.clear();
        next.role.retired = true;
        next.role.version += 1;
        let audit = AuditEntry {
            role_id: id.clone(),
            action: AuditAction::RoleRetired,
            actor: actor.clone(),
            at: Utc::now(),
            version: next.role.version,
            diff: GrantDiff::between(&guard.grant_keys(), &PermissionSet::new()),
        };
        next.audit.push(audit.clone());

        self.persist_next(&mut guard, &next).await?;
        *guard = next;
        let role = guard.role.clone();
        drop(guard);

        tracing::info!(role_id = %id, version = role.version, actor = %actor, "Retired role");
        self.publish(&role).await;
        Ok(Commit { role, audit })
    }

    async fn audit_log(&self, id: &RoleId) -> Result<Vec<AuditEntry>> {
        let record = self.record(id).await?;
        let guard = record.lock().await;
        Ok(guard.audit.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
