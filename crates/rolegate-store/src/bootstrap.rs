//! Seeding configured roles into a store.

use rolegate_core::{ActorId, Error, NewRole, Result, RoleId};

use crate::store::RoleStore;

/// Creates each configured role that does not exist yet.
///
/// Existing roles are left untouched: configuration seeds a fresh store, it
/// never overwrites grants an administrator has since edited. Returns the ids
/// that were created.
pub async fn seed_roles<S>(store: &S, roles: &[NewRole]) -> Result<Vec<RoleId>>
where
    S: RoleStore + ?Sized,
{
    let actor = ActorId::bootstrap();
    let mut created = Vec::new();

    for role in roles {
        match store.get_role(&role.id).await {
            Ok(existing) => {
                if existing.is_system != role.is_system {
                    tracing::warn!(
                        role_id = %role.id,
                        stored = existing.is_system,
                        configured = role.is_system,
                        "Configured system flag differs from stored role; keeping stored"
                    );
                }
                continue;
            }
            Err(Error::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        store.create_role(role.clone(), &actor).await?;
        created.push(role.id.clone());
    }

    if !created.is_empty() {
        tracing::info!(count = created.len(), "Seeded roles from configuration");
    }
    Ok(created)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{InMemoryRoleStore, LocalBus};
    use rolegate_core::{AuditAction, PermissionCatalog, PermissionKey, PermissionSet};
    use std::sync::Arc;

    fn store() -> InMemoryRoleStore {
        let mut catalog = PermissionCatalog::new();
        catalog.register("view_grades", "grades", "Read grades").unwrap();
        InMemoryRoleStore::new(Arc::new(catalog), Arc::new(LocalBus::default()))
    }

    fn roles() -> Vec<NewRole> {
        vec![
            NewRole::new(RoleId::parse("super_admin").unwrap(), "Super Admin").system(),
            NewRole::new(RoleId::parse("teacher").unwrap(), "Teacher")
                .with_grants([PermissionKey::parse("view_grades").unwrap()]),
        ]
    }

    #[tokio::test]
    async fn test_seed_creates_missing_roles() {
        let store = store();
        let created = seed_roles(&store, &roles()).await.unwrap();
        assert_eq!(created.len(), 2);

        let teacher = RoleId::parse("teacher").unwrap();
        let log = store.audit_log(&teacher).await.unwrap();
        assert_eq!(log[0].action, AuditAction::RoleCreated);
        assert_eq!(log[0].actor, ActorId::bootstrap());
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let store = store();
        seed_roles(&store, &roles()).await.unwrap();

        let teacher = RoleId::parse("teacher").unwrap();
        store
            .replace_grants(&teacher, PermissionSet::new(), 1, &ActorId::new("admin"))
            .await
            .unwrap();

        let created = seed_roles(&store, &roles()).await.unwrap();
        assert!(created.is_empty());
        // The administrator's edit survives a re-seed.
        assert!(store.get_grants(&teacher).await.unwrap().is_empty());
        assert_eq!(store.get_role(&teacher).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_seed_rejects_unknown_grants() {
        let store = store();
        let bad = vec![
            NewRole::new(RoleId::parse("teacher").unwrap(), "Teacher")
                .with_grants([PermissionKey::parse("edit_grades").unwrap()]),
        ];
        let err = seed_roles(&store, &bad).await.unwrap_err();
        assert!(matches!(err, Error::UnknownPermission { .. }));
    }
}
