//! Permission, role and grant records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::types::{ActorId, PermissionKey, RoleId};

/// Set of permission keys, ordered for deterministic output.
pub type PermissionSet = BTreeSet<PermissionKey>;

/// A registered permission. Immutable once published in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Unique, stable key
    pub key: PermissionKey,
    /// Grouping label used for display
    pub category: String,
    /// Human-readable description
    pub description: String,
}

/// A named set of grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Unique, immutable id
    pub id: RoleId,
    /// Unique, human-readable name
    pub name: String,
    /// System roles hold every catalog permission and cannot be edited
    pub is_system: bool,
    /// Optimistic-concurrency token; bumped by exactly one per mutation
    pub version: u64,
    /// Soft-retired roles are kept for audit history but grant nothing
    #[serde(default)]
    pub retired: bool,
    /// When the role was created
    pub created_at: DateTime<Utc>,
}

/// Request to create a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRole {
    /// Id for the new role
    pub id: RoleId,
    /// Display name, unique across roles
    pub name: String,
    /// Whether this is a protected system role
    #[serde(default)]
    pub is_system: bool,
    /// Initial grants
    #[serde(default)]
    pub grants: PermissionSet,
}

impl NewRole {
    /// Creates a non-system role request with no grants.
    pub fn new(id: RoleId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_system: false,
            grants: PermissionSet::new(),
        }
    }

    /// Marks the role as a system role.
    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }

    /// Sets the initial grants.
    pub fn with_grants(mut self, grants: impl IntoIterator<Item = PermissionKey>) -> Self {
        self.grants = grants.into_iter().collect();
        self
    }
}

/// One role → permission association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Role holding the grant
    pub role_id: RoleId,
    /// Granted permission
    pub key: PermissionKey,
    /// When the key was first granted
    pub granted_at: DateTime<Utc>,
    /// Who granted it
    pub granted_by: ActorId,
}

/// A role's effective permissions as seen by the evaluator.
///
/// Cheap to clone: the permission set is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveGrants {
    /// Role version these grants were read at
    pub version: u64,
    /// Whether the role is retired
    pub retired: bool,
    /// Effective permission keys (full catalog for system roles)
    pub permissions: Arc<PermissionSet>,
}

impl EffectiveGrants {
    /// Creates an entry for an active role.
    pub fn new(version: u64, permissions: PermissionSet) -> Self {
        Self {
            version,
            retired: false,
            permissions: Arc::new(permissions),
        }
    }

    /// Marks the entry as belonging to a retired role.
    pub fn retired(mut self) -> Self {
        self.retired = true;
        self
    }
}
