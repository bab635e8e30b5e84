//! Audit records for role mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{ActorId, PermissionSet, RoleId};

/// What kind of mutation an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Role created with its initial grants
    RoleCreated,
    /// Grant set replaced
    GrantsReplaced,
    /// Role soft-retired
    RoleRetired,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditAction::RoleCreated => "role_created",
            AuditAction::GrantsReplaced => "grants_replaced",
            AuditAction::RoleRetired => "role_retired",
        };
        f.pad(s)
    }
}

/// Added and removed keys between two grant sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantDiff {
    /// Keys present only in the new set
    pub added: PermissionSet,
    /// Keys present only in the old set
    pub removed: PermissionSet,
}

impl GrantDiff {
    /// Computes the symmetric difference between `old` and `new`.
    pub fn between(old: &PermissionSet, new: &PermissionSet) -> Self {
        Self {
            added: new.difference(old).cloned().collect(),
            removed: old.difference(new).cloned().collect(),
        }
    }

    /// Returns `true` if the two sets were identical.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// One audit row, keyed by `(role_id, at)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Role that changed
    pub role_id: RoleId,
    /// Kind of change
    pub action: AuditAction,
    /// Who made the change
    pub actor: ActorId,
    /// When the change was committed
    pub at: DateTime<Utc>,
    /// Role version after the change
    pub version: u64,
    /// Grant changes
    #[serde(flatten)]
    pub diff: GrantDiff,
}
