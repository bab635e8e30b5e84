//! Caller identity as handed over by the identity provider.

use serde::{Deserialize, Serialize};

use crate::types::{PermissionKey, PermissionSet, RoleId};

/// An already-authenticated caller.
///
/// Carries exactly one role. Overrides only ever add permissions; there is no
/// way to revoke a role's grant for a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Subject identifier from the identity provider
    pub subject: String,
    /// The caller's role
    pub role_id: RoleId,
    /// Extra per-user permissions
    #[serde(default)]
    pub overrides: PermissionSet,
}

impl Identity {
    /// Creates an identity with no overrides.
    pub fn new(subject: impl Into<String>, role_id: RoleId) -> Self {
        Self {
            subject: subject.into(),
            role_id,
            overrides: PermissionSet::new(),
        }
    }

    /// Identity used for unauthenticated callers when an anonymous role is
    /// configured.
    pub fn anonymous(role_id: RoleId) -> Self {
        Self::new("anonymous", role_id)
    }

    /// Adds per-user override permissions.
    pub fn with_overrides(mut self, keys: impl IntoIterator<Item = PermissionKey>) -> Self {
        self.overrides.extend(keys);
        self
    }
}
