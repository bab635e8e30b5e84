//! Grant evaluation.
//!
//! [`evaluate`] is a pure function over a [`GrantLookup`]: no I/O, no locks, no
//! failure path. Anything it cannot resolve (missing identity, unknown or
//! retired role) is a denial.

use std::collections::{BTreeMap, HashMap};

use crate::types::{
    AccessDecision, AccessMode, EffectiveGrants, Identity, PermissionKey, PermissionSet, RoleId,
};

/// Read-only view of role → effective grants.
pub trait GrantLookup {
    /// Returns the effective grants for `role_id`, if the role is known.
    fn lookup(&self, role_id: &RoleId) -> Option<&EffectiveGrants>;
}

impl GrantLookup for HashMap<RoleId, EffectiveGrants> {
    fn lookup(&self, role_id: &RoleId) -> Option<&EffectiveGrants> {
        self.get(role_id)
    }
}

impl GrantLookup for BTreeMap<RoleId, EffectiveGrants> {
    fn lookup(&self, role_id: &RoleId) -> Option<&EffectiveGrants> {
        self.get(role_id)
    }
}

/// Something that can make access decisions, typically a snapshot cache.
///
/// Implementations must never fail: an unavailable or partial view yields
/// denials.
pub trait AccessEvaluator: Send + Sync {
    /// Decides whether `identity` satisfies `required` under `mode`.
    fn evaluate(
        &self,
        identity: Option<&Identity>,
        required: &PermissionSet,
        mode: AccessMode,
    ) -> AccessDecision;
}

/// Decides whether `identity` satisfies `required` under `mode`.
///
/// The held set is the role's effective grants plus the identity's overrides.
/// `missing` is always the ALL-semantics shortfall so callers can tell the
/// user exactly what else they would need, whatever the mode.
///
/// An empty requirement is satisfied by any resolvable identity.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use rolegate_core::{evaluate, AccessMode, EffectiveGrants, Identity, PermissionKey, RoleId};
///
/// let teacher = RoleId::parse("teacher").unwrap();
/// let view = PermissionKey::parse("view_grades").unwrap();
/// let mut grants = HashMap::new();
/// grants.insert(teacher.clone(), EffectiveGrants::new(1, [view.clone()].into()));
///
/// let identity = Identity::new("alice", teacher);
/// let decision = evaluate(&grants, Some(&identity), &[view].into(), AccessMode::All);
/// assert!(decision.allowed);
/// assert_eq!(decision.evaluated_against_version, 1);
/// ```
pub fn evaluate<L: GrantLookup + ?Sized>(
    grants: &L,
    identity: Option<&Identity>,
    required: &PermissionSet,
    mode: AccessMode,
) -> AccessDecision {
    let Some(identity) = identity else {
        return AccessDecision::deny_all(required);
    };
    let Some(entry) = grants.lookup(&identity.role_id) else {
        return AccessDecision::deny_all(required);
    };
    if entry.retired {
        return AccessDecision {
            evaluated_against_version: entry.version,
            ..AccessDecision::deny_all(required)
        };
    }

    let holds = |key: &PermissionKey| {
        entry.permissions.contains(key) || identity.overrides.contains(key)
    };
    let missing: PermissionSet = required.iter().filter(|k| !holds(*k)).cloned().collect();

    let allowed = match mode {
        AccessMode::All => missing.is_empty(),
        AccessMode::Any => required.is_empty() || missing.len() < required.len(),
    };

    AccessDecision {
        allowed,
        missing,
        evaluated_against_version: entry.version,
    }
}

// ============================================================================
// Tests
// ============================================================================
