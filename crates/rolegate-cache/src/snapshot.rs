//! Immutable grant snapshots.
//!
//! A [`Snapshot`] is never mutated once published. Updates build a new
//! snapshot from the old one; `im::HashMap` shares structure between the two,
//! so replacing one role costs O(log n) rather than a full copy.

use rolegate_core::{EffectiveGrants, GrantLookup, RoleId};
use std::time::{Duration, Instant};

/// Point-in-time view of every role's effective grants.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    generation: u64,
    roles: im::HashMap<RoleId, EffectiveGrants>,
    stale: im::HashMap<RoleId, Instant>,
}

impl Snapshot {
    /// Builds a snapshot from a full store load.
    pub fn from_entries(
        generation: u64,
        entries: impl IntoIterator<Item = (RoleId, EffectiveGrants)>,
    ) -> Self {
        Self {
            generation,
            roles: entries.into_iter().collect(),
            stale: im::HashMap::new(),
        }
    }

    /// Monotonic counter bumped by every published change.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Entry for a role.
    pub fn get(&self, role_id: &RoleId) -> Option<&EffectiveGrants> {
        self.roles.get(role_id)
    }

    /// Cached version of a role.
    pub fn version_of(&self, role_id: &RoleId) -> Option<u64> {
        self.roles.get(role_id).map(|g| g.version)
    }

    /// Number of cached roles.
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Returns `true` if no roles are cached.
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Roles whose last refresh failed, with how long they have been stale.
    pub fn stale_roles(&self) -> Vec<(RoleId, Duration)> {
        let mut stale: Vec<_> = self
            .stale
            .iter()
            .map(|(id, since)| (id.clone(), since.elapsed()))
            .collect();
        stale.sort_by(|a, b| a.0.cmp(&b.0));
        stale
    }

    /// Returns `true` if any role is marked stale.
    pub fn has_stale(&self) -> bool {
        !self.stale.is_empty()
    }

    /// Successor with `grants` installed for `role_id`, or `None` if the
    /// snapshot already holds that version or a newer one.
    pub(crate) fn with_role(&self, role_id: &RoleId, grants: EffectiveGrants) -> Option<Self> {
        if let Some(current) = self.roles.get(role_id)
            && current.version >= grants.version
        {
            if self.stale.contains_key(role_id) {
                // Already current; only the stale marker needs clearing.
                return Some(self.successor(|next| {
                    next.stale.remove(role_id);
                }));
            }
            return None;
        }
        Some(self.successor(|next| {
            next.roles.insert(role_id.clone(), grants);
            next.stale.remove(role_id);
        }))
    }

    /// Successor without `role_id`, or `None` if it is not cached.
    pub(crate) fn without_role(&self, role_id: &RoleId) -> Option<Self> {
        if !self.roles.contains_key(role_id) && !self.stale.contains_key(role_id) {
            return None;
        }
        Some(self.successor(|next| {
            next.roles.remove(role_id);
            next.stale.remove(role_id);
        }))
    }

    /// Successor with `role_id` marked stale since `since`, or `None` if it
    /// already is.
    pub(crate) fn with_stale(&self, role_id: &RoleId, since: Instant) -> Option<Self> {
        if self.stale.contains_key(role_id) {
            return None;
        }
        Some(self.successor(|next| {
            next.stale.insert(role_id.clone(), since);
        }))
    }

    /// Successor with every cached role marked stale since `since`, or `None`
    /// if all of them already are.
    pub(crate) fn with_all_stale(&self, since: Instant) -> Option<Self> {
        if self.roles.keys().all(|id| self.stale.contains_key(id)) {
            return None;
        }
        Some(self.successor(|next| {
            for id in self.roles.keys() {
                if !next.stale.contains_key(id) {
                    next.stale.insert(id.clone(), since);
                }
            }
        }))
    }

    fn successor(&self, change: impl FnOnce(&mut Self)) -> Self {
        let mut next = self.clone();
        next.generation += 1;
        change(&mut next);
        next
    }
}

impl GrantLookup for Snapshot {
    fn lookup(&self, role_id: &RoleId) -> Option<&EffectiveGrants> {
        self.roles.get(role_id)
    }
}
