//! The permission catalog.
//!
//! Single source of truth for valid permission keys. Permissions are
//! registered at process start and never removed: a permission is retired by
//! no longer granting it, so historical grants and audit rows stay readable.
//!
//! # Usage
//!
//! ```rust
//! use rolegate_core::PermissionCatalog;
//!
//! let mut catalog = PermissionCatalog::new();
//! catalog.register("view_grades", "grades", "Read grade books").unwrap();
//! catalog.register("edit_grades", "grades", "Modify grade books").unwrap();
//!
//! let listing = catalog.list();
//! assert_eq!(listing["grades"].len(), 2);
//! ```

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::types::{Permission, PermissionKey, PermissionSet};

/// Registry of every permission the system understands.
#[derive(Debug, Clone, Default)]
pub struct PermissionCatalog {
    /// Permissions in registration order.
    entries: Vec<Permission>,
    /// Key → index into `entries`.
    index: HashMap<PermissionKey, usize>,
}

impl PermissionCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a permission.
    ///
    /// Registering the exact same definition twice is a no-op, which keeps
    /// startup seeding idempotent. A different definition under an existing
    /// key fails with [`Error::DuplicateKey`].
    pub fn register(
        &mut self,
        key: impl Into<String>,
        category: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<()> {
        let permission = Permission {
            key: PermissionKey::parse(key)?,
            category: category.into(),
            description: description.into(),
        };
        self.insert(permission)
    }

    /// Registers an already-built permission.
    pub fn insert(&mut self, permission: Permission) -> Result<()> {
        if let Some(&i) = self.index.get(&permission.key) {
            if self.entries[i] == permission {
                return Ok(());
            }
            return Err(Error::DuplicateKey {
                key: permission.key.to_string(),
            });
        }
        tracing::debug!(key = %permission.key, category = %permission.category, "Registered permission");
        self.index.insert(permission.key.clone(), self.entries.len());
        self.entries.push(permission);
        Ok(())
    }

    /// Full listing grouped by category.
    ///
    /// Categories are sorted; within a category permissions keep their
    /// registration order, so repeated calls render identically.
    pub fn list(&self) -> BTreeMap<String, Vec<Permission>> {
        let mut grouped: BTreeMap<String, Vec<Permission>> = BTreeMap::new();
        for permission in &self.entries {
            grouped
                .entry(permission.category.clone())
                .or_default()
                .push(permission.clone());
        }
        grouped
    }

    /// Looks up a permission by key.
    pub fn get(&self, key: &str) -> Result<&Permission> {
        self.index
            .get(key)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| Error::permission_not_found(key))
    }

    /// Returns `true` if `key` is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Every registered key.
    pub fn keys(&self) -> PermissionSet {
        self.entries.iter().map(|p| p.key.clone()).collect()
    }

    /// Keys from `set` that are not registered.
    pub fn unknown_keys<'a>(&self, set: impl IntoIterator<Item = &'a PermissionKey>) -> Vec<String> {
        set.into_iter()
            .filter(|k| !self.contains(k.as_str()))
            .map(|k| k.to_string())
            .collect()
    }

    /// Fails with [`Error::UnknownPermission`] if any key in `set` is not
    /// registered.
    pub fn validate<'a>(&self, set: impl IntoIterator<Item = &'a PermissionKey>) -> Result<()> {
        let unknown = self.unknown_keys(set);
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(Error::UnknownPermission { keys: unknown })
        }
    }

    /// Number of registered permissions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
