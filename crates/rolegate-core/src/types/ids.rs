//! Identifier types for permissions, roles and actors.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

use crate::error::{Error, Result};

const MAX_PERMISSION_KEY_LEN: usize = 128;
const MAX_ROLE_ID_LEN: usize = 64;

fn check_identifier(
    kind: &'static str,
    value: &str,
    max_len: usize,
    allowed: impl Fn(char) -> bool,
) -> Result<()> {
    let invalid = |reason| Error::InvalidIdentifier {
        kind,
        value: value.to_string(),
        reason,
    };
    if value.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if value.len() > max_len {
        return Err(invalid("too long"));
    }
    if !value.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(invalid("must start with a lowercase letter"));
    }
    if !value.chars().all(allowed) {
        return Err(invalid("contains characters outside the allowed set"));
    }
    Ok(())
}

/// Stable string identifying one protectable capability.
///
/// Keys are lowercase ASCII: letters, digits and `_ . : -`, starting with a
/// letter. Both `view_grades` and `iam:users:read` are valid.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionKey(String);

impl PermissionKey {
    /// Parses and validates a permission key.
    ///
    /// # Examples
    ///
    /// ```
    /// use rolegate_core::PermissionKey;
    ///
    /// let key = PermissionKey::parse("edit_grades").unwrap();
    /// assert_eq!(key.as_str(), "edit_grades");
    /// assert!(PermissionKey::parse("Edit Grades").is_err());
    /// ```
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        check_identifier("permission key", &s, MAX_PERMISSION_KEY_LEN, |c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | ':' | '-')
        })?;
        Ok(Self(s))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl Borrow<str> for PermissionKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PermissionKey {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<PermissionKey> for String {
    fn from(key: PermissionKey) -> Self {
        key.0
    }
}

impl std::str::FromStr for PermissionKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Unique, immutable role identifier such as `teacher` or `super_admin`.
///
/// Role ids are lowercase slugs (`[a-z][a-z0-9_-]*`) so they can double as
/// file names in the journal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoleId(String);

impl RoleId {
    /// Parses and validates a role id.
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        check_identifier("role id", &s, MAX_ROLE_ID_LEN, |c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-')
        })?;
        Ok(Self(s))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl Borrow<str> for RoleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoleId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<RoleId> for String {
    fn from(id: RoleId) -> Self {
        id.0
    }
}

impl std::str::FromStr for RoleId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Reference to the identity that performed an administrative action.
///
/// Opaque: whatever subject the identity provider hands out.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(String);

impl ActorId {
    /// Creates an actor reference.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Actor recorded for changes made while seeding from configuration.
    pub fn bootstrap() -> Self {
        Self("bootstrap".to_string())
    }

    /// Returns the actor as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
