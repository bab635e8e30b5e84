//! Access decisions.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::PermissionSet;

/// How a set of required permissions is matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Every required permission must be held
    #[default]
    All,
    /// At least one required permission must be held
    Any,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::All => write!(f, "all"),
            AccessMode::Any => write!(f, "any"),
        }
    }
}

/// Outcome of one evaluation. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    /// Whether access is granted
    pub allowed: bool,
    /// Required keys the caller lacks, always computed with
    /// [`AccessMode::All`] semantics
    pub missing: PermissionSet,
    /// Role version the decision was made against (0 if no role resolved)
    pub evaluated_against_version: u64,
}

impl AccessDecision {
    /// A denial that reports the whole requirement as missing.
    pub fn deny_all(required: &PermissionSet) -> Self {
        Self {
            allowed: false,
            missing: required.clone(),
            evaluated_against_version: 0,
        }
    }
}
