#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Rolegate Core
//!
//! Shared types, the error taxonomy, the permission catalog and the pure grant
//! evaluator. Everything in this crate is free of I/O except configuration
//! loading.
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias
//! - [`types`]: Identifiers, roles, grants, identities, decisions, audit entries
//! - [`catalog`]: The permission catalog
//! - [`evaluator`]: Access decisions over a grant snapshot
//! - [`config`]: TOML configuration

pub mod catalog;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod types;

// Re-exports for convenience
pub use catalog::PermissionCatalog;
pub use config::RolegateConfig;
pub use error::{Error, Result};
pub use evaluator::{AccessEvaluator, GrantLookup, evaluate};
pub use types::{
    AccessDecision, AccessMode, ActorId, AuditAction, AuditEntry, EffectiveGrants, Grant,
    GrantDiff, Identity, NewRole, Permission, PermissionKey, PermissionSet, Role, RoleId,
};
