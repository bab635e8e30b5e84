//! Core types for Rolegate.

mod audit;
mod decision;
mod identity;
mod ids;
mod proptests;
mod role;

pub use audit::{AuditAction, AuditEntry, GrantDiff};
pub use decision::{AccessDecision, AccessMode};
pub use identity::Identity;
pub use ids::{ActorId, PermissionKey, RoleId};
pub use role::{EffectiveGrants, Grant, NewRole, Permission, PermissionSet, Role};
