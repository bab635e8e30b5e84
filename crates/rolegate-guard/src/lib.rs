#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Rolegate Guard
//!
//! Enforcement at the edges, failing closed:
//! - [`Guard`]: a required permission set plus mode; `allows()` for render
//!   decisions
//! - [`RequireLayer`] / [`RequireService`]: Tower middleware rejecting requests
//!   the guard does not allow
//! - [`identity_from_parts`] / [`decision_from_parts`]: extension accessors for
//!   handlers
//!
//! The identity itself is placed in request extensions by whatever
//! authentication layer runs first; this crate never authenticates.

mod guard;
mod middleware;
mod parts;

pub use guard::Guard;
pub use middleware::{RequireLayer, RequireService};
pub use parts::{decision_from_parts, identity_from_parts};
