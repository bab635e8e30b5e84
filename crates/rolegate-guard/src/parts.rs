//! Request extension accessors.

use rolegate_core::{AccessDecision, Identity};

/// Extract the caller's `Identity` from HTTP request `Parts`, if present.
pub fn identity_from_parts(parts: &http::request::Parts) -> Option<&Identity> {
    parts.extensions.get::<Identity>()
}

/// Extract the `AccessDecision` a [`RequireService`](crate::RequireService)
/// made for this request.
pub fn decision_from_parts(parts: &http::request::Parts) -> Option<&AccessDecision> {
    parts.extensions.get::<AccessDecision>()
}
