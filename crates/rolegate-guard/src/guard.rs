//! Render-time permission checks.

use rolegate_core::config::AccessConfig;
use rolegate_core::{
    AccessDecision, AccessEvaluator, AccessMode, Identity, PermissionKey, PermissionSet, RoleId,
};
use std::fmt;
use std::sync::Arc;

/// A permission requirement bound to an evaluator.
///
/// Callers without an identity are evaluated as the configured anonymous role
/// if there is one, and denied outright otherwise. There is no implicit
/// privileged default.
#[derive(Clone)]
pub struct Guard {
    evaluator: Arc<dyn AccessEvaluator>,
    required: PermissionSet,
    mode: AccessMode,
    anonymous_role: Option<RoleId>,
}

impl Guard {
    /// Requires every key in `required`.
    pub fn new(
        evaluator: Arc<dyn AccessEvaluator>,
        required: impl IntoIterator<Item = PermissionKey>,
    ) -> Self {
        Self {
            evaluator,
            required: required.into_iter().collect(),
            mode: AccessMode::All,
            anonymous_role: None,
        }
    }

    /// Sets the evaluation mode.
    pub fn with_mode(mut self, mode: AccessMode) -> Self {
        self.mode = mode;
        self
    }

    /// Evaluates identity-less callers as `role`.
    pub fn with_anonymous_role(mut self, role: Option<RoleId>) -> Self {
        self.anonymous_role = role;
        self
    }

    /// Applies the `[access]` configuration.
    pub fn with_access(self, access: &AccessConfig) -> Self {
        self.with_anonymous_role(access.anonymous_role.clone())
    }

    /// Required keys.
    pub fn required(&self) -> &PermissionSet {
        &self.required
    }

    /// Evaluation mode.
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Full decision for `identity`.
    pub fn check(&self, identity: Option<&Identity>) -> AccessDecision {
        match (identity, &self.anonymous_role) {
            (Some(identity), _) => {
                self.evaluator
                    .evaluate(Some(identity), &self.required, self.mode)
            }
            (None, Some(role)) => {
                let anonymous = Identity::anonymous(role.clone());
                self.evaluator
                    .evaluate(Some(&anonymous), &self.required, self.mode)
            }
            (None, None) => self.evaluator.evaluate(None, &self.required, self.mode),
        }
    }

    /// Whether protected content may be rendered for `identity`.
    pub fn allows(&self, identity: Option<&Identity>) -> bool {
        self.check(identity).allowed
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("required", &self.required)
            .field("mode", &self.mode)
            .field("anonymous_role", &self.anonymous_role)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use rolegate_core::{EffectiveGrants, evaluate};
    use std::collections::HashMap;

    /// Evaluator over a fixed grant table.
    pub(crate) struct FixedGrants(pub HashMap<RoleId, EffectiveGrants>);

    impl AccessEvaluator for FixedGrants {
        fn evaluate(
            &self,
            identity: Option<&Identity>,
            required: &PermissionSet,
            mode: AccessMode,
        ) -> AccessDecision {
            evaluate(&self.0, identity, required, mode)
        }
    }

    pub(crate) fn key(k: &str) -> PermissionKey {
        PermissionKey::parse(k).unwrap()
    }

    pub(crate) fn role(id: &str) -> RoleId {
        RoleId::parse(id).unwrap()
    }

    pub(crate) fn grade_book() -> Arc<dyn AccessEvaluator> {
        let mut grants = HashMap::new();
        grants.insert(
            role("teacher"),
            EffectiveGrants::new(3, [key("view_grades"), key("edit_grades")].into()),
        );
        grants.insert(
            role("student"),
            EffectiveGrants::new(1, [key("view_grades")].into()),
        );
        grants.insert(role("anonymous"), EffectiveGrants::new(1, PermissionSet::new()));
        Arc::new(FixedGrants(grants))
    }

    #[test]
    fn test_allows_role_holding_requirement() {
        let guard = Guard::new(grade_book(), [key("edit_grades")]);
        assert!(guard.allows(Some(&Identity::new("t", role("teacher")))));
        assert!(!guard.allows(Some(&Identity::new("s", role("student")))));
    }

    #[test]
    fn test_no_identity_fails_closed() {
        let guard = Guard::new(grade_book(), []);
        assert!(!guard.allows(None));
    }

    #[test]
    fn test_anonymous_role_is_explicit() {
        let open = Guard::new(grade_book(), []).with_anonymous_role(Some(role("anonymous")));
        assert!(open.allows(None));

        let protected = Guard::new(grade_book(), [key("view_grades")])
            .with_anonymous_role(Some(role("anonymous")));
        let decision = protected.check(None);
        assert!(!decision.allowed);
        assert_eq!(decision.missing, [key("view_grades")].into());
    }

    #[test]
    fn test_any_mode() {
        let guard = Guard::new(grade_book(), [key("view_grades"), key("edit_grades")])
            .with_mode(AccessMode::Any);
        assert!(guard.allows(Some(&Identity::new("s", role("student")))));
    }

    #[test]
    fn test_with_access_config() {
        let guard = Guard::new(grade_book(), []).with_access(&AccessConfig::default());
        assert!(guard.allows(None));

        let disabled = AccessConfig {
            anonymous_role: None,
        };
        let guard = Guard::new(grade_book(), []).with_access(&disabled);
        assert!(!guard.allows(None));
    }
}
