//! Integration tests for the edit session state machine.

use rolegate_core::{AuditAction, Error};
use rolegate_store::RoleStore;
use rolegate_workflow::{
    RoleEditor, SessionState, StaticDirectory, SubmitOutcome, ValidationWarning,
};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{StallingStore, TestHarness, admin, role_id, set};

#[tokio::test]
async fn test_edit_commits_and_surfaces_audit_entry() {
    let harness = TestHarness::new().await;
    let mut session = harness.editor().open(&role_id("teacher")).await.unwrap();
    assert_eq!(session.state(), SessionState::Loaded);
    assert_eq!(session.pinned_version(), 1);
    assert_eq!(session.current_grants(), &set(&["view_grades"]));

    let report = session
        .validate(set(&["view_grades", "edit_grades"]))
        .await
        .unwrap();
    assert_eq!(report.diff.added, set(&["edit_grades"]));
    assert!(report.diff.removed.is_empty());
    assert!(report.warnings.is_empty());
    assert_eq!(session.state(), SessionState::Validating);

    let outcome = session.submit(&admin()).await.unwrap();
    let SubmitOutcome::Committed(commit) = outcome else {
        panic!("expected a commit, got {outcome:?}");
    };
    assert_eq!(commit.version(), 2);
    assert_eq!(commit.audit.action, AuditAction::GrantsReplaced);
    assert_eq!(commit.audit.actor, admin());
    assert_eq!(commit.audit.diff.added, set(&["edit_grades"]));
    assert_eq!(session.state(), SessionState::Committed);
    assert_eq!(session.commit(), Some(&commit));
}

#[tokio::test]
async fn test_conflict_reloads_and_keeps_proposal() {
    let harness = TestHarness::new().await;
    let editor = harness.editor();
    let mut first = editor.open(&role_id("teacher")).await.unwrap();
    let mut second = editor.open(&role_id("teacher")).await.unwrap();

    first.validate(set(&["edit_grades"])).await.unwrap();
    first.submit(&admin()).await.unwrap();

    second
        .validate(set(&["view_grades", "edit_grades"]))
        .await
        .unwrap();
    let outcome = second.submit(&admin()).await.unwrap();
    match outcome {
        SubmitOutcome::Conflict {
            current,
            current_grants,
            proposal,
        } => {
            assert_eq!(current.version, 2);
            assert_eq!(current_grants, set(&["edit_grades"]));
            assert_eq!(proposal, set(&["view_grades", "edit_grades"]));
        }
        other => panic!("expected a conflict, got {other:?}"),
    }
    assert_eq!(second.state(), SessionState::ConflictDetected);
    assert_eq!(second.pinned_version(), 2);

    // Nothing was merged: the store holds the first editor's set.
    let teacher = role_id("teacher");
    assert_eq!(
        harness.store.get_grants(&teacher).await.unwrap(),
        set(&["edit_grades"])
    );

    // Re-applying deliberately against the fresh version succeeds.
    let proposal = second.proposal().cloned().unwrap();
    second.validate(proposal).await.unwrap();
    let outcome = second.submit(&admin()).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Committed(ref c) if c.version() == 3));
}

#[tokio::test]
async fn test_system_role_rejected_at_validation() {
    let harness = TestHarness::new().await;
    let mut session = harness
        .editor()
        .open(&role_id("super_admin"))
        .await
        .unwrap();

    // System roles load as holding the whole catalog.
    assert_eq!(session.current_grants().len(), 2);

    let err = session.validate(set(&[])).await.unwrap_err();
    assert!(matches!(err, Error::ImmutableRole { .. }));
    assert_eq!(session.state(), SessionState::Loaded);
}

#[tokio::test]
async fn test_unknown_permission_rejected_at_validation() {
    let harness = TestHarness::new().await;
    let mut session = harness.editor().open(&role_id("teacher")).await.unwrap();

    let err = session
        .validate(set(&["view_grades", "delete_grades"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownPermission { ref keys } if keys == &["delete_grades"]));
    assert_eq!(session.state(), SessionState::Loaded);
}

#[tokio::test]
async fn test_retired_role_rejected_at_validation() {
    let harness = TestHarness::new().await;
    harness
        .store
        .retire_role(&role_id("teacher"), 1, &admin())
        .await
        .unwrap();

    let mut session = harness.editor().open(&role_id("teacher")).await.unwrap();
    let err = session.validate(set(&["view_grades"])).await.unwrap_err();
    assert!(matches!(err, Error::RoleRetired { .. }));
}

#[tokio::test]
async fn test_empty_set_warns_without_blocking() {
    let harness = TestHarness::new().await;
    let mut session = harness.editor().open(&role_id("teacher")).await.unwrap();

    let report = session.validate(set(&[])).await.unwrap();
    assert_eq!(report.warnings, vec![ValidationWarning::EmptyGrantSet]);
    assert_eq!(report.diff.removed, set(&["view_grades"]));

    let outcome = session.submit(&admin()).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Committed(_)));
}

#[tokio::test]
async fn test_empty_set_warns_about_stranded_identities() {
    let harness = TestHarness::new().await;
    let directory = StaticDirectory::new().with_count(role_id("teacher"), 4);
    let editor = harness.editor().with_directory(Arc::new(directory));
    let mut session = editor.open(&role_id("teacher")).await.unwrap();

    let report = session.validate(set(&[])).await.unwrap();
    assert_eq!(
        report.warnings,
        vec![
            ValidationWarning::EmptyGrantSet,
            ValidationWarning::StrandsIdentities { count: 4 },
        ]
    );
    assert_eq!(
        report.warnings[1].to_string(),
        "4 active identities would lose all permissions"
    );

    // A non-empty proposal warns about nothing.
    let report = session.validate(set(&["edit_grades"])).await.unwrap();
    assert!(report.warnings.is_empty());
}

#[tokio::test]
async fn test_out_of_order_operations_rejected() {
    let harness = TestHarness::new().await;
    let mut session = harness.editor().open(&role_id("teacher")).await.unwrap();

    let err = session.submit(&admin()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidTransition {
            operation: "submit",
            ..
        }
    ));

    session.validate(set(&["edit_grades"])).await.unwrap();
    session.submit(&admin()).await.unwrap();

    let err = session.validate(set(&[])).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));
    assert!(session.reload().await.is_err());
    assert!(err.to_string().contains("committed"));
}

#[tokio::test]
async fn test_timeout_means_unknown_outcome() {
    let harness = TestHarness::new().await;
    let stalling = Arc::new(StallingStore {
        inner: harness.store.clone(),
        stall: Duration::from_secs(5),
    });
    let editor = RoleEditor::new(stalling).with_submit_timeout(Duration::from_millis(50));
    let mut session = editor.open(&role_id("teacher")).await.unwrap();

    session.validate(set(&["edit_grades"])).await.unwrap();
    let err = session.submit(&admin()).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { millis: 50, .. }));
    assert_eq!(session.state(), SessionState::OutcomeUnknown);

    // No blind retry.
    let err = session.submit(&admin()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));

    // The write did land; reloading reveals it.
    session.reload().await.unwrap();
    assert_eq!(session.state(), SessionState::Loaded);
    assert_eq!(session.pinned_version(), 2);
    assert_eq!(session.current_grants(), &set(&["edit_grades"]));
    assert_eq!(session.proposal(), Some(&set(&["edit_grades"])));
}

#[tokio::test]
async fn test_open_missing_role() {
    let harness = TestHarness::new().await;
    let err = harness
        .editor()
        .open(&role_id("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}
