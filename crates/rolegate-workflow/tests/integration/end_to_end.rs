//! End-to-end scenarios: edit session → store → bus → cache → decision.

use rolegate_core::{AccessEvaluator, AccessMode, Error, Identity};
use rolegate_store::RoleStore;
use rolegate_workflow::SubmitOutcome;
use std::time::Duration;

use crate::common::{TestHarness, admin, key, role_id, set};

const SETTLE: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_teacher_gains_edit_grades() {
    let harness = TestHarness::new().await;
    let (cache, refresher) = harness.cache().await;
    let alice = Identity::new("alice", role_id("teacher"));

    let before = cache.evaluate(Some(&alice), &set(&["edit_grades"]), AccessMode::All);
    assert!(!before.allowed);
    assert_eq!(before.missing, set(&["edit_grades"]));
    assert_eq!(before.evaluated_against_version, 1);

    let mut session = harness.editor().open(&role_id("teacher")).await.unwrap();
    session
        .validate(set(&["view_grades", "edit_grades"]))
        .await
        .unwrap();
    let outcome = session.submit(&admin()).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Committed(ref c) if c.version() == 2));

    cache
        .wait_for_version(&role_id("teacher"), 2, SETTLE)
        .await
        .unwrap();
    let after = cache.evaluate(Some(&alice), &set(&["edit_grades"]), AccessMode::All);
    assert!(after.allowed);
    assert!(after.missing.is_empty());
    assert_eq!(after.evaluated_against_version, 2);

    // A second writer still holding version 1 is turned away.
    let err = harness
        .store
        .replace_grants(&role_id("teacher"), set(&["view_grades"]), 1, &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::VersionConflict { .. }));

    refresher.shutdown().await;
}

#[tokio::test]
async fn test_super_admin_holds_every_catalog_key() {
    let harness = TestHarness::new().await;
    let (cache, refresher) = harness.cache().await;
    let root = Identity::new("root", role_id("super_admin"));

    let rows = harness.store.grant_rows(&role_id("super_admin")).await.unwrap();
    assert!(rows.is_empty());
    for permission in harness.store.catalog().keys() {
        let required = set(&[permission.as_str()]);
        assert!(cache.evaluate(Some(&root), &required, AccessMode::All).allowed);
    }

    let err = harness
        .store
        .replace_grants(&role_id("super_admin"), set(&[]), 1, &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ImmutableRole { .. }));

    refresher.shutdown().await;
}

#[tokio::test]
async fn test_fail_closed_without_identity() {
    let harness = TestHarness::new().await;
    let (cache, refresher) = harness.cache().await;

    let nobody = cache.evaluate(None, &set(&[]), AccessMode::All);
    assert!(!nobody.allowed);

    let anonymous = Identity::anonymous(role_id("anonymous"));
    assert!(cache.evaluate(Some(&anonymous), &set(&[]), AccessMode::All).allowed);
    let denied = cache.evaluate(Some(&anonymous), &set(&["view_grades"]), AccessMode::Any);
    assert!(!denied.allowed);
    assert_eq!(denied.missing, set(&["view_grades"]));

    let stranger = Identity::new("mallory", role_id("unknown"));
    assert!(!cache.evaluate(Some(&stranger), &set(&[]), AccessMode::All).allowed);

    refresher.shutdown().await;
}

#[tokio::test]
async fn test_overrides_and_any_mode() {
    let harness = TestHarness::new().await;
    let (cache, refresher) = harness.cache().await;
    let both = set(&["view_grades", "edit_grades"]);

    let alice = Identity::new("alice", role_id("teacher"));
    let any = cache.evaluate(Some(&alice), &both, AccessMode::Any);
    assert!(any.allowed);
    // Missing is reported with ALL semantics even when ANY allows.
    assert_eq!(any.missing, set(&["edit_grades"]));
    assert!(!cache.evaluate(Some(&alice), &both, AccessMode::All).allowed);

    let bob = Identity::new("bob", role_id("teacher")).with_overrides([key("edit_grades")]);
    assert!(cache.evaluate(Some(&bob), &both, AccessMode::All).allowed);

    refresher.shutdown().await;
}

#[tokio::test]
async fn test_repeated_replace_converges() {
    let harness = TestHarness::new().await;
    let (cache, refresher) = harness.cache().await;
    let wanted = set(&["edit_grades"]);

    for expected in [2, 3] {
        let mut session = harness.editor().open(&role_id("teacher")).await.unwrap();
        session.validate(wanted.clone()).await.unwrap();
        let outcome = session.submit(&admin()).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Committed(ref c) if c.version() == expected));
    }

    cache
        .wait_for_version(&role_id("teacher"), 3, SETTLE)
        .await
        .unwrap();
    let snapshot = cache.snapshot();
    let entry = snapshot.get(&role_id("teacher")).unwrap();
    assert_eq!(*entry.permissions, wanted);

    refresher.shutdown().await;
}

#[tokio::test]
async fn test_retired_role_stops_granting() {
    let harness = TestHarness::new().await;
    let (cache, refresher) = harness.cache().await;
    let alice = Identity::new("alice", role_id("teacher"));
    assert!(cache.evaluate(Some(&alice), &set(&["view_grades"]), AccessMode::All).allowed);

    harness
        .store
        .retire_role(&role_id("teacher"), 1, &admin())
        .await
        .unwrap();
    cache
        .wait_for_version(&role_id("teacher"), 2, SETTLE)
        .await
        .unwrap();

    let decision = cache.evaluate(Some(&alice), &set(&[]), AccessMode::All);
    assert!(!decision.allowed);
    assert_eq!(decision.evaluated_against_version, 2);

    refresher.shutdown().await;
}

#[tokio::test]
async fn test_reader_snapshot_is_stable_during_refresh() {
    let harness = TestHarness::new().await;
    let (cache, refresher) = harness.cache().await;
    let held = cache.snapshot();

    harness
        .store
        .replace_grants(&role_id("teacher"), set(&[]), 1, &admin())
        .await
        .unwrap();
    cache
        .wait_for_version(&role_id("teacher"), 2, SETTLE)
        .await
        .unwrap();

    // The snapshot taken earlier still answers from version 1.
    assert_eq!(held.version_of(&role_id("teacher")), Some(1));
    assert!(held.generation() < cache.snapshot().generation());

    refresher.shutdown().await;
}
