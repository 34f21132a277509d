//! Concurrency, cancellation and timing tests for the lifecycle controller.

mod common;

use assert_matches::assert_matches;
use common::{alice, controller, controller_with, seeded};
use payveil_app::{OperationStatus, ReplaceOutcome};
use payveil_core::{ErrorCategory, LifecycleConfig, LifecycleError, OperationKind};
use payveil_testkit::{test_actor, MockCollaborators, ScriptedFinality};
use std::time::Duration;

async fn yield_until(mut ready: impl FnMut() -> bool) {
    for _ in 0..100 {
        if ready() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}

// ============================================================================
// At most one decrypt in flight
// ============================================================================

#[tokio::test]
async fn concurrent_decrypts_share_one_submission() {
    let (mocks, controller, id) = seeded(75_000).await;
    mocks.ledger.pause_finality();

    let (a, b, ()) = tokio::join!(controller.decrypt(&id), controller.decrypt(&id), async {
        yield_until(|| mocks.ledger.pending_count() == 1).await;
        assert_eq!(controller.decrypts_in_flight(), 1);
        let status = controller.status().current();
        assert_eq!(status.status, OperationStatus::Pending);
        assert_eq!(status.kind, Some(OperationKind::Decrypt));
        mocks.ledger.resume_finality();
    });

    assert_eq!(a.unwrap(), 75_000);
    assert_eq!(b.unwrap(), 75_000);
    assert_eq!(mocks.ledger.submissions_of("verifyDecryption"), 1);
    assert_eq!(mocks.verifier.calls(), 1);
    assert_eq!(controller.decrypts_in_flight(), 0);
}

#[tokio::test]
async fn joined_callers_share_failures_too() {
    let (mocks, controller, id) = seeded(75_000).await;
    mocks.ledger.pause_finality();
    mocks.ledger.script_finality(ScriptedFinality::Reject(
        payveil_core::effects::RejectReason::Reverted("out of gas".to_string()),
    ));

    let (a, b, ()) = tokio::join!(controller.decrypt(&id), controller.decrypt(&id), async {
        yield_until(|| mocks.ledger.pending_count() == 1).await;
        mocks.ledger.resume_finality();
    });

    assert_eq!(a.unwrap_err(), b.unwrap_err());
    assert_eq!(mocks.ledger.submissions_of("verifyDecryption"), 1);
}

#[tokio::test]
async fn decrypts_of_different_records_run_independently() {
    let mocks = MockCollaborators::new();
    let controller = controller(&mocks);
    let first = controller.create(alice(1), &test_actor()).await.unwrap();
    let second = controller.create(alice(2), &test_actor()).await.unwrap();
    mocks.ledger.pause_finality();

    let (a, b, ()) = tokio::join!(controller.decrypt(&first), controller.decrypt(&second), async {
        yield_until(|| mocks.ledger.pending_count() == 2).await;
        assert_eq!(controller.decrypts_in_flight(), 2);
        mocks.ledger.resume_finality();
    });

    assert_eq!(a.unwrap(), 1);
    assert_eq!(b.unwrap(), 2);
    assert_eq!(mocks.ledger.submissions_of("verifyDecryption"), 2);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn abandoned_decrypt_clears_local_state_only() {
    let (mocks, controller, id) = seeded(75_000).await;
    mocks.ledger.pause_finality();

    let task = tokio::spawn({
        let controller = controller.clone();
        let id = id.clone();
        async move { controller.decrypt(&id).await }
    });
    yield_until(|| mocks.ledger.pending_count() == 1).await;
    assert_eq!(controller.status().current().status, OperationStatus::Pending);

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert_eq!(controller.decrypts_in_flight(), 0);
    assert!(!controller.status().current().visible);
    // The submitted transaction is not withdrawn.
    assert_eq!(mocks.ledger.pending_count(), 1);

    mocks.ledger.resume_finality();
    assert_eq!(controller.decrypt(&id).await.unwrap(), 75_000);
}

// ============================================================================
// Finality bounds
// ============================================================================

#[tokio::test]
async fn ledger_timeout_is_not_a_rejection() {
    let mocks = MockCollaborators::new();
    let controller = controller(&mocks);
    mocks.ledger.script_finality(ScriptedFinality::TimeOut);

    let err = controller.create(alice(50), &test_actor()).await.unwrap_err();

    let LifecycleError::FinalityTimeout { tx, .. } = err.clone() else {
        panic!("expected a finality timeout, got {err:?}");
    };
    assert_eq!(err.category(), ErrorCategory::Timeout);
    assert!(!err.is_user_cancellation());
    assert_eq!(mocks.ledger.submissions_of("createRecord"), 1);

    // The transaction may still land; nothing was resubmitted.
    mocks.ledger.confirm_pending(&tx).unwrap();
    assert_eq!(controller.refresh_all().await.unwrap().len(), 1);
    assert_eq!(mocks.ledger.submissions_of("createRecord"), 1);
}

#[tokio::test(start_paused = true)]
async fn hung_finality_wait_is_bounded() {
    let mocks = MockCollaborators::new();
    let config = LifecycleConfig {
        finality_timeout_ms: 5_000,
        ..LifecycleConfig::default()
    };
    let controller = controller_with(&mocks, config);
    mocks.ledger.script_finality(ScriptedFinality::Hang);

    let started = tokio::time::Instant::now();
    let err = controller.create(alice(50), &test_actor()).await.unwrap_err();

    assert_matches!(err, LifecycleError::FinalityTimeout { timeout_ms: 5_000, .. });
    assert!(started.elapsed() >= Duration::from_millis(5_000));
    assert_eq!(controller.status().current().status, OperationStatus::Error);
}

// ============================================================================
// Snapshot freshness
// ============================================================================

#[tokio::test]
async fn older_snapshot_cannot_regress_verified_record() {
    let (_mocks, controller, id) = seeded(75_000).await;
    let stale = controller.store().stamp(controller.store().records());

    controller.decrypt(&id).await.unwrap();

    assert_matches!(
        controller.store().replace_all(stale),
        ReplaceOutcome::Stale { .. }
    );
    assert!(controller.store().get(&id).unwrap().verified());
}

#[tokio::test]
async fn slow_refresh_started_before_decrypt_cannot_regress_it() {
    let (mocks, controller, sealed) = seeded(75_000).await;
    let slow_id = controller.create(alice(60_000), &test_actor()).await.unwrap();
    mocks.ledger.hold_next_read(&slow_id);

    // Reads `sealed` before the decrypt, then stalls on `slow_id`.
    let slow_refresh = tokio::spawn({
        let controller = controller.clone();
        async move { controller.refresh_all().await }
    });
    yield_until(|| mocks.ledger.held_read_count() == 1).await;

    assert_eq!(controller.decrypt(&sealed).await.unwrap(), 75_000);
    assert!(controller.store().get(&sealed).unwrap().verified());

    mocks.ledger.release_reads();
    let records = slow_refresh.await.unwrap().unwrap();

    let stored = controller.store().get(&sealed).unwrap();
    assert_eq!(stored.decrypted_value(), Some(75_000));
    assert!(records
        .iter()
        .any(|record| record.id == sealed && record.verified()));
}

#[tokio::test]
async fn refresh_after_decrypt_keeps_verified_state() {
    let (_mocks, controller, id) = seeded(75_000).await;
    controller.decrypt(&id).await.unwrap();
    let version = controller.store().version();

    let records = controller.refresh_all().await.unwrap();

    assert!(controller.store().version() > version);
    assert!(records.iter().all(|record| record.verified()));
}

// ============================================================================
// Status channel
// ============================================================================

#[tokio::test(start_paused = true)]
async fn terminal_statuses_auto_dismiss() {
    let (mocks, controller, id) = seeded(75_000).await;
    assert_eq!(controller.status().current().status, OperationStatus::Success);

    tokio::time::advance(Duration::from_millis(2_001)).await;
    assert!(!controller.status().current().visible);

    mocks.verifier.fail_next("relayer unreachable");
    controller.decrypt(&id).await.unwrap_err();
    tokio::time::advance(Duration::from_millis(2_500)).await;
    assert!(controller.status().current().visible);
    tokio::time::advance(Duration::from_millis(600)).await;
    assert!(!controller.status().current().visible);
}

#[tokio::test]
async fn subscribers_observe_pending_then_terminal() {
    let mocks = MockCollaborators::new();
    let controller = controller(&mocks);
    let mut updates = controller.status().subscribe();

    controller.create(alice(5), &test_actor()).await.unwrap();

    assert!(updates.has_changed().unwrap());
    let last = updates.borrow_and_update().clone();
    assert_eq!(last.status, OperationStatus::Success);
    assert_eq!(last.kind, Some(OperationKind::Create));
}
