//! Integration tests for returned-material reconciliation.
//!
//! Tests cover:
//! - Single-issue reconciliation and stock restocking
//! - Rejection ordering and leaving state untouched
//! - Job completion under both batch policies
//! - Value-loss aggregation per job

mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rackline::{
    commands::returns::{IssueOutcome, IssueReturn},
    config::AppConfig,
    services::ledger::ReturnInput,
    BatchPolicy, Event, ServiceError,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

// ==================== Single Issue ====================

#[tokio::test]
async fn good_and_damaged_return_restocks_only_good_units() {
    let mut app = TestApp::new();
    let job_id = Uuid::new_v4();
    let blanket = app.seed_material("BLK-02", dec!(9.50), dec!(30));
    let issue_id = app.seed_issue(job_id, &blanket, dec!(10));

    let outcome = app
        .state
        .returns
        .reconcile_issue(
            issue_id,
            ReturnInput::good(dec!(7)).with_damage(dec!(2), "torn at the corner", 2),
        )
        .await
        .expect("reconciliation succeeds");

    assert_eq!(outcome.reconciliation.quantity_used(), dec!(1));
    let damage = outcome.damage_record.expect("damage record");
    assert_eq!(damage.value_loss(), dec!(19.00));
    assert_eq!(damage.photo_count(), 2);

    let material = app.state.store.material(blanket.id).await.unwrap();
    assert_eq!(material.available_quantity, dec!(37));

    let names: Vec<_> = app.drain_events().iter().map(Event::name).collect();
    assert_eq!(
        names,
        vec!["return_reconciled", "damage_recorded", "stock_adjusted"]
    );
}

#[tokio::test]
async fn full_consumption_emits_no_stock_adjustment() {
    let mut app = TestApp::new();
    let tape = app.seed_material("TAPE", dec!(1.25), dec!(5));
    let issue_id = app.seed_issue(Uuid::new_v4(), &tape, dec!(4));

    let outcome = app
        .state
        .returns
        .reconcile_issue(issue_id, ReturnInput::good(Decimal::ZERO))
        .await
        .unwrap();

    assert_eq!(outcome.reconciliation.quantity_used(), dec!(4));
    assert!(outcome.damage_record.is_none());
    let names: Vec<_> = app.drain_events().iter().map(Event::name).collect();
    assert_eq!(names, vec!["return_reconciled"]);
}

#[tokio::test]
async fn over_return_is_reported_with_its_limit() {
    let app = TestApp::new();
    let blanket = app.seed_material("BLK-02", dec!(9.50), dec!(30));
    let issue_id = app.seed_issue(Uuid::new_v4(), &blanket, dec!(5));

    let err = app
        .state
        .returns
        .reconcile_issue(issue_id, ReturnInput::good(dec!(4)).with_damage(dec!(2), "", 0))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ServiceError::OverReturn {
            requested: dec!(6),
            limit: dec!(5)
        }
    );
    assert!(app.state.returns.reconciliation(issue_id).await.unwrap().is_none());
    assert_eq!(
        app.state.store.material(blanket.id).await.unwrap().available_quantity,
        dec!(30)
    );
}

#[tokio::test]
async fn second_reconciliation_is_refused() {
    let app = TestApp::new();
    let blanket = app.seed_material("BLK-02", dec!(9.50), dec!(30));
    let issue_id = app.seed_issue(Uuid::new_v4(), &blanket, dec!(5));

    app.state
        .returns
        .reconcile_issue(issue_id, ReturnInput::good(dec!(5)))
        .await
        .unwrap();
    let err = app
        .state
        .returns
        .reconcile_issue(issue_id, ReturnInput::good(dec!(1)))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::AlreadyReconciled { issue_id: id } if id == issue_id);
    assert_eq!(err.status_code(), http::StatusCode::CONFLICT);
    assert_eq!(
        app.state.store.material(blanket.id).await.unwrap().available_quantity,
        dec!(35)
    );
}

#[tokio::test]
async fn concurrent_reconciliations_of_one_issue_apply_once() {
    let mut app = TestApp::new();
    app.spawn_event_loop();
    let blanket = app.seed_material("BLK-02", dec!(9.50), dec!(0));
    let issue_id = app.seed_issue(Uuid::new_v4(), &blanket, dec!(8));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let returns = app.state.returns.clone();
        tasks.push(tokio::spawn(async move {
            returns
                .reconcile_issue(issue_id, ReturnInput::good(dec!(3)))
                .await
                .is_ok()
        }));
    }

    let mut successes = 0;
    for task in tasks {
        if task.await.unwrap() {
            successes += 1;
        }
    }

    assert_eq!(successes, 1, "exactly one reconciliation should win");
    assert_eq!(
        app.state.store.material(blanket.id).await.unwrap().available_quantity,
        dec!(3)
    );
}

// ==================== Job Completion ====================

#[tokio::test]
async fn best_effort_job_completion_keeps_valid_issues() {
    let mut app = TestApp::new();
    app.spawn_event_loop();
    let job_id = Uuid::new_v4();
    let blanket = app.seed_material("BLK-02", dec!(9.50), dec!(0));
    let crate_ = app.seed_material("CRATE", dec!(30), dec!(0));
    let blankets = app.seed_issue(job_id, &blanket, dec!(10));
    let crates = app.seed_issue(job_id, &crate_, dec!(2));

    let report = app
        .state
        .returns
        .complete_job(
            job_id,
            vec![
                IssueReturn::new(blankets, ReturnInput::good(dec!(6))),
                IssueReturn::new(crates, ReturnInput::good(dec!(3))),
            ],
        )
        .await
        .unwrap();

    assert_eq!(report.policy, BatchPolicy::BestEffort);
    assert_eq!((report.succeeded(), report.failed()), (1, 1));
    assert_matches!(
        report.outcome_for(crates),
        Some(IssueOutcome::Rejected {
            error: ServiceError::OverReturn { .. },
            ..
        })
    );
    assert_eq!(
        app.state.store.material(blanket.id).await.unwrap().available_quantity,
        dec!(6)
    );
    assert_eq!(
        app.state.store.material(crate_.id).await.unwrap().available_quantity,
        dec!(0)
    );
}

#[tokio::test]
async fn atomic_policy_from_config_rolls_back_whole_job() {
    let mut config = AppConfig::default();
    config.reconciliation.batch_policy = BatchPolicy::Atomic;
    let mut app = TestApp::with_config(config);
    app.spawn_event_loop();

    let job_id = Uuid::new_v4();
    let blanket = app.seed_material("BLK-02", dec!(9.50), dec!(0));
    let first = app.seed_issue(job_id, &blanket, dec!(10));
    let second = app.seed_issue(job_id, &blanket, dec!(4));

    let err = app
        .state
        .returns
        .complete_job(
            job_id,
            vec![
                IssueReturn::new(first, ReturnInput::good(dec!(10))),
                IssueReturn::new(
                    second,
                    ReturnInput::good(dec!(1)).with_damage(dec!(1), "water damage", 0),
                ),
            ],
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::MissingEvidence { .. });
    assert!(app.state.returns.reconciliation(first).await.unwrap().is_none());
    assert_eq!(
        app.state.store.material(blanket.id).await.unwrap().available_quantity,
        dec!(0)
    );
}

#[tokio::test]
async fn job_loss_summary_totals_damage() {
    let mut app = TestApp::new();
    app.spawn_event_loop();
    let job_id = Uuid::new_v4();
    let blanket = app.seed_material("BLK-02", dec!(9.50), dec!(0));
    let crate_ = app.seed_material("CRATE", dec!(30), dec!(0));
    let blankets = app.seed_issue(job_id, &blanket, dec!(10));
    let crates = app.seed_issue(job_id, &crate_, dec!(2));
    // Another job's damage does not count
    let other = app.seed_issue(Uuid::new_v4(), &crate_, dec!(1));

    app.state
        .returns
        .complete_job(
            job_id,
            vec![
                IssueReturn::new(
                    blankets,
                    ReturnInput::good(dec!(5)).with_damage(dec!(3), "stained", 1),
                ),
                IssueReturn::new(
                    crates,
                    ReturnInput::good(dec!(0)).with_damage(dec!(1), "split plank", 3),
                ),
            ],
        )
        .await
        .unwrap();
    app.state
        .returns
        .reconcile_issue(
            other,
            ReturnInput::good(dec!(0)).with_damage(dec!(1), "crushed", 1),
        )
        .await
        .unwrap();

    let summary = app.state.returns.job_loss_summary(job_id).await.unwrap();
    assert_eq!(summary.total_quantity_damaged, dec!(4));
    assert_eq!(summary.total_value_loss, dec!(58.50));
    assert_eq!(summary.by_material.len(), 2);
    assert_eq!(summary.by_material[&crate_.id].value_loss, dec!(30));
}
