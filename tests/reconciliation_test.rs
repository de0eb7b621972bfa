//! Integration tests for physical-count reconciliation.
//!
//! Tests cover:
//! - Variance computation against projected stock
//! - Tolerance evaluation, per-call override and configured default
//! - Automatic adjustment bringing stock to the counted value
//! - Count-only mode leaving stock untouched
//! - Count history retrieval and listing

mod common;

use common::TestEngine;
use rust_decimal_macros::dec;
use stockledger::entities::stock_movement::{MovementType, StockDirection};
use stockledger::errors::ServiceError;
use stockledger::services::reconciliation::ReconcileRequest;
use uuid::Uuid;

fn count_request(product_id: Uuid, counted: i32, counted_by: Uuid) -> ReconcileRequest {
    ReconcileRequest {
        product_id,
        location_id: None,
        counted_quantity: counted,
        tolerance: None,
        auto_adjust: false,
        notes: None,
        counted_by,
    }
}

#[tokio::test]
async fn shortage_out_of_tolerance_adjusts_stock_down() {
    let engine = TestEngine::new().await;
    let product = engine.seed_product("Rec-SHORT", Some(dec!(2.00))).await;
    engine.receive_stock(product, 10, Some("2.00")).await;

    let mut req = count_request(product, 8, engine.actor);
    req.auto_adjust = true;
    let outcome = engine
        .reconciliation
        .reconcile(req)
        .await
        .expect("reconcile should succeed");

    assert_eq!(outcome.system_quantity, 10);
    assert_eq!(outcome.counted_quantity, 8);
    assert_eq!(outcome.difference, -2);
    assert_eq!(outcome.difference_percent, dec!(0.2));
    // 20% variance exceeds the configured 5% default.
    assert!(!outcome.within_tolerance);

    // Stock now matches the shelf.
    assert_eq!(engine.current_stock(product).await, 8);

    let movement_id = outcome
        .adjustment_movement_id
        .expect("an adjustment movement should have been written");
    let movements = engine
        .movements
        .list_for_product(product, None)
        .await
        .expect("movements should load");
    let adjustment = movements
        .iter()
        .find(|m| m.id == movement_id)
        .expect("adjustment movement present");
    assert_eq!(adjustment.movement_type, MovementType::Adjustment);
    assert_eq!(adjustment.direction, StockDirection::Out);
    assert_eq!(adjustment.quantity, 2);
    assert_eq!(adjustment.unit_cost, Some(dec!(2.00)));
    assert_eq!(
        adjustment.reference.as_deref(),
        Some(format!("COUNT-{}", outcome.count_id).as_str())
    );
    assert_eq!(adjustment.reason.as_deref(), Some("Physical count adjustment"));
}

#[tokio::test]
async fn overage_adjusts_stock_up() {
    let engine = TestEngine::new().await;
    let product = engine.seed_product("REC-OVER", None).await;
    engine.receive_stock(product, 10, None).await;

    let mut req = count_request(product, 12, engine.actor);
    req.auto_adjust = true;
    let outcome = engine
        .reconciliation
        .reconcile(req)
        .await
        .expect("reconcile should succeed");

    assert_eq!(outcome.difference, 2);
    assert_eq!(outcome.difference_percent, dec!(0.2));
    assert_eq!(engine.current_stock(product).await, 12);

    let movements = engine
        .movements
        .list_for_product(product, None)
        .await
        .expect("movements should load");
    let adjustment = movements
        .iter()
        .find(|m| m.movement_type == MovementType::Adjustment)
        .expect("adjustment movement present");
    assert_eq!(adjustment.direction, StockDirection::In);
    assert_eq!(adjustment.quantity, 2);
}

#[tokio::test]
async fn variance_within_tolerance_is_flagged_but_still_adjustable() {
    let engine = TestEngine::new().await;
    let product = engine.seed_product("REC-TOL", None).await;
    engine.receive_stock(product, 100, None).await;

    let mut req = count_request(product, 98, engine.actor);
    req.auto_adjust = true;
    let outcome = engine
        .reconciliation
        .reconcile(req)
        .await
        .expect("reconcile should succeed");

    // 2% variance sits inside the 5% default, yet the adjustment still runs
    // because the caller asked for one.
    assert!(outcome.within_tolerance);
    assert_eq!(outcome.difference_percent, dec!(0.02));
    assert!(outcome.adjustment_movement_id.is_some());
    assert_eq!(engine.current_stock(product).await, 98);
}

#[tokio::test]
async fn per_call_tolerance_overrides_the_default() {
    let engine = TestEngine::new().await;
    let product = engine.seed_product("REC-OVR-TOL", None).await;
    engine.receive_stock(product, 100, None).await;

    let mut req = count_request(product, 90, engine.actor);
    req.tolerance = Some(dec!(0.15));
    let outcome = engine
        .reconciliation
        .reconcile(req)
        .await
        .expect("reconcile should succeed");
    // 10% variance would fail the 5% default but passes the explicit 15%.
    assert!(outcome.within_tolerance);
}

#[tokio::test]
async fn count_only_mode_leaves_stock_untouched() {
    let engine = TestEngine::new().await;
    let product = engine.seed_product("REC-DRY", None).await;
    engine.receive_stock(product, 10, None).await;

    let outcome = engine
        .reconciliation
        .reconcile(count_request(product, 7, engine.actor))
        .await
        .expect("reconcile should succeed");

    assert_eq!(outcome.difference, -3);
    assert!(outcome.adjustment_movement_id.is_none());
    assert_eq!(engine.current_stock(product).await, 10);
}

#[tokio::test]
async fn matching_count_records_zero_variance() {
    let engine = TestEngine::new().await;
    let product = engine.seed_product("REC-MATCH", None).await;
    engine.receive_stock(product, 10, None).await;

    let mut req = count_request(product, 10, engine.actor);
    req.auto_adjust = true;
    let outcome = engine
        .reconciliation
        .reconcile(req)
        .await
        .expect("reconcile should succeed");

    assert_eq!(outcome.difference, 0);
    assert_eq!(outcome.difference_percent, dec!(0));
    assert!(outcome.within_tolerance);
    // Nothing to correct, so nothing is written.
    assert!(outcome.adjustment_movement_id.is_none());
}

#[tokio::test]
async fn counting_an_empty_shelf_uses_the_raw_difference() {
    let engine = TestEngine::new().await;
    let product = engine.seed_product("REC-EMPTY", None).await;

    let outcome = engine
        .reconciliation
        .reconcile(count_request(product, 3, engine.actor))
        .await
        .expect("reconcile should succeed");

    assert_eq!(outcome.system_quantity, 0);
    assert_eq!(outcome.difference, 3);
    assert_eq!(outcome.difference_percent, dec!(3));
    assert!(!outcome.within_tolerance);
}

#[tokio::test]
async fn counts_are_persisted_and_listable() {
    let engine = TestEngine::new().await;
    let product = engine.seed_product("REC-HIST", None).await;
    engine.receive_stock(product, 5, None).await;

    let mut req = count_request(product, 4, engine.actor);
    req.notes = Some("cycle count, aisle 3".to_string());
    let outcome = engine
        .reconciliation
        .reconcile(req)
        .await
        .expect("reconcile should succeed");

    let stored = engine
        .reconciliation
        .get_count(outcome.count_id)
        .await
        .expect("count should load");
    assert_eq!(stored.product_id, product);
    assert_eq!(stored.system_quantity, 5);
    assert_eq!(stored.counted_quantity, 4);
    assert_eq!(stored.difference, -1);
    assert!(stored.is_shortage());
    assert_eq!(stored.notes.as_deref(), Some("cycle count, aisle 3"));

    // Keep the two counts on distinct timestamps for the ordering check.
    tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    engine
        .reconciliation
        .reconcile(count_request(product, 5, engine.actor))
        .await
        .expect("second count should succeed");

    let (counts, total) = engine
        .reconciliation
        .list_counts(product, 1, 10)
        .await
        .expect("listing should succeed");
    assert_eq!(total, 2);
    assert_eq!(counts.len(), 2);
    // Newest first: the matching recount leads.
    assert_eq!(counts[0].difference, 0);

    let err = engine
        .reconciliation
        .get_count(Uuid::new_v4())
        .await
        .expect_err("unknown count should fail");
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn invalid_inputs_are_rejected() {
    let engine = TestEngine::new().await;
    let product = engine.seed_product("REC-BAD", None).await;

    let mut negative = count_request(product, -1, engine.actor);
    negative.auto_adjust = true;
    let err = engine
        .reconciliation
        .reconcile(negative)
        .await
        .expect_err("negative count should fail");
    assert!(matches!(err, ServiceError::ValidationError(_)));

    let mut wild_tolerance = count_request(product, 1, engine.actor);
    wild_tolerance.tolerance = Some(dec!(1.5));
    let err = engine
        .reconciliation
        .reconcile(wild_tolerance)
        .await
        .expect_err("tolerance above 1 should fail");
    assert!(matches!(err, ServiceError::ValidationError(_)));

    let err = engine
        .reconciliation
        .reconcile(count_request(Uuid::new_v4(), 1, engine.actor))
        .await
        .expect_err("unknown product should fail");
    assert!(matches!(err, ServiceError::NotFound(_)));
}
