//! Concurrency and atomicity tests for the movement ledger.
//!
//! The sufficiency check and the movement writes share one unit of work, so
//! concurrent sales must never drive stock negative and a failed creation
//! must leave no partial rows behind.

mod common;

use common::{line, request, TestEngine};
use rust_decimal_macros::dec;
use sea_orm::TransactionTrait;
use stockledger::entities::inventory_transaction::TransactionType;
use stockledger::entities::stock_movement::{MovementType, StockDirection};
use stockledger::errors::ServiceError;
use stockledger::services::movements::{self, NewMovement};
use uuid::Uuid;

#[tokio::test]
async fn concurrent_sales_never_oversell() {
    let engine = TestEngine::new().await;
    let product = engine.seed_product("CONC-SKU", None).await;
    engine.receive_stock(product, 10, None).await;

    // 20 concurrent sales of 1 unit against 10 on hand.
    let mut tasks = vec![];
    for _ in 0..20 {
        let svc = engine.transactions.clone();
        let actor = engine.actor;
        tasks.push(tokio::spawn(async move {
            svc.create_transaction(request(
                TransactionType::Sale,
                actor,
                vec![line(product, 1, dec!(5.00))],
            ))
            .await
            .is_ok()
        }));
    }

    let mut successes = 0;
    for task in tasks {
        if task.await.unwrap_or(false) {
            successes += 1;
        }
    }

    assert_eq!(
        successes, 10,
        "exactly 10 of 20 unit sales should succeed against 10 on hand; got {}",
        successes
    );
    assert_eq!(engine.current_stock(product).await, 0);
}

#[tokio::test]
async fn interleaved_purchases_and_sales_conserve_stock() {
    let engine = TestEngine::new().await;
    let product = engine.seed_product("CONS-SKU", None).await;

    let mut tasks = vec![];
    for i in 0..20 {
        let svc = engine.transactions.clone();
        let actor = engine.actor;
        let selling = i % 2 == 1;
        tasks.push(tokio::spawn(async move {
            let req = if selling {
                request(
                    TransactionType::Sale,
                    actor,
                    vec![line(product, 2, dec!(5.00))],
                )
            } else {
                request(
                    TransactionType::Purchase,
                    actor,
                    vec![line(product, 3, dec!(2.00))],
                )
            };
            (selling, svc.create_transaction(req).await.is_ok())
        }));
    }

    let mut sales = 0;
    for task in tasks {
        let (selling, succeeded) = task.await.expect("task should not panic");
        if selling {
            if succeeded {
                sales += 1;
            }
        } else {
            assert!(succeeded, "purchases have no sufficiency gate");
        }
    }

    // Every purchase adds 3; every successful sale removes 2. Whatever the
    // interleaving, the projection must account for exactly those writes.
    let expected = 10 * 3 - sales * 2;
    let stock = engine.current_stock(product).await;
    assert_eq!(stock, expected);
    assert!(stock >= 0, "stock must never go negative, got {}", stock);
}

#[tokio::test]
async fn failed_creation_leaves_no_partial_rows() {
    let engine = TestEngine::new().await;
    let product = engine.seed_product("ATOM-SKU", None).await;
    engine.receive_stock(product, 10, None).await;

    // The second line references an unknown product, so the whole
    // transaction must fail after the first line was already validated.
    let err = engine
        .transactions
        .create_transaction(request(
            TransactionType::Sale,
            engine.actor,
            vec![
                line(product, 2, dec!(5.00)),
                line(Uuid::new_v4(), 1, dec!(5.00)),
            ],
        ))
        .await
        .expect_err("unknown product should sink the transaction");
    assert!(matches!(err, ServiceError::NotFound(_)));

    assert_eq!(engine.current_stock(product).await, 10);
    let listing = engine
        .transactions
        .list_transactions(1, 10, Some(TransactionType::Sale), None)
        .await
        .expect("listing should succeed");
    assert_eq!(listing.total, 0, "no sale row may survive the failure");

    let trail = engine
        .movements
        .list_for_product(product, None)
        .await
        .expect("movements should load");
    assert_eq!(trail.len(), 1, "only the seed movement exists");
}

#[tokio::test]
async fn uncommitted_movements_are_rolled_back() {
    let engine = TestEngine::new().await;
    let product = engine.seed_product("ROLLBACK-SKU", None).await;
    engine.receive_stock(product, 5, None).await;

    // Append inside an explicit unit of work, then abandon it.
    let txn = engine.db.begin().await.expect("begin");
    movements::record(
        &txn,
        NewMovement {
            product_id: product,
            location_id: None,
            movement_type: MovementType::Out,
            direction: StockDirection::Out,
            quantity: 5,
            unit_cost: None,
            transaction_id: None,
            reference: None,
            reason: Some("abandoned write".to_string()),
            created_by: engine.actor,
        },
    )
    .await
    .expect("record inside the unit of work");
    txn.rollback().await.expect("rollback");

    assert_eq!(engine.current_stock(product).await, 5);
    let trail = engine
        .movements
        .list_for_product(product, None)
        .await
        .expect("movements should load");
    assert_eq!(trail.len(), 1, "the rolled-back movement must not persist");
}
