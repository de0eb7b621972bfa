//! Integration tests for the valuation engine.
//!
//! Tests cover:
//! - FIFO and LIFO diverging on the same movement history
//! - Average costing from the mean of costed inbound movements
//! - Standard-cost fallback for costless histories
//! - Point-in-time valuation with an as-of cutoff
//! - Method parsing through the string entry point
//! - Catalog and per-category rollups

mod common;

use common::{line, request, TestEngine};
use rust_decimal_macros::dec;
use std::time::Duration;
use stockledger::entities::inventory_transaction::TransactionType;
use stockledger::errors::ServiceError;
use stockledger::services::valuation::CostingMethod;

/// Builds the canonical divergence history: 10 units at 1.00, 10 more at
/// 2.00, then 12 sold. FIFO keeps 8 at 2.00; LIFO keeps 8 at 1.00.
async fn divergence_fixture(engine: &TestEngine) -> uuid::Uuid {
    let product = engine.seed_product("VAL-SKU", None).await;
    engine
        .transactions
        .create_transaction(request(
            TransactionType::Purchase,
            engine.actor,
            vec![line(product, 10, dec!(1.00))],
        ))
        .await
        .expect("first purchase");
    engine
        .transactions
        .create_transaction(request(
            TransactionType::Purchase,
            engine.actor,
            vec![line(product, 10, dec!(2.00))],
        ))
        .await
        .expect("second purchase");
    engine
        .transactions
        .create_transaction(request(
            TransactionType::Sale,
            engine.actor,
            vec![line(product, 12, dec!(5.00))],
        ))
        .await
        .expect("sale");
    product
}

#[tokio::test]
async fn fifo_and_lifo_value_the_same_history_differently() {
    let engine = TestEngine::new().await;
    let product = divergence_fixture(&engine).await;

    let fifo = engine
        .valuation
        .value_product(product, CostingMethod::Fifo, None)
        .await
        .expect("fifo valuation");
    assert_eq!(fifo.quantity, 8);
    assert_eq!(fifo.total_value, dec!(16.00));

    let lifo = engine
        .valuation
        .value_product(product, CostingMethod::Lifo, None)
        .await
        .expect("lifo valuation");
    assert_eq!(lifo.quantity, 8);
    assert_eq!(lifo.total_value, dec!(8.00));
}

#[tokio::test]
async fn average_uses_the_mean_of_inbound_costs() {
    let engine = TestEngine::new().await;
    let product = divergence_fixture(&engine).await;

    // Mean of 1.00 and 2.00 is 1.50; 8 units on hand.
    let average = engine
        .valuation
        .value_product(product, CostingMethod::Average, None)
        .await
        .expect("average valuation");
    assert_eq!(average.quantity, 8);
    assert_eq!(average.total_value, dec!(12.00));
}

#[tokio::test]
async fn costless_movements_fall_back_to_standard_cost() {
    let engine = TestEngine::new().await;
    let product = engine.seed_product("VAL-STD", Some(dec!(3.50))).await;
    engine.receive_stock(product, 4, None).await;

    let valuation = engine
        .valuation
        .value_product(product, CostingMethod::Fifo, None)
        .await
        .expect("valuation");
    assert_eq!(valuation.quantity, 4);
    assert_eq!(valuation.total_value, dec!(14.00));
}

#[tokio::test]
async fn as_of_cutoff_ignores_later_movements() {
    let engine = TestEngine::new().await;
    let product = engine.seed_product("VAL-ASOF", None).await;

    engine
        .transactions
        .create_transaction(request(
            TransactionType::Purchase,
            engine.actor,
            vec![line(product, 10, dec!(1.00))],
        ))
        .await
        .expect("first purchase");

    // Let the clock tick so the cutoff falls strictly between the purchases.
    tokio::time::sleep(Duration::from_millis(25)).await;
    let cutoff = chrono::Utc::now();
    tokio::time::sleep(Duration::from_millis(25)).await;

    engine
        .transactions
        .create_transaction(request(
            TransactionType::Purchase,
            engine.actor,
            vec![line(product, 10, dec!(5.00))],
        ))
        .await
        .expect("second purchase");

    let now = engine
        .valuation
        .value_product(product, CostingMethod::Fifo, None)
        .await
        .expect("current valuation");
    assert_eq!(now.quantity, 20);
    assert_eq!(now.total_value, dec!(60.00));

    let then = engine
        .valuation
        .value_product(product, CostingMethod::Fifo, Some(cutoff))
        .await
        .expect("historical valuation");
    assert_eq!(then.quantity, 10);
    assert_eq!(then.total_value, dec!(10.00));
    assert_eq!(then.as_of, Some(cutoff));
}

#[tokio::test]
async fn string_entry_point_parses_methods_case_insensitively() {
    let engine = TestEngine::new().await;
    let product = divergence_fixture(&engine).await;

    let value = engine
        .valuation
        .value_as_of(product, "fifo", None)
        .await
        .expect("string-keyed valuation");
    assert_eq!(value, dec!(16.00));

    let err = engine
        .valuation
        .value_as_of(product, "weighted", None)
        .await
        .expect_err("unknown method should fail");
    assert!(
        matches!(err, ServiceError::ValidationError(_)),
        "expected a validation error, got {:?}",
        err
    );
}

#[tokio::test]
async fn catalog_valuation_sums_every_product() {
    let engine = TestEngine::new().await;
    let cheap = engine.seed_product("CAT-CHEAP", None).await;
    let dear = engine.seed_product("CAT-DEAR", None).await;
    engine.receive_stock(cheap, 10, Some("1.00")).await;
    engine.receive_stock(dear, 2, Some("50.00")).await;

    let catalog = engine
        .valuation
        .value_catalog(CostingMethod::Fifo, None)
        .await
        .expect("catalog valuation");
    assert_eq!(catalog.products.len(), 2);
    assert_eq!(catalog.total_value, dec!(110.00));
    assert_eq!(
        catalog.total_value,
        catalog
            .products
            .iter()
            .map(|p| p.total_value)
            .sum::<rust_decimal::Decimal>()
    );
}

async fn seed_categorized(engine: &TestEngine, name: &str, sku: &str) -> uuid::Uuid {
    engine
        .products
        .create_product(stockledger::services::products::CreateProductRequest {
            name: name.to_string(),
            sku: sku.to_string(),
            category: Some("hardware".to_string()),
            standard_cost: None,
            reorder_point: None,
        })
        .await
        .expect("product")
        .id
}

#[tokio::test]
async fn category_rollup_groups_by_product_category() {
    let engine = TestEngine::new().await;

    let anvil = seed_categorized(&engine, "Anvil", "CAT-ANVIL").await;
    let hammer = seed_categorized(&engine, "Hammer", "CAT-HAMMER").await;
    let uncategorized = engine.seed_product("CAT-NONE", None).await;

    engine.receive_stock(anvil, 1, Some("30.00")).await;
    engine.receive_stock(hammer, 2, Some("10.00")).await;
    engine.receive_stock(uncategorized, 5, Some("2.00")).await;

    let rollup = engine
        .valuation
        .value_by_category(CostingMethod::Fifo, None)
        .await
        .expect("category rollup");

    let hardware_total = rollup
        .iter()
        .find(|c| c.category.as_deref() == Some("hardware"))
        .expect("hardware bucket")
        .total_value;
    assert_eq!(hardware_total, dec!(50.00));

    let uncategorized_total = rollup
        .iter()
        .find(|c| c.category.is_none())
        .expect("uncategorized bucket")
        .total_value;
    assert_eq!(uncategorized_total, dec!(10.00));
}

#[tokio::test]
async fn unknown_product_valuation_fails_with_not_found() {
    let engine = TestEngine::new().await;
    let err = engine
        .valuation
        .value_product(uuid::Uuid::new_v4(), CostingMethod::Fifo, None)
        .await
        .expect_err("unknown product should fail");
    assert!(matches!(err, ServiceError::NotFound(_)));
}
