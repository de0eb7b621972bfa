// Each test binary exercises a different slice of the harness.
#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use stockledger::{
    cache::StockCache,
    config::AppConfig,
    db::{self, DbPool},
    entities::inventory_transaction::TransactionType,
    entities::stock_movement::{MovementType, StockDirection},
    events::{process_events, EventSender},
    services::movements::{MovementService, NewMovement},
    services::products::{CreateProductRequest, ProductService},
    services::reconciliation::ReconciliationService,
    services::reversals::ReversalService,
    services::stock::StockService,
    services::transactions::{CreateTransactionRequest, TransactionItemInput, TransactionService},
    services::valuation::ValuationService,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Test harness wiring every service against a fresh in-memory SQLite
/// database with migrations applied and an event loop draining the channel.
pub struct TestEngine {
    pub db: Arc<DbPool>,
    pub actor: Uuid,
    pub products: ProductService,
    pub movements: MovementService,
    pub stock: StockService,
    pub transactions: TransactionService,
    pub reversals: ReversalService,
    pub valuation: ValuationService,
    pub reconciliation: ReconciliationService,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestEngine {
    pub async fn new() -> Self {
        let cfg = AppConfig::new("sqlite::memory:".to_string(), "test".to_string());

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db = Arc::new(pool);
        let (tx, rx) = mpsc::channel(cfg.event_channel_capacity);
        let sender = Arc::new(EventSender::new(tx));
        let event_task = tokio::spawn(process_events(rx));

        let cache = StockCache::from_config(cfg.cache());
        let tolerance = Decimal::from_f64_retain(cfg.reconciliation_tolerance)
            .expect("tolerance should convert");

        Self {
            actor: Uuid::new_v4(),
            products: ProductService::new(db.clone()),
            movements: MovementService::new(db.clone(), Some(sender.clone()), cache.clone()),
            stock: StockService::new(db.clone(), cache.clone()),
            transactions: TransactionService::new(db.clone(), Some(sender.clone()), cache.clone()),
            reversals: ReversalService::new(db.clone(), Some(sender.clone()), cache.clone()),
            valuation: ValuationService::new(db.clone()),
            reconciliation: ReconciliationService::new(db.clone(), Some(sender), cache, tolerance),
            db,
            _event_task: event_task,
        }
    }

    /// Creates a product and returns its id.
    pub async fn seed_product(&self, sku: &str, standard_cost: Option<Decimal>) -> Uuid {
        self.products
            .create_product(CreateProductRequest {
                name: format!("Product {}", sku),
                sku: sku.to_string(),
                category: None,
                standard_cost,
                reorder_point: None,
            })
            .await
            .expect("failed to seed product")
            .id
    }

    /// Appends an inbound movement straight to the ledger, bypassing the
    /// transaction layer. Used to arrange stock for a scenario.
    pub async fn receive_stock(&self, product_id: Uuid, quantity: i32, unit_cost: Option<&str>) {
        self.movements
            .append(NewMovement {
                product_id,
                location_id: None,
                movement_type: MovementType::In,
                direction: StockDirection::In,
                quantity,
                unit_cost: unit_cost.map(|c| Decimal::from_str(c).expect("cost should parse")),
                transaction_id: None,
                reference: None,
                reason: Some("test arrangement".to_string()),
                created_by: self.actor,
            })
            .await
            .expect("failed to seed stock");
    }

    pub async fn current_stock(&self, product_id: Uuid) -> i64 {
        self.stock
            .current_stock(product_id, None)
            .await
            .expect("failed to read stock")
    }
}

/// A bare request of the given type, everything optional defaulted. Tests
/// override the fields they care about.
pub fn request(
    transaction_type: TransactionType,
    created_by: Uuid,
    items: Vec<TransactionItemInput>,
) -> CreateTransactionRequest {
    CreateTransactionRequest {
        transaction_type,
        reference: None,
        counterpart_id: None,
        location_id: None,
        destination_location_id: None,
        adjustment_direction: None,
        payment_method: None,
        payment_status: None,
        notes: None,
        metadata: None,
        created_by,
        items,
    }
}

pub fn line(product_id: Uuid, quantity: i32, unit_price: Decimal) -> TransactionItemInput {
    TransactionItemInput {
        product_id,
        quantity,
        unit_price,
        discount_percent: None,
    }
}
