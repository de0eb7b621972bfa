use crate::{
    cache::StockCache,
    db::DbPool,
    entities::inventory_transaction::{
        self, Entity as TransactionEntity, Model as TransactionModel, TransactionStatus,
        TransactionType,
    },
    entities::product::Model as ProductModel,
    entities::stock_movement::{Model as StockMovementModel, MovementType, StockDirection},
    entities::transaction_item::{
        self, Entity as TransactionItemEntity, Model as TransactionItemModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::movements::{record, NewMovement},
    services::products::require_product,
    services::stock::stock_level,
};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Bounded retries when a generated reference collides with an existing one.
/// The unique index on the reference column stays the final arbiter for
/// writers racing on the same candidate.
const REFERENCE_ATTEMPTS: u32 = 5;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct TransactionItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount_percent: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateTransactionRequest {
    pub transaction_type: TransactionType,
    /// Caller-supplied reference; generated from the transaction type when
    /// absent.
    #[validate(length(min = 1, max = 64, message = "Reference must be 1-64 characters"))]
    pub reference: Option<String>,
    /// Customer or supplier, opaque to the engine.
    pub counterpart_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    /// Target location; required for transfers.
    pub destination_location_id: Option<Uuid>,
    /// Stock direction for adjustment transactions, supplied by the caller.
    pub adjustment_direction: Option<StockDirection>,
    pub payment_method: Option<String>,
    pub payment_status: Option<String>,
    pub notes: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_by: Uuid,
    #[validate(length(min = 1, message = "Transaction requires at least one item"))]
    pub items: Vec<TransactionItemInput>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
    pub discount_amount: Decimal,
    pub gross_amount: Decimal,
    pub net_amount: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub transaction_type: TransactionType,
    pub reference: String,
    pub counterpart_id: Option<Uuid>,
    pub total_amount: Decimal,
    pub total_discount: Decimal,
    pub total_items: i32,
    pub payment_method: Option<String>,
    pub payment_status: String,
    pub status: TransactionStatus,
    pub notes: Option<String>,
    pub location_id: Option<Uuid>,
    pub destination_location_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub items: Vec<TransactionItemResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionListResponse {
    pub transactions: Vec<TransactionResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

struct ItemAmounts {
    gross: Decimal,
    discount: Decimal,
    net: Decimal,
}

fn compute_item_amounts(
    quantity: i32,
    unit_price: Decimal,
    discount_percent: Decimal,
) -> ItemAmounts {
    let gross = unit_price * Decimal::from(quantity);
    let discount = gross * discount_percent / Decimal::ONE_HUNDRED;
    let net = gross - discount;
    ItemAmounts {
        gross,
        discount,
        net,
    }
}

fn generate_reference(transaction_type: TransactionType) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    format!(
        "{}-{}-{:04}",
        transaction_type.reference_prefix(),
        Utc::now().timestamp_millis(),
        suffix
    )
}

fn validate_request(request: &CreateTransactionRequest) -> Result<(), ServiceError> {
    request
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    for item in &request.items {
        item.validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if item.unit_price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Unit price must be positive for product {}",
                item.product_id
            )));
        }
        if let Some(percent) = item.discount_percent {
            if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
                return Err(ServiceError::ValidationError(format!(
                    "Discount percent must be between 0 and 100 for product {}",
                    item.product_id
                )));
            }
        }
    }

    match request.transaction_type {
        TransactionType::Transfer => {
            let (source, destination) =
                match (request.location_id, request.destination_location_id) {
                    (Some(source), Some(destination)) => (source, destination),
                    _ => {
                        return Err(ServiceError::ValidationError(
                            "Transfer transactions require a source and a destination location"
                                .to_string(),
                        ))
                    }
                };
            if source == destination {
                return Err(ServiceError::ValidationError(
                    "Transfer source and destination locations must differ".to_string(),
                ));
            }
        }
        TransactionType::Adjustment => {
            if request.adjustment_direction.is_none() {
                return Err(ServiceError::ValidationError(
                    "Adjustment transactions require an explicit stock direction".to_string(),
                ));
            }
        }
        _ => {}
    }

    Ok(())
}

async fn reference_exists<C>(conn: &C, reference: &str) -> Result<bool, ServiceError>
where
    C: ConnectionTrait,
{
    let count = TransactionEntity::find()
        .filter(inventory_transaction::Column::Reference.eq(reference))
        .count(conn)
        .await
        .map_err(|e| {
            error!(error = %e, reference = %reference, "Failed to check reference uniqueness");
            ServiceError::DatabaseError(e)
        })?;
    Ok(count > 0)
}

/// Settles on a unique reference inside the caller's unit of work: verifies
/// a supplied one, or generates with bounded retries.
async fn resolve_reference<C>(
    conn: &C,
    supplied: Option<&str>,
    transaction_type: TransactionType,
) -> Result<String, ServiceError>
where
    C: ConnectionTrait,
{
    if let Some(reference) = supplied {
        if reference_exists(conn, reference).await? {
            return Err(ServiceError::ValidationError(format!(
                "Transaction reference {} is already in use",
                reference
            )));
        }
        return Ok(reference.to_string());
    }

    for _ in 0..REFERENCE_ATTEMPTS {
        let candidate = generate_reference(transaction_type);
        if !reference_exists(conn, &candidate).await? {
            return Ok(candidate);
        }
    }
    Err(ServiceError::InternalError(
        "Failed to generate a unique transaction reference".to_string(),
    ))
}

pub(crate) async fn items_for_transaction<C>(
    conn: &C,
    transaction_id: Uuid,
) -> Result<Vec<TransactionItemModel>, ServiceError>
where
    C: ConnectionTrait,
{
    TransactionItemEntity::find()
        .filter(transaction_item::Column::TransactionId.eq(transaction_id))
        .order_by_asc(transaction_item::Column::CreatedAt)
        .all(conn)
        .await
        .map_err(|e| {
            error!(error = %e, transaction_id = %transaction_id, "Failed to load transaction items");
            ServiceError::DatabaseError(e)
        })
}

pub(crate) fn build_response(
    transaction: TransactionModel,
    items: Vec<TransactionItemModel>,
) -> TransactionResponse {
    TransactionResponse {
        id: transaction.id,
        transaction_type: transaction.transaction_type,
        reference: transaction.reference,
        counterpart_id: transaction.counterpart_id,
        total_amount: transaction.total_amount,
        total_discount: transaction.total_discount,
        total_items: transaction.total_items,
        payment_method: transaction.payment_method,
        payment_status: transaction.payment_status,
        status: transaction.status,
        notes: transaction.notes,
        location_id: transaction.location_id,
        destination_location_id: transaction.destination_location_id,
        metadata: transaction.metadata,
        created_by: transaction.created_by,
        created_at: transaction.created_at,
        updated_at: transaction.updated_at,
        items: items
            .into_iter()
            .map(|item| TransactionItemResponse {
                id: item.id,
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                discount_percent: item.discount_percent,
                discount_amount: item.discount_amount,
                gross_amount: item.gross_amount,
                net_amount: item.net_amount,
            })
            .collect(),
    }
}

/// Transaction ledger: groups line items into one atomic business event and
/// appends the stock movements that event implies. The transaction row, its
/// items and its movements commit together or not at all.
#[derive(Clone)]
pub struct TransactionService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    cache: StockCache,
}

impl TransactionService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        cache: StockCache,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            cache,
        }
    }

    /// Creates a transaction with its line items and movements.
    ///
    /// Sale transactions check stock sufficiency per product inside the same
    /// unit of work that appends the movements, so two concurrent sales
    /// cannot both pass the check and drive stock negative.
    #[instrument(skip(self, request), fields(transaction_type = %request.transaction_type, item_count = request.items.len()))]
    pub async fn create_transaction(
        &self,
        request: CreateTransactionRequest,
    ) -> Result<TransactionResponse, ServiceError> {
        let started = Instant::now();
        validate_request(&request)?;

        let db = &*self.db_pool;
        let now = Utc::now();
        let transaction_id = Uuid::new_v4();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction creation unit of work");
            ServiceError::DatabaseError(e)
        })?;

        let mut products: HashMap<Uuid, ProductModel> = HashMap::new();
        for item in &request.items {
            if !products.contains_key(&item.product_id) {
                let product = require_product(&txn, item.product_id).await?;
                products.insert(item.product_id, product);
            }
        }

        if request.transaction_type == TransactionType::Sale {
            // Line items for the same product draw on the same stock, so
            // their quantities are summed before the check.
            let mut required: HashMap<Uuid, i64> = HashMap::new();
            for item in &request.items {
                *required.entry(item.product_id).or_insert(0) += i64::from(item.quantity);
            }
            for (product_id, requested) in &required {
                let available = stock_level(&txn, *product_id, None, None).await?;
                if available < *requested {
                    return Err(ServiceError::InsufficientStock(format!(
                        "Insufficient stock for product {}: requested {}, available {}",
                        product_id, requested, available
                    )));
                }
            }
        }

        let reference =
            resolve_reference(&txn, request.reference.as_deref(), request.transaction_type)
                .await?;

        let mut total_amount = Decimal::ZERO;
        let mut total_discount = Decimal::ZERO;
        let mut total_items: i32 = 0;
        for item in &request.items {
            let amounts = compute_item_amounts(
                item.quantity,
                item.unit_price,
                item.discount_percent.unwrap_or(Decimal::ZERO),
            );
            total_amount += amounts.net;
            total_discount += amounts.discount;
            total_items += item.quantity;
        }

        let transaction_model = inventory_transaction::ActiveModel {
            id: Set(transaction_id),
            transaction_type: Set(request.transaction_type),
            reference: Set(reference.clone()),
            counterpart_id: Set(request.counterpart_id),
            total_amount: Set(total_amount),
            total_discount: Set(total_discount),
            total_items: Set(total_items),
            payment_method: Set(request.payment_method.clone()),
            payment_status: Set(request
                .payment_status
                .clone()
                .unwrap_or_else(|| "pending".to_string())),
            status: Set(TransactionStatus::Completed),
            notes: Set(request.notes.clone()),
            location_id: Set(request.location_id),
            destination_location_id: Set(request.destination_location_id),
            metadata: Set(request.metadata.clone()),
            created_by: Set(request.created_by),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, transaction_id = %transaction_id, "Failed to create transaction row");
            ServiceError::DatabaseError(e)
        })?;

        let mut item_models = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let amounts = compute_item_amounts(
                item.quantity,
                item.unit_price,
                item.discount_percent.unwrap_or(Decimal::ZERO),
            );
            let item_model = transaction_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                transaction_id: Set(transaction_id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
                discount_percent: Set(item.discount_percent.unwrap_or(Decimal::ZERO)),
                discount_amount: Set(amounts.discount),
                gross_amount: Set(amounts.gross),
                net_amount: Set(amounts.net),
                created_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, transaction_id = %transaction_id, product_id = %item.product_id, "Failed to create transaction item");
                ServiceError::DatabaseError(e)
            })?;
            item_models.push(item_model);
        }

        let mut movements: Vec<StockMovementModel> = Vec::new();
        for item in &request.items {
            match request.transaction_type {
                TransactionType::Transfer => {
                    movements.push(
                        record(
                            &txn,
                            NewMovement {
                                product_id: item.product_id,
                                location_id: request.location_id,
                                movement_type: MovementType::Transfer,
                                direction: StockDirection::Out,
                                quantity: item.quantity,
                                unit_cost: Some(item.unit_price),
                                transaction_id: Some(transaction_id),
                                reference: Some(reference.clone()),
                                reason: None,
                                created_by: request.created_by,
                            },
                        )
                        .await?,
                    );
                    movements.push(
                        record(
                            &txn,
                            NewMovement {
                                product_id: item.product_id,
                                location_id: request.destination_location_id,
                                movement_type: MovementType::Transfer,
                                direction: StockDirection::In,
                                quantity: item.quantity,
                                unit_cost: Some(item.unit_price),
                                transaction_id: Some(transaction_id),
                                reference: Some(reference.clone()),
                                reason: None,
                                created_by: request.created_by,
                            },
                        )
                        .await?,
                    );
                }
                TransactionType::Adjustment => {
                    let direction = request.adjustment_direction.ok_or_else(|| {
                        ServiceError::ValidationError(
                            "Adjustment transactions require an explicit stock direction"
                                .to_string(),
                        )
                    })?;
                    movements.push(
                        record(
                            &txn,
                            NewMovement {
                                product_id: item.product_id,
                                location_id: request.location_id,
                                movement_type: MovementType::Adjustment,
                                direction,
                                quantity: item.quantity,
                                unit_cost: Some(item.unit_price),
                                transaction_id: Some(transaction_id),
                                reference: Some(reference.clone()),
                                reason: None,
                                created_by: request.created_by,
                            },
                        )
                        .await?,
                    );
                }
                other => {
                    let direction = other.stock_direction().ok_or_else(|| {
                        ServiceError::InternalError(format!(
                            "No implicit stock direction for {} transactions",
                            other
                        ))
                    })?;
                    let movement_type = match direction {
                        StockDirection::In => MovementType::In,
                        StockDirection::Out => MovementType::Out,
                    };
                    movements.push(
                        record(
                            &txn,
                            NewMovement {
                                product_id: item.product_id,
                                location_id: request.location_id,
                                movement_type,
                                direction,
                                quantity: item.quantity,
                                unit_cost: Some(item.unit_price),
                                transaction_id: Some(transaction_id),
                                reference: Some(reference.clone()),
                                reason: None,
                                created_by: request.created_by,
                            },
                        )
                        .await?,
                    );
                }
            }
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, transaction_id = %transaction_id, "Failed to commit transaction creation");
            ServiceError::DatabaseError(e)
        })?;

        counter!("stockledger_transactions.created", 1);
        histogram!(
            "stockledger_transactions.create_duration",
            started.elapsed()
        );
        info!(
            transaction_id = %transaction_id,
            reference = %reference,
            transaction_type = %request.transaction_type,
            total_amount = %total_amount,
            movement_count = movements.len(),
            "Transaction recorded"
        );

        for product_id in products.keys() {
            self.cache.invalidate_product(*product_id);
        }

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::TransactionCreated {
                    transaction_id,
                    transaction_type: request.transaction_type,
                    reference: reference.clone(),
                    total_amount,
                    total_items,
                    created_by: request.created_by,
                })
                .await
            {
                warn!(error = %e, transaction_id = %transaction_id, "Failed to send transaction created event");
            }

            if matches!(
                request.transaction_type,
                TransactionType::Sale | TransactionType::Damage
            ) {
                for (product_id, product) in &products {
                    let Some(reorder_point) = product.reorder_point else {
                        continue;
                    };
                    match stock_level(db, *product_id, None, None).await {
                        Ok(quantity) if quantity <= i64::from(reorder_point) => {
                            if let Err(e) = event_sender
                                .send(Event::LowStockDetected {
                                    product_id: *product_id,
                                    current_stock: quantity,
                                    reorder_point,
                                })
                                .await
                            {
                                warn!(error = %e, product_id = %product_id, "Failed to send low stock event");
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, product_id = %product_id, "Failed to probe stock for low stock alert");
                        }
                    }
                }
            }
        }

        Ok(build_response(transaction_model, item_models))
    }

    /// Retrieves a transaction with its line items
    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    pub async fn get_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<TransactionResponse>, ServiceError> {
        let db = &*self.db_pool;

        let transaction = TransactionEntity::find_by_id(transaction_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, transaction_id = %transaction_id, "Failed to fetch transaction");
                ServiceError::DatabaseError(e)
            })?;

        match transaction {
            Some(model) => {
                let items = items_for_transaction(db, model.id).await?;
                Ok(Some(build_response(model, items)))
            }
            None => Ok(None),
        }
    }

    /// Retrieves a transaction by its human-readable reference
    #[instrument(skip(self), fields(reference = %reference))]
    pub async fn get_transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<TransactionResponse>, ServiceError> {
        let db = &*self.db_pool;

        let transaction = TransactionEntity::find()
            .filter(inventory_transaction::Column::Reference.eq(reference))
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, reference = %reference, "Failed to fetch transaction by reference");
                ServiceError::DatabaseError(e)
            })?;

        match transaction {
            Some(model) => {
                let items = items_for_transaction(db, model.id).await?;
                Ok(Some(build_response(model, items)))
            }
            None => Ok(None),
        }
    }

    /// Lists transactions newest first, optionally filtered by type and
    /// status.
    #[instrument(skip(self))]
    pub async fn list_transactions(
        &self,
        page: u64,
        per_page: u64,
        transaction_type: Option<TransactionType>,
        status: Option<TransactionStatus>,
    ) -> Result<TransactionListResponse, ServiceError> {
        let db = &*self.db_pool;

        let mut query = TransactionEntity::find();
        if let Some(kind) = transaction_type {
            query = query.filter(inventory_transaction::Column::TransactionType.eq(kind));
        }
        if let Some(status) = status {
            query = query.filter(inventory_transaction::Column::Status.eq(status));
        }

        let paginator = query
            .order_by_desc(inventory_transaction::Column::CreatedAt)
            .paginate(db, per_page);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count transactions");
            ServiceError::DatabaseError(e)
        })?;

        let transactions = paginator.fetch_page(page.saturating_sub(1)).await.map_err(|e| {
            error!(error = %e, page = page, per_page = per_page, "Failed to fetch transactions page");
            ServiceError::DatabaseError(e)
        })?;

        let ids: Vec<Uuid> = transactions.iter().map(|t| t.id).collect();
        let mut items_by_transaction: HashMap<Uuid, Vec<TransactionItemModel>> = HashMap::new();
        if !ids.is_empty() {
            let items = TransactionItemEntity::find()
                .filter(transaction_item::Column::TransactionId.is_in(ids))
                .all(db)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to load items for transaction list");
                    ServiceError::DatabaseError(e)
                })?;
            for item in items {
                items_by_transaction
                    .entry(item.transaction_id)
                    .or_default()
                    .push(item);
            }
        }

        let responses: Vec<TransactionResponse> = transactions
            .into_iter()
            .map(|transaction| {
                let items = items_by_transaction
                    .remove(&transaction.id)
                    .unwrap_or_default();
                build_response(transaction, items)
            })
            .collect();

        Ok(TransactionListResponse {
            transactions: responses,
            total,
            page,
            per_page,
        })
    }
}
