use crate::{
    cache::StockCache,
    db::DbPool,
    entities::stock_movement::{
        self, Entity as StockMovementEntity, Model as StockMovementModel, MovementType,
        StockDirection,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{error, instrument, warn};
use uuid::Uuid;

/// Input for appending one movement to the ledger.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub product_id: Uuid,
    pub location_id: Option<Uuid>,
    pub movement_type: MovementType,
    pub direction: StockDirection,
    pub quantity: i32,
    pub unit_cost: Option<Decimal>,
    pub transaction_id: Option<Uuid>,
    pub reference: Option<String>,
    pub reason: Option<String>,
    pub created_by: Uuid,
}

/// Appends a movement inside the caller's unit of work. Every write path in
/// the engine funnels through here, so a failed append always fails the
/// enclosing transaction rather than being dropped.
pub async fn record<C>(conn: &C, movement: NewMovement) -> Result<StockMovementModel, ServiceError>
where
    C: ConnectionTrait,
{
    if movement.quantity <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "Movement quantity must be positive, got {}",
            movement.quantity
        )));
    }

    let product_id = movement.product_id;
    let active_model = stock_movement::ActiveModel {
        product_id: Set(movement.product_id),
        location_id: Set(movement.location_id),
        movement_type: Set(movement.movement_type),
        direction: Set(movement.direction),
        quantity: Set(movement.quantity),
        unit_cost: Set(movement.unit_cost),
        transaction_id: Set(movement.transaction_id),
        reference: Set(movement.reference),
        reason: Set(movement.reason),
        created_by: Set(movement.created_by),
        ..Default::default()
    };

    let model = active_model.insert(conn).await.map_err(|e| {
        error!(error = %e, product_id = %product_id, "Failed to append stock movement");
        ServiceError::DatabaseError(e)
    })?;

    counter!("stockledger_movements.appended", 1);
    Ok(model)
}

/// All movements for a product up to `as_of` (inclusive), in replay order:
/// creation time ascending, insertion order breaking ties.
pub(crate) async fn movements_for_product<C>(
    conn: &C,
    product_id: Uuid,
    as_of: Option<DateTime<Utc>>,
) -> Result<Vec<StockMovementModel>, ServiceError>
where
    C: ConnectionTrait,
{
    let mut query = StockMovementEntity::find()
        .filter(stock_movement::Column::ProductId.eq(product_id));
    if let Some(cutoff) = as_of {
        query = query.filter(stock_movement::Column::CreatedAt.lte(cutoff));
    }
    query
        .order_by_asc(stock_movement::Column::CreatedAt)
        .order_by_asc(stock_movement::Column::Id)
        .all(conn)
        .await
        .map_err(|e| {
            error!(error = %e, product_id = %product_id, "Failed to load movements for product");
            ServiceError::DatabaseError(e)
        })
}

/// All movements emitted by one transaction, in replay order.
pub(crate) async fn movements_for_transaction<C>(
    conn: &C,
    transaction_id: Uuid,
) -> Result<Vec<StockMovementModel>, ServiceError>
where
    C: ConnectionTrait,
{
    StockMovementEntity::find()
        .filter(stock_movement::Column::TransactionId.eq(transaction_id))
        .order_by_asc(stock_movement::Column::CreatedAt)
        .order_by_asc(stock_movement::Column::Id)
        .all(conn)
        .await
        .map_err(|e| {
            error!(error = %e, transaction_id = %transaction_id, "Failed to load movements for transaction");
            ServiceError::DatabaseError(e)
        })
}

/// Append-only store of stock movements. The ledger is the source of truth
/// for every projection and valuation in the engine.
#[derive(Clone)]
pub struct MovementService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    cache: StockCache,
}

impl MovementService {
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

    /// Appends a single standalone movement as its own atomic write.
    #[instrument(skip(self, movement), fields(product_id = %movement.product_id, quantity = movement.quantity))]
    pub async fn append(&self, movement: NewMovement) -> Result<StockMovementModel, ServiceError> {
        let db = &*self.db_pool;
        let model = record(db, movement).await?;
        self.cache.invalidate_product(model.product_id);

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::MovementRecorded {
                    movement_id: model.id,
                    product_id: model.product_id,
                    direction: model.direction,
                    quantity: model.quantity,
                    transaction_id: model.transaction_id,
                })
                .await
            {
                warn!(error = %e, movement_id = model.id, "Failed to send movement event");
            }
        }

        Ok(model)
    }

    /// Movement history for a product in replay order, optionally bounded by
    /// a cutoff instant.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn list_for_product(
        &self,
        product_id: Uuid,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<StockMovementModel>, ServiceError> {
        let db = &*self.db_pool;
        movements_for_product(db, product_id, as_of).await
    }

    /// Movement history for a product, newest first, paginated for browsing.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn list_for_product_paginated(
        &self,
        product_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<StockMovementModel>, u64), ServiceError> {
        let db = &*self.db_pool;

        let paginator = StockMovementEntity::find()
            .filter(stock_movement::Column::ProductId.eq(product_id))
            .order_by_desc(stock_movement::Column::CreatedAt)
            .order_by_desc(stock_movement::Column::Id)
            .paginate(db, per_page);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, product_id = %product_id, "Failed to count movements");
            ServiceError::DatabaseError(e)
        })?;

        let movements = paginator.fetch_page(page.saturating_sub(1)).await.map_err(|e| {
            error!(error = %e, product_id = %product_id, page = page, "Failed to fetch movements page");
            ServiceError::DatabaseError(e)
        })?;

        Ok((movements, total))
    }

    /// Movements emitted by one transaction, including any reversals that
    /// reference it.
    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    pub async fn list_for_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Vec<StockMovementModel>, ServiceError> {
        let db = &*self.db_pool;
        movements_for_transaction(db, transaction_id).await
    }
}
