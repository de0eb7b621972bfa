use crate::{
    cache::StockCache,
    db::DbPool,
    entities::product::{self, Entity as ProductEntity},
    entities::stock_movement::{self, Entity as StockMovementEntity},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, instrument};
use uuid::Uuid;

/// Folds the movement ledger into a stock level inside the caller's unit of
/// work. Appends are atomic, so the fold always sees a consistent snapshot;
/// callers that need check-then-write semantics must run both inside the
/// same transaction.
pub async fn stock_level<C>(
    conn: &C,
    product_id: Uuid,
    location_id: Option<Uuid>,
    as_of: Option<DateTime<Utc>>,
) -> Result<i64, ServiceError>
where
    C: ConnectionTrait,
{
    let mut query =
        StockMovementEntity::find().filter(stock_movement::Column::ProductId.eq(product_id));
    if let Some(location) = location_id {
        query = query.filter(stock_movement::Column::LocationId.eq(location));
    }
    if let Some(cutoff) = as_of {
        query = query.filter(stock_movement::Column::CreatedAt.lte(cutoff));
    }

    let movements = query.all(conn).await.map_err(|e| {
        error!(error = %e, product_id = %product_id, "Failed to load movements for stock projection");
        ServiceError::DatabaseError(e)
    })?;

    Ok(movements.iter().map(|m| m.signed_quantity()).sum())
}

/// Stock at one location scope. `location_id: None` covers movements that
/// were recorded without a location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationStock {
    pub location_id: Option<Uuid>,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowStockItem {
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub reorder_point: i32,
}

/// Stock projector: derives current and historical stock levels from the
/// movement ledger, with a read-through cache for "as of now" lookups.
#[derive(Clone)]
pub struct StockService {
    db_pool: Arc<DbPool>,
    cache: StockCache,
}

impl StockService {
    pub fn new(db_pool: Arc<DbPool>, cache: StockCache) -> Self {
        Self { db_pool, cache }
    }

    /// Current stock for a product, optionally scoped to one location.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn current_stock(
        &self,
        product_id: Uuid,
        location_id: Option<Uuid>,
    ) -> Result<i64, ServiceError> {
        if let Some(cached) = self.cache.get(product_id, location_id) {
            return Ok(cached);
        }

        let db = &*self.db_pool;
        let quantity = stock_level(db, product_id, location_id, None).await?;
        self.cache.put(product_id, location_id, quantity);
        Ok(quantity)
    }

    /// Stock as of a past instant. Historical queries bypass the cache.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn stock_as_of(
        &self,
        product_id: Uuid,
        location_id: Option<Uuid>,
        as_of: DateTime<Utc>,
    ) -> Result<i64, ServiceError> {
        let db = &*self.db_pool;
        stock_level(db, product_id, location_id, Some(as_of)).await
    }

    /// Current stock broken down by location, including movements recorded
    /// without one.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn stock_by_location(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<LocationStock>, ServiceError> {
        let db = &*self.db_pool;

        let movements = StockMovementEntity::find()
            .filter(stock_movement::Column::ProductId.eq(product_id))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %product_id, "Failed to load movements for location breakdown");
                ServiceError::DatabaseError(e)
            })?;

        let mut by_location: HashMap<Option<Uuid>, i64> = HashMap::new();
        for movement in &movements {
            *by_location.entry(movement.location_id).or_insert(0) += movement.signed_quantity();
        }

        let mut breakdown: Vec<LocationStock> = by_location
            .into_iter()
            .map(|(location_id, quantity)| LocationStock {
                location_id,
                quantity,
            })
            .collect();
        breakdown.sort_by_key(|entry| entry.location_id);
        Ok(breakdown)
    }

    /// Products whose current stock has fallen to or below their configured
    /// reorder point.
    #[instrument(skip(self))]
    pub async fn list_low_stock(&self) -> Result<Vec<LowStockItem>, ServiceError> {
        let db = &*self.db_pool;

        let products = ProductEntity::find()
            .filter(product::Column::ReorderPoint.is_not_null())
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to load products for low stock check");
                ServiceError::DatabaseError(e)
            })?;

        let mut low_stock = Vec::new();
        for product in products {
            let reorder_point = match product.reorder_point {
                Some(point) => point,
                None => continue,
            };
            let quantity = self.current_stock(product.id, None).await?;
            if quantity <= i64::from(reorder_point) {
                low_stock.push(LowStockItem {
                    product_id: product.id,
                    sku: product.sku,
                    name: product.name,
                    quantity,
                    reorder_point,
                });
            }
        }
        Ok(low_stock)
    }
}
