use crate::{
    cache::StockCache,
    db::DbPool,
    entities::physical_count::{self, Entity as PhysicalCountEntity, Model as PhysicalCountModel},
    entities::stock_movement::{MovementType, StockDirection},
    errors::ServiceError,
    events::{Event, EventSender},
    services::movements::{record, NewMovement},
    services::products::require_product,
    services::stock::stock_level,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Input for reconciling one physical count against projected stock.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReconcileRequest {
    pub product_id: Uuid,
    pub location_id: Option<Uuid>,
    /// What was physically counted on the shelf
    #[validate(range(min = 0, message = "Counted quantity cannot be negative"))]
    pub counted_quantity: i32,
    /// Variance fraction treated as acceptable; falls back to the configured
    /// default when absent
    pub tolerance: Option<Decimal>,
    /// When set, an adjustment movement brings stock to the counted value
    /// whether or not the variance is within tolerance
    pub auto_adjust: bool,
    pub notes: Option<String>,
    pub counted_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationResponse {
    pub count_id: Uuid,
    pub product_id: Uuid,
    pub location_id: Option<Uuid>,
    pub system_quantity: i64,
    pub counted_quantity: i32,
    pub difference: i64,
    pub difference_percent: Decimal,
    pub within_tolerance: bool,
    /// Id of the adjustment movement, when one was written
    pub adjustment_movement_id: Option<i64>,
    pub counted_at: DateTime<Utc>,
}

/// Difference and relative variance between a count and projected stock.
/// The variance is `|difference| / system` when the projector shows stock on
/// hand, and the raw absolute difference when it shows none.
pub(crate) fn variance(system_quantity: i64, counted_quantity: i32) -> (i64, Decimal) {
    let difference = i64::from(counted_quantity) - system_quantity;
    let magnitude = Decimal::from(difference.abs());
    let percent = if system_quantity > 0 {
        magnitude / Decimal::from(system_quantity)
    } else {
        magnitude
    };
    (difference, percent)
}

/// Physical-count reconciliation: compares a shelf count against the stock
/// projector, files an immutable count record, and optionally corrects the
/// ledger with an adjustment movement. Tolerance decides only the
/// `within_tolerance` flag; whether a correction is written is the caller's
/// separate decision via `auto_adjust`.
#[derive(Clone)]
pub struct ReconciliationService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    cache: StockCache,
    default_tolerance: Decimal,
}

impl ReconciliationService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        cache: StockCache,
        default_tolerance: Decimal,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            cache,
            default_tolerance,
        }
    }

    /// Reconciles one physical count. The count record and any adjustment
    /// movement commit in the same atomic unit, and the stock read they are
    /// based on happens inside it as well.
    #[instrument(skip(self, request), fields(product_id = %request.product_id, counted = request.counted_quantity))]
    pub async fn reconcile(
        &self,
        request: ReconcileRequest,
    ) -> Result<ReconciliationResponse, ServiceError> {
        request.validate()?;

        let tolerance = request.tolerance.unwrap_or(self.default_tolerance);
        if tolerance < Decimal::ZERO || tolerance > Decimal::ONE {
            return Err(ServiceError::ValidationError(format!(
                "Tolerance must be between 0 and 1, got {}",
                tolerance
            )));
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction for reconciliation");
            ServiceError::DatabaseError(e)
        })?;

        let product = require_product(&txn, request.product_id).await?;

        let system_quantity =
            stock_level(&txn, request.product_id, request.location_id, None).await?;
        let (difference, difference_percent) = variance(system_quantity, request.counted_quantity);
        let within_tolerance = difference_percent <= tolerance;

        let count_id = Uuid::new_v4();
        let count = physical_count::ActiveModel {
            id: Set(count_id),
            product_id: Set(request.product_id),
            location_id: Set(request.location_id),
            system_quantity: Set(system_quantity),
            counted_quantity: Set(request.counted_quantity),
            difference: Set(difference),
            difference_percent: Set(difference_percent),
            within_tolerance: Set(within_tolerance),
            notes: Set(request.notes.clone()),
            counted_by: Set(request.counted_by),
            created_at: Set(Utc::now()),
        };

        let saved = count.insert(&txn).await.map_err(|e| {
            error!(error = %e, product_id = %request.product_id, "Failed to record physical count");
            ServiceError::DatabaseError(e)
        })?;

        let mut adjustment_movement_id = None;
        if request.auto_adjust && difference != 0 {
            let quantity = i32::try_from(difference.abs()).map_err(|_| {
                ServiceError::InternalError(format!(
                    "Count variance {} exceeds the supported adjustment size",
                    difference
                ))
            })?;
            let direction = if difference > 0 {
                StockDirection::In
            } else {
                StockDirection::Out
            };

            let movement = record(
                &txn,
                NewMovement {
                    product_id: request.product_id,
                    location_id: request.location_id,
                    movement_type: MovementType::Adjustment,
                    direction,
                    quantity,
                    unit_cost: product.standard_cost,
                    transaction_id: None,
                    reference: Some(format!("COUNT-{}", count_id)),
                    reason: Some("Physical count adjustment".to_string()),
                    created_by: request.counted_by,
                },
            )
            .await?;
            adjustment_movement_id = Some(movement.id);
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, count_id = %count_id, "Failed to commit reconciliation");
            ServiceError::DatabaseError(e)
        })?;

        counter!("stockledger_reconciliations.recorded", 1);
        if !within_tolerance {
            counter!("stockledger_reconciliations.out_of_tolerance", 1);
        }
        info!(
            count_id = %count_id,
            product_id = %request.product_id,
            system = system_quantity,
            counted = request.counted_quantity,
            difference = difference,
            within_tolerance = within_tolerance,
            adjusted = adjustment_movement_id.is_some(),
            "Physical count reconciled"
        );

        if adjustment_movement_id.is_some() {
            self.cache.invalidate_product(request.product_id);
        }

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::StockReconciled {
                    count_id,
                    product_id: request.product_id,
                    difference,
                    within_tolerance,
                    adjusted: adjustment_movement_id.is_some(),
                    counted_by: request.counted_by,
                })
                .await
            {
                warn!(error = %e, count_id = %count_id, "Failed to send reconciliation event");
            }
        }

        Ok(ReconciliationResponse {
            count_id: saved.id,
            product_id: saved.product_id,
            location_id: saved.location_id,
            system_quantity: saved.system_quantity,
            counted_quantity: saved.counted_quantity,
            difference: saved.difference,
            difference_percent: saved.difference_percent,
            within_tolerance: saved.within_tolerance,
            adjustment_movement_id,
            counted_at: saved.created_at,
        })
    }

    /// One count record by id.
    #[instrument(skip(self), fields(count_id = %count_id))]
    pub async fn get_count(&self, count_id: Uuid) -> Result<PhysicalCountModel, ServiceError> {
        let db = &*self.db_pool;
        PhysicalCountEntity::find_by_id(count_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, count_id = %count_id, "Failed to fetch physical count");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                warn!(count_id = %count_id, "Physical count not found");
                ServiceError::NotFound(format!("Physical count {} not found", count_id))
            })
    }

    /// Count history for a product, newest first.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn list_counts(
        &self,
        product_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<PhysicalCountModel>, u64), ServiceError> {
        let db = &*self.db_pool;

        let paginator = PhysicalCountEntity::find()
            .filter(physical_count::Column::ProductId.eq(product_id))
            .order_by_desc(physical_count::Column::CreatedAt)
            .paginate(db, per_page);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, product_id = %product_id, "Failed to count physical counts");
            ServiceError::DatabaseError(e)
        })?;

        let counts = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %product_id, page = page, "Failed to fetch physical counts page");
                ServiceError::DatabaseError(e)
            })?;

        Ok((counts, total))
    }
}
