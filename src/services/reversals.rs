use crate::{
    cache::StockCache,
    db::DbPool,
    entities::inventory_transaction::{self, Entity as TransactionEntity, TransactionStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::movements::{movements_for_transaction, record, NewMovement},
    services::transactions::{build_response, items_for_transaction, TransactionResponse},
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{ActiveModelTrait, EntityTrait, Set, TransactionTrait};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Reversal engine: cancels a committed transaction by appending the exact
/// inverse of its movements and flipping its status. The transaction row is
/// never deleted; the ledger keeps both sides.
#[derive(Clone)]
pub struct ReversalService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    cache: StockCache,
}

impl ReversalService {
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

    /// Cancels a transaction, appending one inverse movement per reversible
    /// original movement. Transfer movements are left untouched; cancelling
    /// a transfer only flips the status.
    ///
    /// Fails fast on a second invocation: an already-cancelled transaction
    /// yields `AlreadyCancelled` and no new movements.
    #[instrument(skip(self, reason), fields(transaction_id = %transaction_id))]
    pub async fn cancel_transaction(
        &self,
        transaction_id: Uuid,
        reason: &str,
        cancelled_by: Uuid,
    ) -> Result<TransactionResponse, ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, transaction_id = %transaction_id, "Failed to start cancellation unit of work");
            ServiceError::DatabaseError(e)
        })?;

        let transaction = TransactionEntity::find_by_id(transaction_id)
            .one(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, transaction_id = %transaction_id, "Failed to fetch transaction for cancellation");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                warn!(transaction_id = %transaction_id, "Transaction not found for cancellation");
                ServiceError::NotFound(format!("Transaction {} not found", transaction_id))
            })?;

        if transaction.is_cancelled() {
            return Err(ServiceError::AlreadyCancelled(format!(
                "Transaction {} is already cancelled",
                transaction.reference
            )));
        }
        if transaction.is_paid_and_completed() {
            return Err(ServiceError::NotCancellable(format!(
                "Transaction {} is paid and completed; it can only be reversed through a refund",
                transaction.reference
            )));
        }

        let original_reference = transaction.reference.clone();
        let cancel_reference = format!("CANCEL-{}", original_reference);
        let originals = movements_for_transaction(&txn, transaction_id).await?;

        let mut reversal_count: u32 = 0;
        let mut touched_products: HashSet<Uuid> = HashSet::new();
        for movement in &originals {
            if !movement.movement_type.is_reversible() {
                continue;
            }
            record(
                &txn,
                NewMovement {
                    product_id: movement.product_id,
                    location_id: movement.location_id,
                    movement_type: movement.movement_type.inverse(),
                    direction: movement.direction.inverse(),
                    quantity: movement.quantity,
                    unit_cost: movement.unit_cost,
                    transaction_id: Some(transaction_id),
                    reference: Some(cancel_reference.clone()),
                    reason: Some(reason.to_string()),
                    created_by: cancelled_by,
                },
            )
            .await?;
            reversal_count += 1;
            touched_products.insert(movement.product_id);
        }

        let previous_notes = transaction.notes.clone();
        let mut active_model: inventory_transaction::ActiveModel = transaction.into();
        active_model.status = Set(TransactionStatus::Cancelled);
        active_model.notes = Set(Some(match previous_notes {
            Some(notes) => format!("{} | Cancelled: {}", notes, reason),
            None => format!("Cancelled: {}", reason),
        }));
        active_model.updated_at = Set(Some(now));

        let updated = active_model.update(&txn).await.map_err(|e| {
            error!(error = %e, transaction_id = %transaction_id, "Failed to mark transaction cancelled");
            ServiceError::DatabaseError(e)
        })?;

        let items = items_for_transaction(&txn, transaction_id).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, transaction_id = %transaction_id, "Failed to commit cancellation");
            ServiceError::DatabaseError(e)
        })?;

        counter!("stockledger_transactions.cancelled", 1);
        info!(
            transaction_id = %transaction_id,
            reference = %original_reference,
            reversal_movements = reversal_count,
            "Transaction cancelled"
        );

        for product_id in &touched_products {
            self.cache.invalidate_product(*product_id);
        }

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::TransactionCancelled {
                    transaction_id,
                    reference: original_reference,
                    reversal_movements: reversal_count,
                    cancelled_by,
                    reason: reason.to_string(),
                })
                .await
            {
                warn!(error = %e, transaction_id = %transaction_id, "Failed to send transaction cancelled event");
            }
        }

        Ok(build_response(updated, items))
    }
}
