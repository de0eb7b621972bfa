use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::entities::inventory_transaction::TransactionType;
use crate::entities::stock_movement::StockDirection;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Events emitted by the engine after a mutating operation commits.
/// Delivery is advisory: senders log failures and move on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    TransactionCreated {
        transaction_id: Uuid,
        transaction_type: TransactionType,
        reference: String,
        total_amount: Decimal,
        total_items: i32,
        created_by: Uuid,
    },
    TransactionCancelled {
        transaction_id: Uuid,
        reference: String,
        reversal_movements: u32,
        cancelled_by: Uuid,
        reason: String,
    },
    MovementRecorded {
        movement_id: i64,
        product_id: Uuid,
        direction: StockDirection,
        quantity: i32,
        transaction_id: Option<Uuid>,
    },
    StockReconciled {
        count_id: Uuid,
        product_id: Uuid,
        difference: i64,
        within_tolerance: bool,
        adjusted: bool,
        counted_by: Uuid,
    },
    LowStockDetected {
        product_id: Uuid,
        current_stock: i64,
        reorder_point: i32,
    },

    // Generic event for custom messages
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    },
}

impl Event {
    /// Create a generic event with string data
    pub fn with_data(data: String) -> Self {
        Event::Generic {
            message: data,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}

// Define a trait for handling events. Handlers implementing this trait will
// process events asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

// Function to process incoming events and distribute them to handlers.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::TransactionCreated {
                transaction_id,
                transaction_type,
                ref reference,
                total_amount,
                total_items,
                created_by,
            } => {
                if let Err(e) = handle_transaction_created(
                    transaction_id,
                    transaction_type,
                    reference,
                    total_amount,
                    total_items,
                    created_by,
                )
                .await
                {
                    error!(
                        "Failed to handle transaction created event: transaction_id={}, error={}",
                        transaction_id, e
                    );
                }
            }
            Event::TransactionCancelled {
                transaction_id,
                ref reference,
                reversal_movements,
                cancelled_by,
                ref reason,
            } => {
                if let Err(e) = handle_transaction_cancelled(
                    transaction_id,
                    reference,
                    reversal_movements,
                    cancelled_by,
                    reason,
                )
                .await
                {
                    error!(
                        "Failed to handle transaction cancelled event: transaction_id={}, error={}",
                        transaction_id, e
                    );
                }
            }
            Event::StockReconciled {
                count_id,
                product_id,
                difference,
                within_tolerance,
                adjusted,
                counted_by,
            } => {
                if let Err(e) = handle_stock_reconciled(
                    count_id,
                    product_id,
                    difference,
                    within_tolerance,
                    adjusted,
                    counted_by,
                )
                .await
                {
                    error!(
                        "Failed to handle stock reconciled event: count_id={}, error={}",
                        count_id, e
                    );
                }
            }
            Event::LowStockDetected {
                product_id,
                current_stock,
                reorder_point,
            } => {
                warn!(
                    "Low stock alert: product {} has {} units remaining (reorder point {})",
                    product_id, current_stock, reorder_point
                );
            }
            _ => {
                info!("No specific handler for event: {:?}", event);
            }
        }
    }

    warn!("Event processing loop has ended");
}

// Handler functions for specific events

async fn handle_transaction_created(
    transaction_id: Uuid,
    transaction_type: TransactionType,
    reference: &str,
    total_amount: Decimal,
    total_items: i32,
    created_by: Uuid,
) -> Result<(), String> {
    // Audit trail entry for every committed business event.
    info!(
        "Transaction recorded: id={}, type={}, reference={}, total={}, items={}, actor={}",
        transaction_id, transaction_type, reference, total_amount, total_items, created_by
    );
    Ok(())
}

async fn handle_transaction_cancelled(
    transaction_id: Uuid,
    reference: &str,
    reversal_movements: u32,
    cancelled_by: Uuid,
    reason: &str,
) -> Result<(), String> {
    info!(
        "Transaction cancelled: id={}, reference={}, reversal_movements={}, actor={}, reason={}",
        transaction_id, reference, reversal_movements, cancelled_by, reason
    );
    Ok(())
}

async fn handle_stock_reconciled(
    count_id: Uuid,
    product_id: Uuid,
    difference: i64,
    within_tolerance: bool,
    adjusted: bool,
    counted_by: Uuid,
) -> Result<(), String> {
    if within_tolerance {
        info!(
            "Stock reconciled: count={}, product={}, difference={}, adjusted={}, actor={}",
            count_id, product_id, difference, adjusted, counted_by
        );
    } else {
        // Out-of-tolerance counts are the ones someone should look at.
        warn!(
            "Stock variance outside tolerance: count={}, product={}, difference={}, adjusted={}, actor={}",
            count_id, product_id, difference, adjusted, counted_by
        );
    }
    Ok(())
}
