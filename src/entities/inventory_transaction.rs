use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stock_movement::StockDirection;

/// Business event kinds the ledger records.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum TransactionType {
    #[sea_orm(string_value = "sale")]
    Sale,
    #[sea_orm(string_value = "purchase")]
    Purchase,
    #[sea_orm(string_value = "return")]
    Return,
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
    #[sea_orm(string_value = "transfer")]
    Transfer,
    #[sea_orm(string_value = "damage")]
    Damage,
}

impl TransactionType {
    /// Stock direction implied by the type, or `None` where the caller (or
    /// the transfer pairing) supplies it. Exhaustive on purpose: a new type
    /// cannot be added without deciding its direction here.
    pub fn stock_direction(&self) -> Option<StockDirection> {
        match self {
            TransactionType::Sale => Some(StockDirection::Out),
            TransactionType::Purchase => Some(StockDirection::In),
            TransactionType::Return => Some(StockDirection::In),
            TransactionType::Damage => Some(StockDirection::Out),
            TransactionType::Adjustment => None,
            TransactionType::Transfer => None,
        }
    }

    /// Prefix used when generating a reference for this type.
    pub fn reference_prefix(&self) -> &'static str {
        match self {
            TransactionType::Sale => "SAL",
            TransactionType::Purchase => "PUR",
            TransactionType::Return => "RET",
            TransactionType::Adjustment => "ADJ",
            TransactionType::Transfer => "TRF",
            TransactionType::Damage => "DMG",
        }
    }
}

/// Lifecycle status of a transaction. Refund states exist for the
/// surrounding application; nothing in this crate sets them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum TransactionStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "refunded")]
    Refunded,
    #[sea_orm(string_value = "partially_refunded")]
    PartiallyRefunded,
}

/// A business event grouping one or more line items, created atomically with
/// its items and movements.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
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
    pub metadata: Option<Json>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transaction_item::Entity")]
    TransactionItems,
}

impl Related<super::transaction_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransactionItems.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
        }

        if let ActiveValue::NotSet = active_model.updated_at {
            active_model.updated_at = Set(Some(now));
        }

        Ok(active_model)
    }
}

impl Model {
    pub fn is_cancelled(&self) -> bool {
        self.status == TransactionStatus::Cancelled
    }

    /// Paid-and-completed transactions leave the cancellation path and can
    /// only be undone through a refund.
    pub fn is_paid_and_completed(&self) -> bool {
        self.status == TransactionStatus::Completed && self.payment_status == "paid"
    }
}
