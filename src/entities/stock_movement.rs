use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a movement came to be. `In` and `Out` movements imply their own
/// direction; `Adjustment` and `Transfer` carry it in the `direction` column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum MovementType {
    #[sea_orm(string_value = "in")]
    In,
    #[sea_orm(string_value = "out")]
    Out,
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
    #[sea_orm(string_value = "transfer")]
    Transfer,
}

impl MovementType {
    /// Whether cancelling the owning transaction emits an inverse movement.
    /// Transfers stay untouched on cancellation.
    pub fn is_reversible(&self) -> bool {
        !matches!(self, MovementType::Transfer)
    }

    /// The type a compensating movement carries: `In` and `Out` swap, an
    /// adjustment is undone by another adjustment.
    pub fn inverse(&self) -> Self {
        match self {
            MovementType::In => MovementType::Out,
            MovementType::Out => MovementType::In,
            MovementType::Adjustment => MovementType::Adjustment,
            MovementType::Transfer => MovementType::Transfer,
        }
    }
}

/// Signed effect on stock.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum StockDirection {
    #[sea_orm(string_value = "in")]
    In,
    #[sea_orm(string_value = "out")]
    Out,
}

impl StockDirection {
    pub fn inverse(&self) -> Self {
        match self {
            StockDirection::In => StockDirection::Out,
            StockDirection::Out => StockDirection::In,
        }
    }
}

/// One atomic, immutable stock change. Rows are append-only: corrections are
/// new movements, never edits. The auto-incremented id doubles as the
/// tie-break for replay ordering when two movements share a timestamp.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
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
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}

impl Model {
    /// Quantity with the direction applied: positive for inbound, negative
    /// for outbound.
    pub fn signed_quantity(&self) -> i64 {
        match self.direction {
            StockDirection::In => i64::from(self.quantity),
            StockDirection::Out => -i64::from(self.quantity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_inverse_round_trips() {
        assert_eq!(StockDirection::In.inverse(), StockDirection::Out);
        assert_eq!(StockDirection::Out.inverse(), StockDirection::In);
        assert_eq!(StockDirection::In.inverse().inverse(), StockDirection::In);
    }

    #[test]
    fn transfer_is_the_only_irreversible_type() {
        assert!(MovementType::In.is_reversible());
        assert!(MovementType::Out.is_reversible());
        assert!(MovementType::Adjustment.is_reversible());
        assert!(!MovementType::Transfer.is_reversible());
    }

    #[test]
    fn movement_type_inverse_swaps_in_and_out() {
        assert_eq!(MovementType::In.inverse(), MovementType::Out);
        assert_eq!(MovementType::Out.inverse(), MovementType::In);
        assert_eq!(MovementType::Adjustment.inverse(), MovementType::Adjustment);
    }

    #[test]
    fn signed_quantity_follows_direction() {
        let mut movement = Model {
            id: 1,
            product_id: Uuid::new_v4(),
            location_id: None,
            movement_type: MovementType::In,
            direction: StockDirection::In,
            quantity: 7,
            unit_cost: None,
            transaction_id: None,
            reference: None,
            reason: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        assert_eq!(movement.signed_quantity(), 7);

        movement.direction = StockDirection::Out;
        assert_eq!(movement.signed_quantity(), -7);
    }
}
