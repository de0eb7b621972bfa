use crate::{
    db::DbPool,
    entities::product::{Entity as ProductEntity, Model as ProductModel},
    entities::stock_movement::{Model as StockMovementModel, StockDirection},
    errors::ServiceError,
    services::movements::movements_for_product,
    services::products::require_product,
};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, instrument};
use uuid::Uuid;

/// Costing method for point-in-time inventory valuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum CostingMethod {
    #[serde(rename = "FIFO")]
    #[strum(serialize = "FIFO")]
    Fifo,
    #[serde(rename = "LIFO")]
    #[strum(serialize = "LIFO")]
    Lifo,
    #[serde(rename = "AVERAGE")]
    #[strum(serialize = "AVERAGE")]
    Average,
}

impl FromStr for CostingMethod {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FIFO" => Ok(CostingMethod::Fifo),
            "LIFO" => Ok(CostingMethod::Lifo),
            "AVERAGE" => Ok(CostingMethod::Average),
            _ => Err(ServiceError::ValidationError(format!(
                "Unknown costing method: {}",
                s
            ))),
        }
    }
}

/// One cost layer still on hand after replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostLayer {
    pub quantity: i64,
    pub unit_cost: Decimal,
}

/// Replays movement history into the cost layers still on hand.
///
/// Movements must arrive in replay order. Inbound movements push a layer;
/// outbound movements consume layers oldest-first for FIFO and newest-first
/// for LIFO. Consumption clamps at zero when an outbound movement exceeds
/// the remaining layers; the discrepancy is left for integrity checks
/// against the stock projector.
pub fn replay_layers(
    movements: &[StockMovementModel],
    method: CostingMethod,
    fallback_unit_cost: Decimal,
) -> VecDeque<CostLayer> {
    let mut layers: VecDeque<CostLayer> = VecDeque::new();
    for movement in movements {
        match movement.direction {
            StockDirection::In => {
                layers.push_back(CostLayer {
                    quantity: i64::from(movement.quantity),
                    unit_cost: movement.unit_cost.unwrap_or(fallback_unit_cost),
                });
            }
            StockDirection::Out => {
                consume_layers(&mut layers, i64::from(movement.quantity), method);
            }
        }
    }
    layers
}

fn consume_layers(layers: &mut VecDeque<CostLayer>, quantity: i64, method: CostingMethod) {
    let mut remaining = quantity;
    while remaining > 0 {
        let layer = match method {
            CostingMethod::Lifo => layers.back_mut(),
            _ => layers.front_mut(),
        };
        let Some(layer) = layer else {
            break;
        };
        let take = layer.quantity.min(remaining);
        layer.quantity -= take;
        remaining -= take;
        if layer.quantity == 0 {
            match method {
                CostingMethod::Lifo => layers.pop_back(),
                _ => layers.pop_front(),
            };
        }
    }
}

/// Total value of the layers still on hand.
pub fn layers_value(layers: &VecDeque<CostLayer>) -> Decimal {
    layers
        .iter()
        .map(|layer| Decimal::from(layer.quantity) * layer.unit_cost)
        .sum()
}

/// Weighted-average valuation: projected stock times the mean unit cost of
/// priced inbound movements, falling back to the standard cost when none
/// exist. Negative projected stock values as zero.
pub fn average_value(
    movements: &[StockMovementModel],
    current_stock: i64,
    fallback_unit_cost: Decimal,
) -> Decimal {
    let in_costs: Vec<Decimal> = movements
        .iter()
        .filter(|movement| movement.direction == StockDirection::In)
        .filter_map(|movement| movement.unit_cost)
        .collect();

    let mean_cost = if in_costs.is_empty() {
        fallback_unit_cost
    } else {
        in_costs.iter().copied().sum::<Decimal>() / Decimal::from(in_costs.len() as u64)
    };

    Decimal::from(current_stock.max(0)) * mean_cost
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductValuation {
    pub product_id: Uuid,
    pub sku: String,
    pub method: CostingMethod,
    /// Units on hand according to the replay; clamped at zero for the layer
    /// methods.
    pub quantity: i64,
    pub total_value: Decimal,
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogValuation {
    pub method: CostingMethod,
    pub total_value: Decimal,
    pub products: Vec<ProductValuation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryValuation {
    pub category: Option<String>,
    pub total_value: Decimal,
}

/// Valuation engine: derives inventory value by replaying movement history.
/// Every call is a full linear replay over the ledger, so results are
/// re-derivable and nothing incremental is persisted.
#[derive(Clone)]
pub struct ValuationService {
    db_pool: Arc<DbPool>,
}

impl ValuationService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Values one product as of `cutoff`, or as of now when `None`.
    #[instrument(skip(self), fields(product_id = %product_id, method = %method))]
    pub async fn value_product(
        &self,
        product_id: Uuid,
        method: CostingMethod,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<ProductValuation, ServiceError> {
        let db = &*self.db_pool;
        let product = require_product(db, product_id).await?;
        self.value_loaded_product(&product, method, as_of).await
    }

    /// Total value only, with the method given as a string (`FIFO`, `LIFO`
    /// or `AVERAGE`, case insensitive).
    pub async fn value_as_of(
        &self,
        product_id: Uuid,
        method: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Decimal, ServiceError> {
        let method = CostingMethod::from_str(method)?;
        let valuation = self.value_product(product_id, method, as_of).await?;
        Ok(valuation.total_value)
    }

    async fn value_loaded_product(
        &self,
        product: &ProductModel,
        method: CostingMethod,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<ProductValuation, ServiceError> {
        let db = &*self.db_pool;
        let movements = movements_for_product(db, product.id, as_of).await?;
        let fallback = product.standard_cost_or_zero();

        let (quantity, total_value) = match method {
            CostingMethod::Average => {
                let stock: i64 = movements.iter().map(|m| m.signed_quantity()).sum();
                (stock, average_value(&movements, stock, fallback))
            }
            CostingMethod::Fifo | CostingMethod::Lifo => {
                let layers = replay_layers(&movements, method, fallback);
                let quantity: i64 = layers.iter().map(|layer| layer.quantity).sum();
                (quantity, layers_value(&layers))
            }
        };

        Ok(ProductValuation {
            product_id: product.id,
            sku: product.sku.clone(),
            method,
            quantity,
            total_value,
            as_of,
        })
    }

    /// Values every product in the catalog and sums the result.
    #[instrument(skip(self), fields(method = %method))]
    pub async fn value_catalog(
        &self,
        method: CostingMethod,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<CatalogValuation, ServiceError> {
        let db = &*self.db_pool;
        let products = ProductEntity::find().all(db).await.map_err(|e| {
            error!(error = %e, "Failed to load products for catalog valuation");
            ServiceError::DatabaseError(e)
        })?;

        let valuations = try_join_all(
            products
                .iter()
                .map(|product| self.value_loaded_product(product, method, as_of)),
        )
        .await?;

        let total_value = valuations.iter().map(|v| v.total_value).sum();
        Ok(CatalogValuation {
            method,
            total_value,
            products: valuations,
        })
    }

    /// Catalog value grouped by product category.
    #[instrument(skip(self), fields(method = %method))]
    pub async fn value_by_category(
        &self,
        method: CostingMethod,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<CategoryValuation>, ServiceError> {
        let db = &*self.db_pool;
        let products = ProductEntity::find().all(db).await.map_err(|e| {
            error!(error = %e, "Failed to load products for category valuation");
            ServiceError::DatabaseError(e)
        })?;

        let valuations = try_join_all(
            products
                .iter()
                .map(|product| self.value_loaded_product(product, method, as_of)),
        )
        .await?;

        let mut by_category: BTreeMap<Option<String>, Decimal> = BTreeMap::new();
        for (product, valuation) in products.iter().zip(valuations.iter()) {
            *by_category
                .entry(product.category.clone())
                .or_insert(Decimal::ZERO) += valuation.total_value;
        }

        Ok(by_category
            .into_iter()
            .map(|(category, total_value)| CategoryValuation {
                category,
                total_value,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::stock_movement::MovementType;

    fn movement(
        direction: StockDirection,
        quantity: i32,
        unit_cost: Option<&str>,
    ) -> StockMovementModel {
        StockMovementModel {
            id: 0,
            product_id: Uuid::new_v4(),
            location_id: None,
            movement_type: match direction {
                StockDirection::In => MovementType::In,
                StockDirection::Out => MovementType::Out,
            },
            direction,
            quantity,
            unit_cost: unit_cost.map(|cost| Decimal::from_str(cost).unwrap()),
            transaction_id: None,
            reference: None,
            reason: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn fifo_and_lifo_diverge_after_partial_consumption() {
        let movements = vec![
            movement(StockDirection::In, 10, Some("1")),
            movement(StockDirection::In, 10, Some("2")),
            movement(StockDirection::Out, 12, None),
        ];

        let fifo = replay_layers(&movements, CostingMethod::Fifo, Decimal::ZERO);
        assert_eq!(fifo.len(), 1);
        assert_eq!(fifo[0].quantity, 8);
        assert_eq!(layers_value(&fifo), Decimal::from(16));

        let lifo = replay_layers(&movements, CostingMethod::Lifo, Decimal::ZERO);
        assert_eq!(lifo.len(), 1);
        assert_eq!(lifo[0].quantity, 8);
        assert_eq!(layers_value(&lifo), Decimal::from(8));
    }

    #[test]
    fn lifo_consumes_newest_layer_first_across_layers() {
        let movements = vec![
            movement(StockDirection::In, 5, Some("3")),
            movement(StockDirection::In, 5, Some("4")),
            movement(StockDirection::Out, 3, None),
        ];

        let lifo = replay_layers(&movements, CostingMethod::Lifo, Decimal::ZERO);
        assert_eq!(lifo.len(), 2);
        assert_eq!(lifo[0], CostLayer { quantity: 5, unit_cost: Decimal::from(3) });
        assert_eq!(lifo[1], CostLayer { quantity: 2, unit_cost: Decimal::from(4) });
    }

    #[test]
    fn consumption_clamps_at_zero_when_overdrawn() {
        let movements = vec![
            movement(StockDirection::In, 20, Some("3")),
            movement(StockDirection::Out, 25, None),
        ];

        let layers = replay_layers(&movements, CostingMethod::Fifo, Decimal::ZERO);
        assert!(layers.is_empty());
        assert_eq!(layers_value(&layers), Decimal::ZERO);
    }

    #[test]
    fn costless_inbound_layers_use_the_fallback_cost() {
        let movements = vec![movement(StockDirection::In, 5, None)];
        let layers = replay_layers(&movements, CostingMethod::Fifo, Decimal::from(4));
        assert_eq!(layers_value(&layers), Decimal::from(20));
    }

    #[test]
    fn average_uses_mean_of_inbound_costs() {
        let movements = vec![
            movement(StockDirection::In, 10, Some("1")),
            movement(StockDirection::In, 10, Some("3")),
            movement(StockDirection::Out, 5, None),
        ];
        // Mean of 1 and 3 is 2; 15 units on hand.
        assert_eq!(
            average_value(&movements, 15, Decimal::ZERO),
            Decimal::from(30)
        );
    }

    #[test]
    fn average_falls_back_to_standard_cost_without_inbound_movements() {
        assert_eq!(
            average_value(&[], 7, Decimal::from_str("2.50").unwrap()),
            Decimal::from_str("17.50").unwrap()
        );
    }

    #[test]
    fn average_values_negative_stock_as_zero() {
        let movements = vec![movement(StockDirection::Out, 3, None)];
        assert_eq!(
            average_value(&movements, -3, Decimal::from(2)),
            Decimal::ZERO
        );
    }

    #[test]
    fn method_parsing_is_case_insensitive_and_rejects_unknowns() {
        assert_eq!(CostingMethod::from_str("fifo").unwrap(), CostingMethod::Fifo);
        assert_eq!(CostingMethod::from_str("Lifo").unwrap(), CostingMethod::Lifo);
        assert_eq!(
            CostingMethod::from_str("AVERAGE").unwrap(),
            CostingMethod::Average
        );
        assert!(matches!(
            CostingMethod::from_str("WEIGHTED"),
            Err(ServiceError::ValidationError(_))
        ));
    }
}
