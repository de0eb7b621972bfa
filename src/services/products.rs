use crate::{
    db::DbPool,
    entities::product::{self, Entity as ProductEntity, Model as ProductModel},
    errors::ServiceError,
};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 255, message = "Product name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 100, message = "SKU is required"))]
    pub sku: String,
    pub category: Option<String>,
    pub standard_cost: Option<Decimal>,
    pub reorder_point: Option<i32>,
}

/// Fetches a product inside the caller's unit of work, failing with
/// `NotFound` when it does not exist.
pub(crate) async fn require_product<C>(
    conn: &C,
    product_id: Uuid,
) -> Result<ProductModel, ServiceError>
where
    C: ConnectionTrait,
{
    ProductEntity::find_by_id(product_id)
        .one(conn)
        .await
        .map_err(|e| {
            error!(error = %e, product_id = %product_id, "Failed to fetch product");
            ServiceError::DatabaseError(e)
        })?
        .ok_or_else(|| {
            warn!(product_id = %product_id, "Product not found");
            ServiceError::NotFound(format!("Product {} not found", product_id))
        })
}

/// Minimal product catalog the engine validates against. Name and SKU are
/// carried for reporting; the engine itself only cares about identity,
/// standard cost and reorder point.
#[derive(Clone)]
pub struct ProductService {
    db_pool: Arc<DbPool>,
}

impl ProductService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Creates a new product record
    #[instrument(skip(self, request), fields(sku = %request.sku))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
    ) -> Result<ProductModel, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        if let Some(cost) = request.standard_cost {
            if cost < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Standard cost cannot be negative".to_string(),
                ));
            }
        }
        if let Some(point) = request.reorder_point {
            if point < 0 {
                return Err(ServiceError::ValidationError(
                    "Reorder point cannot be negative".to_string(),
                ));
            }
        }

        let db = &*self.db_pool;

        let existing = ProductEntity::find()
            .filter(product::Column::Sku.eq(request.sku.clone()))
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, sku = %request.sku, "Failed to check SKU uniqueness");
                ServiceError::DatabaseError(e)
            })?;
        if existing.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "A product with SKU {} already exists",
                request.sku
            )));
        }

        let product_id = Uuid::new_v4();
        let active_model = product::ActiveModel {
            id: Set(product_id),
            name: Set(request.name),
            sku: Set(request.sku.clone()),
            category: Set(request.category),
            standard_cost: Set(request.standard_cost),
            reorder_point: Set(request.reorder_point),
            ..Default::default()
        };

        let model = active_model.insert(db).await.map_err(|e| {
            error!(error = %e, product_id = %product_id, "Failed to create product");
            ServiceError::DatabaseError(e)
        })?;

        counter!("stockledger_products.created", 1);
        info!(product_id = %product_id, sku = %request.sku, "Product created");
        Ok(model)
    }

    /// Retrieves a product by ID
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<Option<ProductModel>, ServiceError> {
        let db = &*self.db_pool;
        ProductEntity::find_by_id(product_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %product_id, "Failed to fetch product");
                ServiceError::DatabaseError(e)
            })
    }

    /// Retrieves a product by SKU
    #[instrument(skip(self), fields(sku = %sku))]
    pub async fn get_product_by_sku(&self, sku: &str) -> Result<Option<ProductModel>, ServiceError> {
        let db = &*self.db_pool;
        ProductEntity::find()
            .filter(product::Column::Sku.eq(sku))
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, sku = %sku, "Failed to fetch product by SKU");
                ServiceError::DatabaseError(e)
            })
    }

    /// Lists products with pagination, newest first
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<ProductModel>, u64), ServiceError> {
        let db = &*self.db_pool;

        let paginator = ProductEntity::find()
            .order_by_desc(product::Column::CreatedAt)
            .paginate(db, per_page);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count products");
            ServiceError::DatabaseError(e)
        })?;

        let products = paginator.fetch_page(page.saturating_sub(1)).await.map_err(|e| {
            error!(error = %e, page = page, per_page = per_page, "Failed to fetch products page");
            ServiceError::DatabaseError(e)
        })?;

        Ok((products, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_fails_validation() {
        let request = CreateProductRequest {
            name: String::new(),
            sku: "SKU-1".to_string(),
            category: None,
            standard_cost: None,
            reorder_point: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn well_formed_request_passes_validation() {
        let request = CreateProductRequest {
            name: "Widget".to_string(),
            sku: "WID-001".to_string(),
            category: Some("hardware".to_string()),
            standard_cost: Some(Decimal::new(250, 2)),
            reorder_point: Some(10),
        };
        assert!(request.validate().is_ok());
    }
}
