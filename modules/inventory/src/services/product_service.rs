use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{AvailabilityResponse, CreateProductRequest, Product};
use crate::repos::{product_repo, reservation_repo};
use crate::services::is_unique_violation;

#[derive(Debug, thiserror::Error)]
pub enum ProductError {
    #[error("product not found: {product_id}")]
    NotFound { product_id: Uuid },

    #[error("a product with sku {sku} already exists")]
    DuplicateSku { sku: String },

    #[error("invalid product request: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub async fn create(pool: &PgPool, request: &CreateProductRequest) -> Result<Product, ProductError> {
    if request.sku.trim().is_empty() {
        return Err(ProductError::Validation("sku must not be empty".into()));
    }
    if request.initial_stock < 0 {
        return Err(ProductError::Validation(
            "initial_stock must be non-negative".into(),
        ));
    }

    let id = Uuid::new_v4();
    let result =
        product_repo::insert_product(pool, id, request.sku.trim(), &request.name, request.initial_stock)
            .await;

    match result {
        Ok(()) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(ProductError::DuplicateSku {
                sku: request.sku.trim().to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(product_id = %id, sku = %request.sku, "Product created");

    product_repo::find_by_id(pool, id)
        .await?
        .ok_or(ProductError::NotFound { product_id: id })
}

pub async fn availability(
    pool: &PgPool,
    product_id: Uuid,
) -> Result<AvailabilityResponse, ProductError> {
    let product = product_repo::find_by_id(pool, product_id)
        .await?
        .ok_or(ProductError::NotFound { product_id })?;

    let reserved_quantity =
        reservation_repo::reserved_quantity_for_product(pool, product_id).await?;

    Ok(AvailabilityResponse {
        product_id: product.id,
        sku: product.sku,
        stock_quantity: product.stock_quantity,
        reserved_quantity,
    })
}
