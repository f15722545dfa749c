//! Stock adjustments with at-most-once effect.
//!
//! The adjustments table's unique `idempotency_key` guarantees a duplicate
//! request cannot bump stock twice; the duplicate check runs after the
//! product row lock is taken so concurrent duplicates serialise.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{AddStockRequest, StockAdjustment};
use crate::repos::{adjustment_repo, product_repo};
use crate::services::is_unique_violation;

#[derive(Debug, thiserror::Error)]
pub enum StockError {
    #[error("product not found: {product_id}")]
    ProductNotFound { product_id: Uuid },

    #[error("invalid stock adjustment: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Outcome of an AddStock call.
#[derive(Debug)]
pub enum AddStockOutcome {
    Applied(StockAdjustment),
    AlreadyExists(StockAdjustment),
}

pub async fn add_stock(
    pool: &PgPool,
    product_id: Uuid,
    request: &AddStockRequest,
) -> Result<AddStockOutcome, StockError> {
    if request.idempotency_key.trim().is_empty() {
        return Err(StockError::Validation(
            "idempotency_key must not be empty".into(),
        ));
    }
    if request.quantity_change == 0 {
        return Err(StockError::Validation(
            "quantity_change must not be zero".into(),
        ));
    }

    let mut tx = pool.begin().await?;

    let product = product_repo::find_by_id_for_update(&mut tx, product_id)
        .await?
        .ok_or(StockError::ProductNotFound { product_id })?;

    // Lock held, so a duplicate either committed before us (found here) or
    // trips the unique constraint below.
    if let Some(existing) =
        adjustment_repo::find_by_idempotency_key_tx(&mut tx, &request.idempotency_key).await?
    {
        tx.commit().await?;
        return Ok(AddStockOutcome::AlreadyExists(existing));
    }

    let new_quantity = product.stock_quantity + request.quantity_change;
    if new_quantity < 0 {
        return Err(StockError::Validation(format!(
            "adjustment would drive stock negative: {} {:+}",
            product.stock_quantity, request.quantity_change
        )));
    }

    let adjustment = StockAdjustment {
        id: Uuid::new_v4(),
        product_id,
        quantity_change: request.quantity_change,
        previous_quantity: product.stock_quantity,
        new_quantity,
        reason: request.reason.clone(),
        idempotency_key: request.idempotency_key.clone(),
        reference_id: request.reference_id.clone(),
        notes: request.notes.clone(),
        created_at: product.updated_at, // insert ignores this; created_at comes from the DB default
    };

    product_repo::apply_stock_delta(&mut tx, product_id, request.quantity_change).await?;

    match adjustment_repo::insert_adjustment(&mut tx, &adjustment).await {
        Ok(()) => {}
        Err(e) if is_unique_violation(&e) => {
            // A duplicate with a different product id slipped past the lock.
            drop(tx);
            let existing = adjustment_repo::find_by_idempotency_key(pool, &request.idempotency_key)
                .await?
                .ok_or(StockError::Database(sqlx::Error::RowNotFound))?;
            return Ok(AddStockOutcome::AlreadyExists(existing));
        }
        Err(e) => return Err(e.into()),
    }

    tx.commit().await?;

    tracing::info!(
        product_id = %product_id,
        quantity_change = request.quantity_change,
        new_quantity,
        reason = %request.reason,
        "Stock adjusted"
    );

    let stored = adjustment_repo::find_by_idempotency_key(pool, &request.idempotency_key)
        .await?
        .ok_or(StockError::Database(sqlx::Error::RowNotFound))?;

    Ok(AddStockOutcome::Applied(stored))
}
