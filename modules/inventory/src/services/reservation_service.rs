//! Inventory reservation engine.
//!
//! Reservations are keyed by `order_id` and all-or-nothing: a single
//! transaction locks every product row involved, checks stock, inserts the
//! reservation rows and decrements stock together. Any line failing rolls
//! the whole set back. A repeat call for the same order short-circuits to
//! the pre-existing reservation set without touching stock.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Reservation, ReserveStockRequest};
use crate::repos::{product_repo, reservation_repo};
use crate::services::is_unique_violation;

#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("product not found: {product_id}")]
    ProductNotFound { product_id: Uuid },

    #[error("insufficient stock for {product_sku}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        product_sku: String,
        requested: i32,
        available: i32,
    },

    #[error("invalid reservation request: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of a reserve call; retries land on `AlreadyReserved` with the
/// original reservation rows.
#[derive(Debug)]
pub enum ReserveOutcome {
    Reserved(Vec<Reservation>),
    AlreadyReserved(Vec<Reservation>),
}

impl ReserveOutcome {
    pub fn reservations(&self) -> &[Reservation] {
        match self {
            Self::Reserved(rows) | Self::AlreadyReserved(rows) => rows,
        }
    }
}

fn validate(request: &ReserveStockRequest) -> Result<(), ReservationError> {
    if request.items.is_empty() {
        return Err(ReservationError::Validation("items must not be empty".into()));
    }
    for item in &request.items {
        if item.quantity <= 0 {
            return Err(ReservationError::Validation(
                "quantity must be positive".into(),
            ));
        }
    }
    let mut seen = std::collections::HashSet::new();
    for item in &request.items {
        if !seen.insert(item.product_id) {
            return Err(ReservationError::Validation(format!(
                "duplicate product_id in items: {}",
                item.product_id
            )));
        }
    }
    Ok(())
}

pub async fn reserve(
    pool: &PgPool,
    request: &ReserveStockRequest,
) -> Result<ReserveOutcome, ReservationError> {
    validate(request)?;

    match try_reserve(pool, request).await {
        Ok(outcome) => Ok(outcome),
        // Lost the insert race against a concurrent reserve for the same
        // order: the winner's rows are the reservation set.
        Err(ReservationError::Database(e)) if is_unique_violation(&e) => {
            let mut tx = pool.begin().await?;
            let existing =
                reservation_repo::find_reserved_by_order(&mut tx, request.order_id).await?;
            tx.commit().await?;
            Ok(ReserveOutcome::AlreadyReserved(existing))
        }
        Err(e) => Err(e),
    }
}

async fn try_reserve(
    pool: &PgPool,
    request: &ReserveStockRequest,
) -> Result<ReserveOutcome, ReservationError> {
    let mut tx = pool.begin().await?;

    let existing = reservation_repo::find_reserved_by_order(&mut tx, request.order_id).await?;
    if !existing.is_empty() {
        tx.commit().await?;
        tracing::info!(
            order_id = %request.order_id,
            reservations = existing.len(),
            "Reservation already exists, returning existing set"
        );
        return Ok(ReserveOutcome::AlreadyReserved(existing));
    }

    // Lock products in a stable order so overlapping multi-line
    // reservations cannot deadlock.
    let mut line_items: Vec<_> = request.items.iter().collect();
    line_items.sort_by_key(|item| item.product_id);

    for item in line_items {
        let product = product_repo::find_by_id_for_update(&mut tx, item.product_id)
            .await?
            .ok_or(ReservationError::ProductNotFound {
                product_id: item.product_id,
            })?;

        if product.stock_quantity < item.quantity {
            // Dropping the transaction rolls back every line reserved so far.
            return Err(ReservationError::InsufficientStock {
                product_id: product.id,
                product_sku: product.sku,
                requested: item.quantity,
                available: product.stock_quantity,
            });
        }

        reservation_repo::insert_reservation(
            &mut tx,
            Uuid::new_v4(),
            request.order_id,
            item.product_id,
            item.quantity,
        )
        .await?;
        product_repo::apply_stock_delta(&mut tx, item.product_id, -item.quantity).await?;
    }

    // Re-read inside the transaction so the caller gets full rows.
    let rows = reservation_repo::find_reserved_by_order(&mut tx, request.order_id).await?;
    tx.commit().await?;

    tracing::info!(
        order_id = %request.order_id,
        reservations = rows.len(),
        "Stock reserved"
    );

    Ok(ReserveOutcome::Reserved(rows))
}

/// Release every live reservation for an order and restore the stock.
///
/// Returns `(reservations_released, quantity_restored)`; an order with no
/// live reservations releases zero rows and still succeeds.
pub async fn release(pool: &PgPool, order_id: Uuid) -> Result<(i32, i64), ReservationError> {
    let mut tx = pool.begin().await?;

    let released = reservation_repo::release_all_for_order(&mut tx, order_id).await?;
    let mut quantity_restored: i64 = 0;
    for (_, product_id, quantity) in &released {
        product_repo::apply_stock_delta(&mut tx, *product_id, *quantity).await?;
        quantity_restored += i64::from(*quantity);
    }

    tx.commit().await?;

    tracing::info!(
        order_id = %order_id,
        reservations_released = released.len(),
        quantity_restored,
        "Stock released"
    );

    Ok((released.len() as i32, quantity_restored))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReserveLineItem;

    fn request(items: Vec<ReserveLineItem>) -> ReserveStockRequest {
        ReserveStockRequest {
            order_id: Uuid::new_v4(),
            items,
        }
    }

    #[test]
    fn test_rejects_empty_items() {
        let err = validate(&request(vec![])).unwrap_err();
        assert!(matches!(err, ReservationError::Validation(_)));
    }

    #[test]
    fn test_rejects_non_positive_quantity() {
        let err = validate(&request(vec![ReserveLineItem {
            product_id: Uuid::new_v4(),
            quantity: 0,
        }]))
        .unwrap_err();
        assert!(matches!(err, ReservationError::Validation(_)));
    }

    #[test]
    fn test_rejects_duplicate_product() {
        let product_id = Uuid::new_v4();
        let err = validate(&request(vec![
            ReserveLineItem {
                product_id,
                quantity: 1,
            },
            ReserveLineItem {
                product_id,
                quantity: 2,
            },
        ]))
        .unwrap_err();
        assert!(matches!(err, ReservationError::Validation(_)));
    }

    #[test]
    fn test_accepts_distinct_products() {
        assert!(validate(&request(vec![
            ReserveLineItem {
                product_id: Uuid::new_v4(),
                quantity: 1,
            },
            ReserveLineItem {
                product_id: Uuid::new_v4(),
                quantity: 5,
            },
        ]))
        .is_ok());
    }
}
