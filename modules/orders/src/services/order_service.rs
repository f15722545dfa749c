//! Order lifecycle business logic.
//!
//! Creation is idempotent on `order_ledger_id`; confirm and cancel are
//! idempotent on their target status. The saga redelivers steps after
//! crashes, so every operation here must tolerate being run twice.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreateOrderRequest, Order, OrderItem, OrderStatus};
use crate::repos::order_repo::{self, OrderItemInsert};

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order not found")]
    NotFound,

    #[error("cannot transition a {from} order to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("invalid order request: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type OrderResult<T> = Result<T, OrderError>;

fn validate(request: &CreateOrderRequest) -> OrderResult<()> {
    if request.items.is_empty() {
        return Err(OrderError::Validation("items must not be empty".into()));
    }
    if request.total_amount_cents < 0 {
        return Err(OrderError::Validation(
            "total_amount_cents must be non-negative".into(),
        ));
    }
    for item in &request.items {
        if item.quantity <= 0 {
            return Err(OrderError::Validation("quantity must be positive".into()));
        }
        if item.unit_price_cents < 0 {
            return Err(OrderError::Validation(
                "unit_price_cents must be non-negative".into(),
            ));
        }
    }
    Ok(())
}

/// Create an order for a ledger row, or return the existing one.
///
/// The boolean is `true` when this call created the order.
pub async fn create(
    pool: &PgPool,
    request: &CreateOrderRequest,
) -> OrderResult<(Order, Vec<OrderItem>, bool)> {
    validate(request)?;

    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    let inserted = order_repo::insert_order(
        &mut tx,
        id,
        request.order_ledger_id,
        request.user_id,
        request.total_amount_cents,
        &request.currency,
    )
    .await?;

    if inserted {
        let items: Vec<OrderItemInsert> = request
            .items
            .iter()
            .map(|item| OrderItemInsert {
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
            })
            .collect();
        order_repo::insert_items(&mut tx, id, &items).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %id,
            order_ledger_id = %request.order_ledger_id,
            "Order created"
        );
    } else {
        // Duplicate create for this ledger row; nothing to write.
        tx.rollback().await?;
    }

    let order = order_repo::find_by_ledger_id(pool, request.order_ledger_id)
        .await?
        .ok_or(OrderError::NotFound)?;
    let items = order_repo::fetch_items(pool, order.id).await?;

    Ok((order, items, inserted))
}

pub async fn find(pool: &PgPool, id: Uuid) -> OrderResult<(Order, Vec<OrderItem>)> {
    let order = order_repo::find_by_id(pool, id)
        .await?
        .ok_or(OrderError::NotFound)?;
    let items = order_repo::fetch_items(pool, id).await?;
    Ok((order, items))
}

pub async fn confirm(pool: &PgPool, id: Uuid) -> OrderResult<(Order, Vec<OrderItem>)> {
    transition(pool, id, OrderStatus::Confirmed).await
}

pub async fn cancel(pool: &PgPool, id: Uuid) -> OrderResult<(Order, Vec<OrderItem>)> {
    transition(pool, id, OrderStatus::Cancelled).await
}

/// Drive an order to `target`. Already being there is success; arriving from
/// the opposite terminal state is not.
async fn transition(
    pool: &PgPool,
    id: Uuid,
    target: OrderStatus,
) -> OrderResult<(Order, Vec<OrderItem>)> {
    let order = order_repo::find_by_id(pool, id)
        .await?
        .ok_or(OrderError::NotFound)?;

    if order.status == target {
        let items = order_repo::fetch_items(pool, id).await?;
        return Ok((order, items));
    }

    if order.status != OrderStatus::Created {
        return Err(OrderError::InvalidTransition {
            from: order.status,
            to: target,
        });
    }

    let moved = order_repo::transition_status(pool, id, OrderStatus::Created, target).await?;
    if !moved {
        // Lost a race; the committed status decides.
        let current = order_repo::find_by_id(pool, id)
            .await?
            .ok_or(OrderError::NotFound)?;
        if current.status != target {
            return Err(OrderError::InvalidTransition {
                from: current.status,
                to: target,
            });
        }
    }

    tracing::info!(order_id = %id, status = target.as_str(), "Order status updated");

    let order = order_repo::find_by_id(pool, id)
        .await?
        .ok_or(OrderError::NotFound)?;
    let items = order_repo::fetch_items(pool, id).await?;
    Ok((order, items))
}
