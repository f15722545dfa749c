use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{Order, OrderItem, OrderStatus};

type OrderRow = (
    Uuid,
    Uuid,
    Uuid,
    String,
    i64,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

const ORDER_COLUMNS: &str =
    "id, order_ledger_id, user_id, status, total_amount_cents, currency, created_at, updated_at";

fn map_order(row: OrderRow) -> Result<Order, sqlx::Error> {
    let status: OrderStatus = row
        .3
        .parse()
        .map_err(|e: String| sqlx::Error::Decode(e.into()))?;

    Ok(Order {
        id: row.0,
        order_ledger_id: row.1,
        user_id: row.2,
        status,
        total_amount_cents: row.4,
        currency: row.5,
        created_at: row.6,
        updated_at: row.7,
    })
}

/// Insert an order header; a duplicate `order_ledger_id` inserts nothing.
///
/// Returns `true` when a new row was created. The unique constraint is what
/// makes order creation idempotent under concurrent saga redeliveries.
pub async fn insert_order(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    order_ledger_id: Uuid,
    user_id: Uuid,
    total_amount_cents: i64,
    currency: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO orders
            (id, order_ledger_id, user_id, status, total_amount_cents, currency)
        VALUES ($1, $2, $3, 'CREATED', $4, $5)
        ON CONFLICT (order_ledger_id) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(order_ledger_id)
    .bind(user_id)
    .bind(total_amount_cents)
    .bind(currency)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub struct OrderItemInsert {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

pub async fn insert_items(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    items: &[OrderItemInsert],
) -> Result<(), sqlx::Error> {
    for item in items {
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, product_id, quantity, unit_price_cents)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order_id)
        .bind(item.product_id)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Order>, sqlx::Error> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(map_order).transpose()
}

pub async fn find_by_ledger_id(
    pool: &PgPool,
    order_ledger_id: Uuid,
) -> Result<Option<Order>, sqlx::Error> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_ledger_id = $1");
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(order_ledger_id)
        .fetch_optional(pool)
        .await?;

    row.map(map_order).transpose()
}

pub async fn fetch_items(pool: &PgPool, order_id: Uuid) -> Result<Vec<OrderItem>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (Uuid, Uuid, Uuid, i32, i64)>(
        r#"
        SELECT id, order_id, product_id, quantity, unit_price_cents
        FROM order_items
        WHERE order_id = $1
        ORDER BY id
        "#,
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| OrderItem {
            id: row.0,
            order_id: row.1,
            product_id: row.2,
            quantity: row.3,
            unit_price_cents: row.4,
        })
        .collect())
}

/// Conditionally move an order from `expected` to `to`.
pub async fn transition_status(
    pool: &PgPool,
    id: Uuid,
    expected: OrderStatus,
    to: OrderStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE orders
        SET status = $3, updated_at = now()
        WHERE id = $1 AND status = $2
        "#,
    )
    .bind(id)
    .bind(expected.as_str())
    .bind(to.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
