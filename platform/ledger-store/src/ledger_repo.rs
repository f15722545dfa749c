use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{LedgerItemInsert, LedgerStatus, OrderLedger, OrderLedgerItem};

type LedgerRow = (
    Uuid,
    String,
    Uuid,
    String,
    String,
    i64,
    String,
    Option<String>,
    Option<Uuid>,
    i32,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
    DateTime<Utc>,
);

const LEDGER_COLUMNS: &str = "id, client_request_id, user_id, email, status, total_amount_cents, \
     currency, payment_authorization_id, order_id, retry_count, next_retry_at, \
     created_at, updated_at";

fn map_ledger(row: LedgerRow) -> Result<OrderLedger, sqlx::Error> {
    let status: LedgerStatus = row.4.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(OrderLedger {
        id: row.0,
        client_request_id: row.1,
        user_id: row.2,
        email: row.3,
        status,
        total_amount_cents: row.5,
        currency: row.6,
        payment_authorization_id: row.7,
        order_id: row.8,
        retry_count: row.9,
        next_retry_at: row.10,
        created_at: row.11,
        updated_at: row.12,
    })
}

/// Insert a ledger row inside an open transaction.
///
/// The caller owns the transaction so items and the outbox event land
/// atomically with the ledger row. The `client_request_id` unique constraint
/// is the idempotency backstop; a concurrent duplicate surfaces as a
/// unique-violation database error.
pub async fn insert_ledger(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    client_request_id: &str,
    user_id: Uuid,
    email: &str,
    status: LedgerStatus,
    total_amount_cents: i64,
    currency: &str,
    payment_authorization_id: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO order_ledgers
            (id, client_request_id, user_id, email, status, total_amount_cents,
             currency, payment_authorization_id, retry_count)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0)
        "#,
    )
    .bind(id)
    .bind(client_request_id)
    .bind(user_id)
    .bind(email)
    .bind(status.as_str())
    .bind(total_amount_cents)
    .bind(currency)
    .bind(payment_authorization_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Insert line items for a ledger row inside the same transaction.
pub async fn insert_items(
    tx: &mut Transaction<'_, Postgres>,
    order_ledger_id: Uuid,
    items: &[LedgerItemInsert],
) -> Result<(), sqlx::Error> {
    for item in items {
        sqlx::query(
            r#"
            INSERT INTO order_ledger_items
                (id, order_ledger_id, product_id, quantity, unit_price_cents)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order_ledger_id)
        .bind(item.product_id)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

pub async fn find_by_client_request_id(
    pool: &PgPool,
    client_request_id: &str,
) -> Result<Option<OrderLedger>, sqlx::Error> {
    let sql = format!("SELECT {LEDGER_COLUMNS} FROM order_ledgers WHERE client_request_id = $1");
    let row = sqlx::query_as::<_, LedgerRow>(&sql)
        .bind(client_request_id)
        .fetch_optional(pool)
        .await?;

    row.map(map_ledger).transpose()
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<OrderLedger>, sqlx::Error> {
    let sql = format!("SELECT {LEDGER_COLUMNS} FROM order_ledgers WHERE id = $1");
    let row = sqlx::query_as::<_, LedgerRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(map_ledger).transpose()
}

pub async fn fetch_items(
    pool: &PgPool,
    order_ledger_id: Uuid,
) -> Result<Vec<OrderLedgerItem>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (Uuid, Uuid, Uuid, i32, i64)>(
        r#"
        SELECT id, order_ledger_id, product_id, quantity, unit_price_cents
        FROM order_ledger_items
        WHERE order_ledger_id = $1
        ORDER BY id
        "#,
    )
    .bind(order_ledger_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| OrderLedgerItem {
            id: row.0,
            order_ledger_id: row.1,
            product_id: row.2,
            quantity: row.3,
            unit_price_cents: row.4,
        })
        .collect())
}

/// Conditionally advance a ledger row from `expected` to `to`.
///
/// Returns `true` when the row was in the expected status and moved. A
/// `false` return means another worker got there first (or the row is
/// elsewhere in the graph); callers re-read and resume from the committed
/// status.
pub async fn transition_status(
    pool: &PgPool,
    id: Uuid,
    expected: LedgerStatus,
    to: LedgerStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE order_ledgers
        SET status = $3, updated_at = now()
        WHERE id = $1 AND status = $2
        "#,
    )
    .bind(id)
    .bind(expected.as_str())
    .bind(to.as_str())
    .execute(pool)
    .await?;

    let moved = result.rows_affected() > 0;
    if moved {
        tracing::info!(
            order_ledger_id = %id,
            from = expected.as_str(),
            to = to.as_str(),
            "Ledger status transition"
        );
    }

    Ok(moved)
}

/// Record the remote order id while advancing AUTHORIZED -> ORDER_CREATED.
pub async fn record_order_created(
    pool: &PgPool,
    id: Uuid,
    order_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE order_ledgers
        SET status = $3, order_id = $2, updated_at = now()
        WHERE id = $1 AND status = $4
        "#,
    )
    .bind(id)
    .bind(order_id)
    .bind(LedgerStatus::OrderCreated.as_str())
    .bind(LedgerStatus::Authorized.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Divert an in-flight ledger row to COMPENSATING.
///
/// Only forward states can divert; terminal rows are left untouched.
pub async fn mark_compensating(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE order_ledgers
        SET status = $2, updated_at = now()
        WHERE id = $1
          AND status IN ('AUTHORIZED', 'ORDER_CREATED', 'INVENTORY_RESERVED', 'PAYMENT_CAPTURED')
        "#,
    )
    .bind(id)
    .bind(LedgerStatus::Compensating.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mirror a scheduled saga retry onto the ledger row for audit.
pub async fn record_retry(
    pool: &PgPool,
    id: Uuid,
    next_retry_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE order_ledgers
        SET retry_count = retry_count + 1, next_retry_at = $2, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(next_retry_at)
    .execute(pool)
    .await?;

    Ok(())
}
