use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{Reservation, ReservationStatus};

type ReservationRow = (Uuid, Uuid, Uuid, i32, String, DateTime<Utc>, DateTime<Utc>);

const RESERVATION_COLUMNS: &str =
    "id, order_id, product_id, quantity, status, created_at, updated_at";

fn map_reservation(row: ReservationRow) -> Result<Reservation, sqlx::Error> {
    let status: ReservationStatus = row
        .4
        .parse()
        .map_err(|e: String| sqlx::Error::Decode(e.into()))?;

    Ok(Reservation {
        id: row.0,
        order_id: row.1,
        product_id: row.2,
        quantity: row.3,
        status,
        created_at: row.5,
        updated_at: row.6,
    })
}

/// All live reservations for an order, inside the caller's transaction.
pub async fn find_reserved_by_order(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
) -> Result<Vec<Reservation>, sqlx::Error> {
    let sql = format!(
        "SELECT {RESERVATION_COLUMNS} FROM reservations \
         WHERE order_id = $1 AND status = 'RESERVED' ORDER BY created_at"
    );
    let rows = sqlx::query_as::<_, ReservationRow>(&sql)
        .bind(order_id)
        .fetch_all(&mut **tx)
        .await?;

    rows.into_iter().map(map_reservation).collect()
}

pub async fn insert_reservation(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO reservations (id, order_id, product_id, quantity, status)
        VALUES ($1, $2, $3, $4, 'RESERVED')
        "#,
    )
    .bind(id)
    .bind(order_id)
    .bind(product_id)
    .bind(quantity)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Transition every RESERVED row of an order to RELEASED, returning what was
/// released so the caller can restore stock in the same transaction.
/// Already-released rows are untouched, which is what makes release
/// idempotent.
pub async fn release_all_for_order(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
) -> Result<Vec<(Uuid, Uuid, i32)>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (Uuid, Uuid, i32)>(
        r#"
        UPDATE reservations
        SET status = 'RELEASED', updated_at = now()
        WHERE order_id = $1 AND status = 'RESERVED'
        RETURNING id, product_id, quantity
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows)
}

/// Total quantity currently reserved against a product.
pub async fn reserved_quantity_for_product(
    pool: &PgPool,
    product_id: Uuid,
) -> Result<i64, sqlx::Error> {
    let total: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT SUM(quantity)::BIGINT
        FROM reservations
        WHERE product_id = $1 AND status = 'RESERVED'
        "#,
    )
    .bind(product_id)
    .fetch_one(pool)
    .await?;

    Ok(total.unwrap_or(0))
}
