use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::StockAdjustment;

type AdjustmentRow = (
    Uuid,
    Uuid,
    i32,
    i32,
    i32,
    String,
    String,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
);

const ADJUSTMENT_COLUMNS: &str = "id, product_id, quantity_change, previous_quantity, \
     new_quantity, reason, idempotency_key, reference_id, notes, created_at";

fn map_adjustment(row: AdjustmentRow) -> StockAdjustment {
    StockAdjustment {
        id: row.0,
        product_id: row.1,
        quantity_change: row.2,
        previous_quantity: row.3,
        new_quantity: row.4,
        reason: row.5,
        idempotency_key: row.6,
        reference_id: row.7,
        notes: row.8,
        created_at: row.9,
    }
}

pub async fn insert_adjustment(
    tx: &mut Transaction<'_, Postgres>,
    adjustment: &StockAdjustment,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO stock_adjustments
            (id, product_id, quantity_change, previous_quantity, new_quantity,
             reason, idempotency_key, reference_id, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(adjustment.id)
    .bind(adjustment.product_id)
    .bind(adjustment.quantity_change)
    .bind(adjustment.previous_quantity)
    .bind(adjustment.new_quantity)
    .bind(&adjustment.reason)
    .bind(&adjustment.idempotency_key)
    .bind(&adjustment.reference_id)
    .bind(&adjustment.notes)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn find_by_idempotency_key(
    pool: &PgPool,
    idempotency_key: &str,
) -> Result<Option<StockAdjustment>, sqlx::Error> {
    let sql =
        format!("SELECT {ADJUSTMENT_COLUMNS} FROM stock_adjustments WHERE idempotency_key = $1");
    let row = sqlx::query_as::<_, AdjustmentRow>(&sql)
        .bind(idempotency_key)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(map_adjustment))
}

/// Same lookup inside an open transaction, used after the product row lock
/// is held so duplicate checks are serialised with the stock write.
pub async fn find_by_idempotency_key_tx(
    tx: &mut Transaction<'_, Postgres>,
    idempotency_key: &str,
) -> Result<Option<StockAdjustment>, sqlx::Error> {
    let sql =
        format!("SELECT {ADJUSTMENT_COLUMNS} FROM stock_adjustments WHERE idempotency_key = $1");
    let row = sqlx::query_as::<_, AdjustmentRow>(&sql)
        .bind(idempotency_key)
        .fetch_optional(&mut **tx)
        .await?;

    Ok(row.map(map_adjustment))
}
