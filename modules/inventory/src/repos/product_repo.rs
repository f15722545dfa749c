use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::Product;

type ProductRow = (Uuid, String, String, i32, DateTime<Utc>, DateTime<Utc>);

const PRODUCT_COLUMNS: &str = "id, sku, name, stock_quantity, created_at, updated_at";

fn map_product(row: ProductRow) -> Product {
    Product {
        id: row.0,
        sku: row.1,
        name: row.2,
        stock_quantity: row.3,
        created_at: row.4,
        updated_at: row.5,
    }
}

pub async fn insert_product(
    pool: &PgPool,
    id: Uuid,
    sku: &str,
    name: &str,
    initial_stock: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO products (id, sku, name, stock_quantity)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(id)
    .bind(sku)
    .bind(name)
    .bind(initial_stock)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Product>, sqlx::Error> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
    let row = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(map_product))
}

/// Lock a product row for the remainder of the transaction.
///
/// Reservation and adjustment transactions serialise on this lock, which is
/// what makes the check-then-decrement on stock safe under concurrency.
pub async fn find_by_id_for_update(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<Product>, sqlx::Error> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE");
    let row = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

    Ok(row.map(map_product))
}

/// Apply a stock delta inside the caller's transaction. The row must already
/// be locked via [`find_by_id_for_update`].
pub async fn apply_stock_delta(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    delta: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE products
        SET stock_quantity = stock_quantity + $2, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(delta)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
