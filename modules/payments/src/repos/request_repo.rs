use sqlx::{PgPool, Postgres, Transaction};

/// A mutation outcome stored for byte-for-byte replay on a duplicate
/// idempotency key.
#[derive(Debug, Clone)]
pub struct StoredResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
}

pub async fn find_stored(
    pool: &PgPool,
    idempotency_key: &str,
) -> Result<Option<StoredResponse>, sqlx::Error> {
    let row = sqlx::query_as::<_, (i32, serde_json::Value)>(
        r#"
        SELECT response_status, response_body
        FROM payment_requests
        WHERE idempotency_key = $1
        "#,
    )
    .bind(idempotency_key)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(status, body)| StoredResponse {
        status_code: status as u16,
        body,
    }))
}

/// Record a mutation outcome in the caller's transaction so the response and
/// the state change it describes commit together.
pub async fn store(
    tx: &mut Transaction<'_, Postgres>,
    idempotency_key: &str,
    status_code: u16,
    body: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO payment_requests (idempotency_key, response_status, response_body)
        VALUES ($1, $2, $3)
        ON CONFLICT (idempotency_key) DO NOTHING
        "#,
    )
    .bind(idempotency_key)
    .bind(i32::from(status_code))
    .bind(body)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
