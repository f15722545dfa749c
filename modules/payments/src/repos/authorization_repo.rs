use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{Authorization, AuthorizationStatus};

type AuthorizationRow = (
    String,
    Uuid,
    i64,
    String,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

const AUTHORIZATION_COLUMNS: &str = "authorization_id, user_id, amount_cents, currency, status, \
     idempotency_key, created_at, updated_at";

fn map_authorization(row: AuthorizationRow) -> Result<Authorization, sqlx::Error> {
    let status: AuthorizationStatus = row
        .4
        .parse()
        .map_err(|e: String| sqlx::Error::Decode(e.into()))?;

    Ok(Authorization {
        authorization_id: row.0,
        user_id: row.1,
        amount_cents: row.2,
        currency: row.3,
        status,
        idempotency_key: row.5,
        created_at: row.6,
        updated_at: row.7,
    })
}

pub async fn insert_authorization(
    tx: &mut Transaction<'_, Postgres>,
    authorization_id: &str,
    user_id: Uuid,
    amount_cents: i64,
    currency: &str,
    idempotency_key: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO payment_authorizations
            (authorization_id, user_id, amount_cents, currency, status, idempotency_key)
        VALUES ($1, $2, $3, $4, 'AUTHORIZED', $5)
        "#,
    )
    .bind(authorization_id)
    .bind(user_id)
    .bind(amount_cents)
    .bind(currency)
    .bind(idempotency_key)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn find_by_id(
    pool: &PgPool,
    authorization_id: &str,
) -> Result<Option<Authorization>, sqlx::Error> {
    let sql = format!(
        "SELECT {AUTHORIZATION_COLUMNS} FROM payment_authorizations WHERE authorization_id = $1"
    );
    let row = sqlx::query_as::<_, AuthorizationRow>(&sql)
        .bind(authorization_id)
        .fetch_optional(pool)
        .await?;

    row.map(map_authorization).transpose()
}

/// Conditionally transition an authorization inside the caller's transaction.
///
/// Returns the updated row when it was in the expected status; `None` means
/// the authorization is elsewhere in the state machine (or missing) and the
/// caller decides between 404 and 409.
pub async fn transition_status(
    tx: &mut Transaction<'_, Postgres>,
    authorization_id: &str,
    expected: AuthorizationStatus,
    to: AuthorizationStatus,
) -> Result<Option<Authorization>, sqlx::Error> {
    let sql = format!(
        "UPDATE payment_authorizations \
         SET status = $3, updated_at = now() \
         WHERE authorization_id = $1 AND status = $2 \
         RETURNING {AUTHORIZATION_COLUMNS}"
    );
    let row = sqlx::query_as::<_, AuthorizationRow>(&sql)
        .bind(authorization_id)
        .bind(expected.as_str())
        .bind(to.as_str())
        .fetch_optional(&mut **tx)
        .await?;

    row.map(map_authorization).transpose()
}
