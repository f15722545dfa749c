use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

use crate::models::{OutboxEvent, OutboxStatus};

type OutboxRow = (
    Uuid,
    String,
    String,
    String,
    serde_json::Value,
    String,
    i32,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

fn map_event(row: OutboxRow) -> Result<OutboxEvent, sqlx::Error> {
    let status: OutboxStatus = row.5.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(OutboxEvent {
        id: row.0,
        aggregate_type: row.1,
        aggregate_id: row.2,
        event_type: row.3,
        payload: row.4,
        status,
        retry_count: row.6,
        next_retry_at: row.7,
        created_at: row.8,
        processed_at: row.9,
    })
}

/// Enqueue an event into the transactional outbox.
///
/// Runs inside the caller's transaction so the event commits (or rolls back)
/// together with the business-state write it announces.
pub async fn enqueue<T: Serialize>(
    tx: &mut Transaction<'_, Postgres>,
    event_id: Uuid,
    aggregate_type: &str,
    aggregate_id: &str,
    event_type: &str,
    payload: &T,
) -> Result<(), sqlx::Error> {
    let payload = serde_json::to_value(payload).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    sqlx::query(
        r#"
        INSERT INTO outbox_events
            (id, aggregate_type, aggregate_id, event_type, payload, status, retry_count)
        VALUES ($1, $2, $3, $4, $5, 'PENDING', 0)
        "#,
    )
    .bind(event_id)
    .bind(aggregate_type)
    .bind(aggregate_id)
    .bind(event_type)
    .bind(payload)
    .execute(&mut **tx)
    .await?;

    tracing::debug!(
        event_id = %event_id,
        event_type = %event_type,
        "Event enqueued to outbox"
    );

    Ok(())
}

/// Atomically claim up to `batch_size` due PENDING events.
///
/// One statement: the inner select takes row locks with `SKIP LOCKED` so
/// concurrent pollers never see the same candidates, and the update stamps
/// `next_retry_at` with a visibility timeout before the locks are released.
/// A worker that dies mid-flight leaves its events to become due again once
/// the timeout lapses; every downstream call is idempotent, so redelivery is
/// safe.
pub async fn claim_due(
    pool: &PgPool,
    batch_size: i64,
    visibility_timeout: Duration,
) -> Result<Vec<OutboxEvent>, sqlx::Error> {
    let invisible_until = Utc::now()
        + chrono::Duration::from_std(visibility_timeout)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    let rows = sqlx::query_as::<_, OutboxRow>(
        r#"
        WITH claimed AS (
            SELECT id
            FROM outbox_events
            WHERE status = 'PENDING'
              AND (next_retry_at IS NULL OR next_retry_at <= now())
            ORDER BY created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        UPDATE outbox_events o
        SET next_retry_at = $2
        FROM claimed c
        WHERE o.id = c.id
        RETURNING o.id, o.aggregate_type, o.aggregate_id, o.event_type, o.payload,
                  o.status, o.retry_count, o.next_retry_at, o.created_at, o.processed_at
        "#,
    )
    .bind(batch_size)
    .bind(invisible_until)
    .fetch_all(pool)
    .await?;

    // UPDATE .. RETURNING does not preserve the CTE's ordering.
    let mut events: Vec<OutboxEvent> = rows
        .into_iter()
        .map(map_event)
        .collect::<Result<_, _>>()?;
    events.sort_by_key(|event| event.created_at);

    Ok(events)
}

/// Terminal success: the event's saga reached a terminal outcome.
pub async fn mark_processed(pool: &PgPool, event_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE outbox_events
        SET status = 'PROCESSED', processed_at = now()
        WHERE id = $1
        "#,
    )
    .bind(event_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Safety valve for a poisoned event whose compensation escalation died with
/// an unexpected internal error. Keeps the queue moving; the row stays for
/// operator inspection.
pub async fn mark_failed(pool: &PgPool, event_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE outbox_events
        SET status = 'FAILED', processed_at = now()
        WHERE id = $1
        "#,
    )
    .bind(event_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Schedule the next delivery attempt; the row stays PENDING.
pub async fn schedule_retry(
    pool: &PgPool,
    event_id: Uuid,
    next_retry_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE outbox_events
        SET retry_count = retry_count + 1, next_retry_at = $2
        WHERE id = $1
        "#,
    )
    .bind(event_id)
    .bind(next_retry_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_by_id(pool: &PgPool, event_id: Uuid) -> Result<Option<OutboxEvent>, sqlx::Error> {
    let row = sqlx::query_as::<_, OutboxRow>(
        r#"
        SELECT id, aggregate_type, aggregate_id, event_type, payload,
               status, retry_count, next_retry_at, created_at, processed_at
        FROM outbox_events
        WHERE id = $1
        "#,
    )
    .bind(event_id)
    .fetch_optional(pool)
    .await?;

    row.map(map_event).transpose()
}
