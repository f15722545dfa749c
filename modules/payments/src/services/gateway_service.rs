//! Mock payment gateway.
//!
//! Token heuristics decide authorise/decline, `MOCK_LATENCY_MS` and
//! `MOCK_FAILURE_RATE` simulate a slow or flaky upstream. Every mutation is
//! keyed: the first call stores its outcome in `payment_requests` inside the
//! same transaction as the state change, and a duplicate key replays that
//! stored response byte-for-byte without touching the state machine again.
//! Injected gateway failures are transient, so they are never stored.

use serde_json::json;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use crate::config::Config;
use crate::models::{AuthorizationResponse, AuthorizationStatus, AuthorizeRequest};
use crate::repos::authorization_repo;
use crate::repos::request_repo::{self, StoredResponse};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway unavailable: {message}")]
    Unavailable { message: String },

    #[error("authorization not found: {authorization_id}")]
    NotFound { authorization_id: String },

    #[error("invalid gateway request: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Outcome of a card token evaluation.
#[derive(Debug, PartialEq, Eq)]
pub enum TokenDecision {
    Approve,
    Decline {
        decline_code: &'static str,
        message: &'static str,
    },
}

/// `tok_decline_<reason>` tokens decline with a code mapped from the reason;
/// everything else authorises.
pub fn evaluate_token(token: &str) -> TokenDecision {
    match token.strip_prefix("tok_decline_") {
        Some("insufficient") => TokenDecision::Decline {
            decline_code: "insufficient_funds",
            message: "Card has insufficient funds",
        },
        Some("expired") => TokenDecision::Decline {
            decline_code: "expired_card",
            message: "Card has expired",
        },
        Some(_) => TokenDecision::Decline {
            decline_code: "card_declined",
            message: "Card was declined",
        },
        None => TokenDecision::Approve,
    }
}

/// Simulated latency and failure injection shared by every gateway call.
async fn simulate_upstream(config: &Config) -> Result<(), GatewayError> {
    if config.mock_latency_ms > 0 {
        tokio::time::sleep(Duration::from_millis(config.mock_latency_ms)).await;
    }

    if config.mock_failure_rate > 0.0 && fastrand::f64() < config.mock_failure_rate {
        return Err(GatewayError::Unavailable {
            message: "simulated gateway failure".to_string(),
        });
    }

    Ok(())
}

pub async fn authorize(
    pool: &PgPool,
    config: &Config,
    request: &AuthorizeRequest,
) -> Result<StoredResponse, GatewayError> {
    if request.idempotency_key.trim().is_empty() {
        return Err(GatewayError::Validation(
            "idempotency_key must not be empty".into(),
        ));
    }
    if request.token.trim().is_empty() {
        return Err(GatewayError::Validation("token must not be empty".into()));
    }
    if request.amount_cents < 0 {
        return Err(GatewayError::Validation(
            "amount_cents must be non-negative".into(),
        ));
    }

    if let Some(stored) = request_repo::find_stored(pool, &request.idempotency_key).await? {
        tracing::info!(
            idempotency_key = %request.idempotency_key,
            "Replaying stored authorize response"
        );
        return Ok(stored);
    }

    simulate_upstream(config).await?;

    match evaluate_token(&request.token) {
        TokenDecision::Decline {
            decline_code,
            message,
        } => {
            let body = json!({
                "error": "payment_declined",
                "decline_code": decline_code,
                "message": message,
                "is_retryable": false,
            });
            let response = StoredResponse {
                status_code: 402,
                body,
            };

            let mut tx = pool.begin().await?;
            request_repo::store(&mut tx, &request.idempotency_key, 402, &response.body).await?;
            tx.commit().await?;

            tracing::info!(
                user_id = %request.user_id,
                decline_code,
                "Authorization declined"
            );

            Ok(response)
        }
        TokenDecision::Approve => {
            let authorization_id = format!("auth_{}", Uuid::new_v4().simple());
            let mut tx = pool.begin().await?;

            let inserted = authorization_repo::insert_authorization(
                &mut tx,
                &authorization_id,
                request.user_id,
                request.amount_cents,
                &request.currency,
                &request.idempotency_key,
            )
            .await;

            if let Err(e) = inserted {
                if is_unique_violation(&e) {
                    // Lost the race to a concurrent duplicate; its stored
                    // response is the result.
                    drop(tx);
                    return request_repo::find_stored(pool, &request.idempotency_key)
                        .await?
                        .ok_or(GatewayError::Unavailable {
                            message: "duplicate authorize still in flight".to_string(),
                        });
                }
                return Err(e.into());
            }

            let body = serde_json::to_value(AuthorizationResponse {
                authorization_id: authorization_id.clone(),
                status: AuthorizationStatus::Authorized.as_str().to_string(),
                amount_cents: request.amount_cents,
                currency: request.currency.clone(),
            })
            .map_err(|e| GatewayError::Validation(e.to_string()))?;

            request_repo::store(&mut tx, &request.idempotency_key, 200, &body).await?;
            tx.commit().await?;

            tracing::info!(
                authorization_id = %authorization_id,
                user_id = %request.user_id,
                amount_cents = request.amount_cents,
                "Payment authorized"
            );

            Ok(StoredResponse {
                status_code: 200,
                body,
            })
        }
    }
}

pub async fn capture(
    pool: &PgPool,
    config: &Config,
    authorization_id: &str,
    idempotency_key: &str,
) -> Result<StoredResponse, GatewayError> {
    mutate(
        pool,
        config,
        authorization_id,
        idempotency_key,
        AuthorizationStatus::Captured,
    )
    .await
}

pub async fn void(
    pool: &PgPool,
    config: &Config,
    authorization_id: &str,
    idempotency_key: &str,
) -> Result<StoredResponse, GatewayError> {
    mutate(
        pool,
        config,
        authorization_id,
        idempotency_key,
        AuthorizationStatus::Voided,
    )
    .await
}

/// Shared capture/void path: AUTHORIZED -> `target`, answering the opposing
/// terminal state with a 409 that is itself stored for replay.
async fn mutate(
    pool: &PgPool,
    config: &Config,
    authorization_id: &str,
    idempotency_key: &str,
    target: AuthorizationStatus,
) -> Result<StoredResponse, GatewayError> {
    if idempotency_key.trim().is_empty() {
        return Err(GatewayError::Validation(
            "idempotency_key must not be empty".into(),
        ));
    }

    if let Some(stored) = request_repo::find_stored(pool, idempotency_key).await? {
        tracing::info!(
            idempotency_key = %idempotency_key,
            authorization_id = %authorization_id,
            "Replaying stored mutation response"
        );
        return Ok(stored);
    }

    simulate_upstream(config).await?;

    let mut tx = pool.begin().await?;

    let updated = authorization_repo::transition_status(
        &mut tx,
        authorization_id,
        AuthorizationStatus::Authorized,
        target,
    )
    .await?;

    if let Some(authorization) = updated {
        let body = serde_json::to_value(AuthorizationResponse::from(&authorization))
            .map_err(|e| GatewayError::Validation(e.to_string()))?;
        request_repo::store(&mut tx, idempotency_key, 200, &body).await?;
        tx.commit().await?;

        tracing::info!(
            authorization_id = %authorization_id,
            status = authorization.status.as_str(),
            "Authorization state changed"
        );

        return Ok(StoredResponse {
            status_code: 200,
            body,
        });
    }

    // Not in AUTHORIZED: distinguish missing from already-terminal.
    let current = authorization_repo::find_by_id(pool, authorization_id)
        .await?
        .ok_or_else(|| GatewayError::NotFound {
            authorization_id: authorization_id.to_string(),
        })?;

    let (error, message) = match current.status {
        AuthorizationStatus::Captured => {
            ("already_captured", "Authorization was already captured")
        }
        AuthorizationStatus::Voided => ("already_voided", "Authorization was already voided"),
        AuthorizationStatus::Authorized => {
            // Raced with another mutation between the update and this read;
            // surface as transient so the caller retries.
            return Err(GatewayError::Unavailable {
                message: "concurrent mutation in flight".to_string(),
            });
        }
    };

    let body = json!({
        "error": error,
        "message": message,
        "is_retryable": false,
    });
    request_repo::store(&mut tx, idempotency_key, 409, &body).await?;
    tx.commit().await?;

    tracing::warn!(
        authorization_id = %authorization_id,
        error,
        "Rejected authorization state change"
    );

    Ok(StoredResponse {
        status_code: 409,
        body,
    })
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Database(db)
            if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decline_token_mapping() {
        assert_eq!(
            evaluate_token("tok_decline_insufficient"),
            TokenDecision::Decline {
                decline_code: "insufficient_funds",
                message: "Card has insufficient funds",
            }
        );
        assert_eq!(
            evaluate_token("tok_decline_expired"),
            TokenDecision::Decline {
                decline_code: "expired_card",
                message: "Card has expired",
            }
        );
        assert_eq!(
            evaluate_token("tok_decline_gibberish"),
            TokenDecision::Decline {
                decline_code: "card_declined",
                message: "Card was declined",
            }
        );
    }

    #[test]
    fn test_ordinary_tokens_approve() {
        assert_eq!(evaluate_token("tok_ok"), TokenDecision::Approve);
        assert_eq!(evaluate_token("tok_visa_4242"), TokenDecision::Approve);
        // The prefix must match exactly.
        assert_eq!(evaluate_token("tok_declined"), TokenDecision::Approve);
    }
}
