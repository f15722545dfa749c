use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::models::{
    CreateOrderAccepted, CreateOrderRequest, ErrorResponse, LedgerResponse,
};
use crate::services::order_service::{CreateOrderOutcome, EdgeError, OrderService};

type ErrorReply = (StatusCode, Json<serde_json::Value>);

fn map_error(e: EdgeError) -> ErrorReply {
    match e {
        EdgeError::Validation(e) => (
            StatusCode::BAD_REQUEST,
            Json(
                serde_json::to_value(ErrorResponse::new("validation_error", e.to_string()))
                    .unwrap_or_default(),
            ),
        ),
        EdgeError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(
                serde_json::to_value(ErrorResponse::new(
                    "not_found",
                    "No such order ledger entry",
                ))
                .unwrap_or_default(),
            ),
        ),
        EdgeError::Gateway { message } => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "gateway_error",
                "message": message,
                "is_retryable": true,
            })),
        ),
        EdgeError::Database(e) => {
            tracing::error!(error = %e, "Database error in edge API");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(
                    serde_json::to_value(ErrorResponse::new(
                        "internal_error",
                        "Internal server error",
                    ))
                    .unwrap_or_default(),
                ),
            )
        }
    }
}

/// POST /orders
pub async fn create_order(
    State(service): State<Arc<OrderService>>,
    headers: HeaderMap,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ErrorReply> {
    let idempotency_key = headers
        .get("Idempotency-Key")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(
                    serde_json::to_value(ErrorResponse::new(
                        "missing_idempotency_key",
                        "The Idempotency-Key header is required",
                    ))
                    .unwrap_or_default(),
                ),
            )
        })?;

    let outcome = service
        .create_order(idempotency_key, &request)
        .await
        .map_err(map_error)?;

    match outcome {
        CreateOrderOutcome::Accepted(ledger) => Ok((
            StatusCode::ACCEPTED,
            Json(
                serde_json::to_value(CreateOrderAccepted {
                    order_ledger_id: ledger.id,
                    status: ledger.status.as_str().to_string(),
                    message: "Order accepted for processing".to_string(),
                })
                .unwrap_or_default(),
            ),
        )),
        CreateOrderOutcome::Duplicate(ledger) => Ok((
            StatusCode::CONFLICT,
            Json(json!({
                "error": "duplicate_request",
                "order_ledger_id": ledger.id,
                "status": ledger.status.as_str(),
            })),
        )),
        CreateOrderOutcome::Declined {
            decline_code,
            message,
        } => Ok((
            StatusCode::PAYMENT_REQUIRED,
            Json(json!({
                "error": "payment_declined",
                "decline_code": decline_code,
                "message": message,
                "is_retryable": false,
            })),
        )),
    }
}

/// GET /orders/{order_ledger_id}
pub async fn get_order(
    State(service): State<Arc<OrderService>>,
    Path(order_ledger_id): Path<Uuid>,
) -> Result<Json<LedgerResponse>, ErrorReply> {
    let (ledger, items) = service.get_order(order_ledger_id).await.map_err(map_error)?;

    Ok(Json(LedgerResponse::from_parts(ledger, items)))
}
