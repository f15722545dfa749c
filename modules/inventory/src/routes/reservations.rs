use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post},
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    ErrorResponse, ReleaseStockResponse, ReserveStockRequest, ReserveStockResponse,
};
use crate::services::reservation_service::{self, ReservationError, ReserveOutcome};

pub fn router() -> Router<PgPool> {
    Router::new()
        .route("/reservations", post(reserve_stock))
        .route("/reservations/{order_id}", delete(release_stock))
}

type ErrorReply = (StatusCode, Json<serde_json::Value>);

fn map_error(e: ReservationError) -> ErrorReply {
    match e {
        ReservationError::ProductNotFound { product_id } => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "product_not_found",
                "product_id": product_id,
                "message": "No such product",
            })),
        ),
        ReservationError::InsufficientStock {
            product_id,
            product_sku,
            requested,
            available,
        } => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": "insufficient_stock",
                "product_id": product_id,
                "product_sku": product_sku,
                "requested": requested,
                "available": available,
            })),
        ),
        ReservationError::Validation(message) => (
            StatusCode::BAD_REQUEST,
            Json(
                serde_json::to_value(ErrorResponse::new("validation_error", message))
                    .unwrap_or_default(),
            ),
        ),
        ReservationError::Database(e) => {
            tracing::error!(error = %e, "Database error in reservation engine");
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

/// POST /reservations (all-or-nothing, idempotent on order_id)
async fn reserve_stock(
    State(pool): State<PgPool>,
    Json(request): Json<ReserveStockRequest>,
) -> Result<(StatusCode, Json<ReserveStockResponse>), ErrorReply> {
    let order_id = request.order_id;
    let outcome = reservation_service::reserve(&pool, &request)
        .await
        .map_err(map_error)?;

    let reservations = outcome.reservations();
    let response = ReserveStockResponse {
        order_id,
        reservation_ids: reservations.iter().map(|r| r.id).collect(),
        line_items_reserved: reservations.len() as i32,
        total_quantity_reserved: reservations.iter().map(|r| i64::from(r.quantity)).sum(),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// DELETE /reservations/{order_id} (idempotent)
async fn release_stock(
    State(pool): State<PgPool>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ReleaseStockResponse>, ErrorReply> {
    let (reservations_released, quantity_restored) =
        reservation_service::release(&pool, order_id)
            .await
            .map_err(map_error)?;

    Ok(Json(ReleaseStockResponse {
        order_id,
        reservations_released,
        quantity_restored,
    }))
}
