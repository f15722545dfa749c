use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreateOrderRequest, ErrorResponse, OrderResponse};
use crate::services::order_service::{self, OrderError};

pub fn orders_router(pool: PgPool) -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{order_id}", get(get_order))
        .route("/orders/{order_id}/cancellation", post(cancel_order))
        .route("/orders/{order_id}/confirmation", post(confirm_order))
        .with_state(pool)
}

type ErrorReply = (StatusCode, Json<ErrorResponse>);

fn map_error(e: OrderError) -> ErrorReply {
    match e {
        OrderError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("order_not_found", "No such order")),
        ),
        OrderError::InvalidTransition { .. } => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("invalid_order_status", e.to_string())),
        ),
        OrderError::Validation(message) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("validation_error", message)),
        ),
        OrderError::Database(e) => {
            tracing::error!(error = %e, "Database error in orders service");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("internal_error", "Internal server error")),
            )
        }
    }
}

/// POST /orders (idempotent on order_ledger_id)
async fn create_order(
    State(pool): State<PgPool>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ErrorReply> {
    let (order, items, created) = order_service::create(&pool, &request)
        .await
        .map_err(map_error)?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(OrderResponse::from_parts(order, items))))
}

/// GET /orders/{order_id}
async fn get_order(
    State(pool): State<PgPool>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ErrorReply> {
    let (order, items) = order_service::find(&pool, order_id)
        .await
        .map_err(map_error)?;

    Ok(Json(OrderResponse::from_parts(order, items)))
}

/// POST /orders/{order_id}/cancellation
async fn cancel_order(
    State(pool): State<PgPool>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ErrorReply> {
    let (order, items) = order_service::cancel(&pool, order_id)
        .await
        .map_err(map_error)?;

    Ok(Json(OrderResponse::from_parts(order, items)))
}

/// POST /orders/{order_id}/confirmation
async fn confirm_order(
    State(pool): State<PgPool>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ErrorReply> {
    let (order, items) = order_service::confirm(&pool, order_id)
        .await
        .map_err(map_error)?;

    Ok(Json(OrderResponse::from_parts(order, items)))
}
