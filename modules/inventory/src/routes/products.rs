use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    AddStockRequest, AvailabilityResponse, CreateProductRequest, ErrorResponse, ProductResponse,
    StockAdjustmentResponse,
};
use crate::services::product_service::{self, ProductError};
use crate::services::stock_service::{self, AddStockOutcome, StockError};

pub fn router() -> Router<PgPool> {
    Router::new()
        .route("/products", post(create_product))
        .route("/products/{product_id}/availability", get(availability))
        .route("/products/{product_id}/stock", post(add_stock))
}

type ErrorReply = (StatusCode, Json<serde_json::Value>);

fn map_product_error(e: ProductError) -> ErrorReply {
    match e {
        ProductError::NotFound { product_id } => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "product_not_found",
                "product_id": product_id,
                "message": "No such product",
            })),
        ),
        ProductError::DuplicateSku { sku } => (
            StatusCode::CONFLICT,
            Json(serde_json::to_value(ErrorResponse::new(
                "duplicate_sku",
                format!("A product with sku {sku} already exists"),
            ))
            .unwrap_or_default()),
        ),
        ProductError::Validation(message) => (
            StatusCode::BAD_REQUEST,
            Json(
                serde_json::to_value(ErrorResponse::new("validation_error", message))
                    .unwrap_or_default(),
            ),
        ),
        ProductError::Database(e) => {
            tracing::error!(error = %e, "Database error in inventory service");
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

fn map_stock_error(e: StockError) -> ErrorReply {
    match e {
        StockError::ProductNotFound { product_id } => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "product_not_found",
                "product_id": product_id,
                "message": "No such product",
            })),
        ),
        StockError::Validation(message) => (
            StatusCode::BAD_REQUEST,
            Json(
                serde_json::to_value(ErrorResponse::new("validation_error", message))
                    .unwrap_or_default(),
            ),
        ),
        StockError::Database(e) => {
            tracing::error!(error = %e, "Database error in inventory service");
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

/// POST /products
async fn create_product(
    State(pool): State<PgPool>,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ErrorReply> {
    let product = product_service::create(&pool, &request)
        .await
        .map_err(map_product_error)?;

    Ok((
        StatusCode::CREATED,
        Json(ProductResponse {
            product_id: product.id,
            sku: product.sku,
            name: product.name,
            stock_quantity: product.stock_quantity,
            created_at: product.created_at,
        }),
    ))
}

/// GET /products/{product_id}/availability
async fn availability(
    State(pool): State<PgPool>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<AvailabilityResponse>, ErrorReply> {
    let response = product_service::availability(&pool, product_id)
        .await
        .map_err(map_product_error)?;

    Ok(Json(response))
}

/// POST /products/{product_id}/stock (idempotent on idempotency_key)
async fn add_stock(
    State(pool): State<PgPool>,
    Path(product_id): Path<Uuid>,
    Json(request): Json<AddStockRequest>,
) -> Result<(StatusCode, Json<StockAdjustmentResponse>), ErrorReply> {
    let outcome = stock_service::add_stock(&pool, product_id, &request)
        .await
        .map_err(map_stock_error)?;

    match outcome {
        AddStockOutcome::Applied(adjustment) => {
            Ok((StatusCode::CREATED, Json(adjustment.into())))
        }
        AddStockOutcome::AlreadyExists(adjustment) => Ok((StatusCode::OK, Json(adjustment.into()))),
    }
}
