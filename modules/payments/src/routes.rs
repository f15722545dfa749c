use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;

use crate::config::Config;
use crate::models::{AuthorizationResponse, AuthorizeRequest, ErrorResponse, MutationRequest};
use crate::repos::authorization_repo;
use crate::services::gateway_service::{self, GatewayError};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
}

pub fn payments_router(pool: PgPool, config: Config) -> Router {
    Router::new()
        .route("/payments/authorize", post(authorize))
        .route("/payments/capture/{authorization_id}", post(capture))
        .route("/payments/void/{authorization_id}", post(void))
        .route(
            "/payments/authorizations/{authorization_id}",
            get(get_authorization),
        )
        .with_state(AppState { pool, config })
}

type ErrorReply = (StatusCode, Json<serde_json::Value>);

fn map_error(e: GatewayError) -> ErrorReply {
    match e {
        GatewayError::Unavailable { message } => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "gateway_error",
                "message": message,
                "is_retryable": true,
            })),
        ),
        GatewayError::NotFound { authorization_id } => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "authorization_not_found",
                "message": format!("No authorization {authorization_id}"),
            })),
        ),
        GatewayError::Validation(message) => (
            StatusCode::BAD_REQUEST,
            Json(
                serde_json::to_value(ErrorResponse::new("validation_error", message))
                    .unwrap_or_default(),
            ),
        ),
        GatewayError::Database(e) => {
            tracing::error!(error = %e, "Database error in payments service");
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

fn reply(stored: crate::repos::request_repo::StoredResponse) -> (StatusCode, Json<serde_json::Value>) {
    let status = StatusCode::from_u16(stored.status_code)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(stored.body))
}

/// POST /payments/authorize
async fn authorize(
    State(state): State<AppState>,
    Json(request): Json<AuthorizeRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ErrorReply> {
    let stored = gateway_service::authorize(&state.pool, &state.config, &request)
        .await
        .map_err(map_error)?;

    Ok(reply(stored))
}

/// POST /payments/capture/{authorization_id}
async fn capture(
    State(state): State<AppState>,
    Path(authorization_id): Path<String>,
    Json(request): Json<MutationRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ErrorReply> {
    let stored = gateway_service::capture(
        &state.pool,
        &state.config,
        &authorization_id,
        &request.idempotency_key,
    )
    .await
    .map_err(map_error)?;

    Ok(reply(stored))
}

/// POST /payments/void/{authorization_id}
async fn void(
    State(state): State<AppState>,
    Path(authorization_id): Path<String>,
    Json(request): Json<MutationRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ErrorReply> {
    let stored = gateway_service::void(
        &state.pool,
        &state.config,
        &authorization_id,
        &request.idempotency_key,
    )
    .await
    .map_err(map_error)?;

    Ok(reply(stored))
}

/// GET /payments/authorizations/{authorization_id}
async fn get_authorization(
    State(state): State<AppState>,
    Path(authorization_id): Path<String>,
) -> Result<Json<AuthorizationResponse>, ErrorReply> {
    let authorization = authorization_repo::find_by_id(&state.pool, &authorization_id)
        .await
        .map_err(|e| map_error(GatewayError::Database(e)))?
        .ok_or_else(|| map_error(GatewayError::NotFound { authorization_id }))?;

    Ok(Json(AuthorizationResponse::from(&authorization)))
}
