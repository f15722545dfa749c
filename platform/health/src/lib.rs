//! Shared health check endpoint for all services.
//!
//! Every service mounts `GET /health` through [`health_router`]. The probe
//! runs `SELECT 1` against the service's own pool and reports round-trip
//! latency; a failed probe answers 503 so orchestration layers can pull the
//! instance out of rotation.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::time::Instant;

#[derive(Clone)]
struct HealthState {
    pool: PgPool,
    service: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthyResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub database: &'static str,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UnhealthyResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub database: &'static str,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Build a router exposing `GET /health` for the given service.
pub fn health_router(pool: PgPool, service: &'static str) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(HealthState { pool, service })
}

async fn health(
    State(state): State<HealthState>,
) -> Result<Json<HealthyResponse>, (StatusCode, Json<UnhealthyResponse>)> {
    let started = Instant::now();

    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => Ok(Json(HealthyResponse {
            status: "healthy",
            service: state.service,
            database: "connected",
            latency_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        })),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(UnhealthyResponse {
                status: "unhealthy",
                service: state.service,
                database: "disconnected",
                error: e.to_string(),
                timestamp: Utc::now(),
            }),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_wire_shape() {
        let response = HealthyResponse {
            status: "healthy",
            service: "edge-api-rs",
            database: "connected",
            latency_ms: 2,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["database"], "connected");
        assert!(json.get("latency_ms").is_some());
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn test_unhealthy_wire_shape() {
        let response = UnhealthyResponse {
            status: "unhealthy",
            service: "edge-api-rs",
            database: "disconnected",
            error: "connection refused".to_string(),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["database"], "disconnected");
        assert_eq!(json["error"], "connection refused");
    }
}
