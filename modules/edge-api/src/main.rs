use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use platform_client_payments::HttpPaymentsClient;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use edge_api_rs::{config::Config, db, routes::edge_router, services::order_service::OrderService};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting Edge API...");

    let config = Config::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Connecting to database...");
    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running migrations...");
    sqlx::migrate!("./db/migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let payments = HttpPaymentsClient::new(
        config.payments_service_url.clone(),
        Duration::from_millis(config.http_timeout_ms),
    )
    .expect("Failed to build payments client");

    let service = Arc::new(OrderService::new(pool.clone(), Arc::new(payments)));

    let app = Router::new()
        .merge(edge_router(service))
        .merge(health::health_router(pool, "edge-api-rs"))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Edge API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
