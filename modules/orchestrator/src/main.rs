use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use platform_client_inventory::HttpInventoryClient;
use platform_client_orders::HttpOrdersClient;
use platform_client_payments::HttpPaymentsClient;

use orchestrator_rs::{
    compensation::CompensationExecutor,
    config::Config,
    db, listener,
    poller::{Poller, PollerSettings},
    retry::RetryPolicy,
    saga::SagaExecutor,
    store::{LedgerStore, PgLedgerStore},
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting Orchestrator...");

    let config = Config::from_env().expect("Failed to load configuration from environment");

    tracing::info!(
        poll_interval_ms = config.poll_interval_ms,
        max_retry_attempts = config.max_retry_attempts,
        poller_workers = config.poller_workers,
        "Saga configuration loaded"
    );

    tracing::info!("Connecting to edge database...");
    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    let timeout = Duration::from_millis(config.http_timeout_ms);
    let orders = Arc::new(
        HttpOrdersClient::new(config.orders_service_url.clone(), timeout)
            .expect("Failed to build orders client"),
    );
    let inventory = Arc::new(
        HttpInventoryClient::new(config.inventory_service_url.clone(), timeout)
            .expect("Failed to build inventory client"),
    );
    let payments = Arc::new(
        HttpPaymentsClient::new(config.payments_service_url.clone(), timeout)
            .expect("Failed to build payments client"),
    );

    let ledger: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(pool.clone()));
    let policy = RetryPolicy::new(
        config.max_retry_attempts,
        Duration::from_millis(config.retry_base_delay_ms),
        config.retry_backoff_multiplier,
    );

    let executor = Arc::new(SagaExecutor::new(
        ledger.clone(),
        orders.clone(),
        inventory.clone(),
        payments.clone(),
        policy,
    ));
    let compensation = Arc::new(CompensationExecutor::new(
        ledger.clone(),
        orders,
        inventory,
        payments,
    ));

    // Change-notification channel: the listener is the single producer, the
    // first poller worker the single consumer.
    let (wakeup_tx, wakeup_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(listener::run_outbox_listener(
        config.database_url.clone(),
        wakeup_tx,
    ));

    let settings = PollerSettings {
        poll_interval: Duration::from_millis(config.poll_interval_ms),
        batch_size: config.outbox_batch_size,
    };

    let mut wakeup_rx = Some(wakeup_rx);
    for worker in 0..config.poller_workers {
        let poller = Poller::new(
            pool.clone(),
            ledger.clone(),
            executor.clone(),
            compensation.clone(),
            settings.clone(),
        );
        let wakeups = wakeup_rx.take();
        tokio::spawn(async move {
            tracing::info!(worker, "Poller worker spawned");
            poller.run(wakeups).await;
        });
    }

    let app = Router::new()
        .merge(health::health_router(pool, "orchestrator-rs"))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Orchestrator listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
