use std::env;

/// Application configuration parsed from environment variables.
///
/// The orchestrator connects to the edge database (it drives the ledger and
/// outbox the edge API writes) and talks to the three downstream services
/// over HTTP.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub orders_service_url: String,
    pub inventory_service_url: String,
    pub payments_service_url: String,
    pub poll_interval_ms: u64,
    pub outbox_batch_size: i64,
    pub poller_workers: usize,
    pub max_retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_backoff_multiplier: f64,
    pub http_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8082".to_string())
            .parse()
            .map_err(|_| "PORT must be a valid u16".to_string())?;

        let poll_interval_ms: u64 = env::var("POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| "POLL_INTERVAL_MS must be a valid u64".to_string())?;

        let outbox_batch_size: i64 = env::var("OUTBOX_BATCH_SIZE")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| "OUTBOX_BATCH_SIZE must be a valid i64".to_string())?;

        let poller_workers: usize = env::var("POLLER_WORKERS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .map_err(|_| "POLLER_WORKERS must be a valid usize".to_string())?;

        let max_retry_attempts: u32 = env::var("MAX_RETRY_ATTEMPTS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .map_err(|_| "MAX_RETRY_ATTEMPTS must be a valid u32".to_string())?;

        let retry_base_delay_ms: u64 = env::var("RETRY_BASE_DELAY_MS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .map_err(|_| "RETRY_BASE_DELAY_MS must be a valid u64".to_string())?;

        let retry_backoff_multiplier: f64 = env::var("RETRY_BACKOFF_MULTIPLIER")
            .unwrap_or_else(|_| "4".to_string())
            .parse()
            .map_err(|_| "RETRY_BACKOFF_MULTIPLIER must be a valid f64".to_string())?;

        let http_timeout_ms: u64 = env::var("HTTP_TIMEOUT_MS")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .map_err(|_| "HTTP_TIMEOUT_MS must be a valid u64".to_string())?;

        Ok(Config {
            port,
            database_url: database_url_from_env("edge_db"),
            orders_service_url: env::var("ORDERS_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8085".to_string()),
            inventory_service_url: env::var("INVENTORY_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8084".to_string()),
            payments_service_url: env::var("PAYMENTS_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8083".to_string()),
            poll_interval_ms,
            outbox_batch_size,
            poller_workers: poller_workers.max(1),
            max_retry_attempts,
            retry_base_delay_ms,
            retry_backoff_multiplier,
            http_timeout_ms,
        })
    }
}

fn database_url_from_env(default_db: &str) -> String {
    if let Ok(url) = env::var("DATABASE_URL") {
        return url;
    }

    let host = env::var("DATABASE_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = env::var("DATABASE_PORT").unwrap_or_else(|_| "5432".to_string());
    let name = env::var("DATABASE_NAME").unwrap_or_else(|_| default_db.to_string());
    let user = env::var("DATABASE_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = env::var("DATABASE_PASSWORD").unwrap_or_else(|_| "postgres".to_string());

    format!("postgres://{user}:{password}@{host}:{port}/{name}")
}
