use std::env;

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Artificial processing delay for every gateway call.
    pub mock_latency_ms: u64,
    /// Probability (0.0..=1.0) that a call fails with a gateway error.
    pub mock_failure_rate: f64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8083".to_string())
            .parse()
            .map_err(|_| "PORT must be a valid u16".to_string())?;

        let mock_latency_ms: u64 = env::var("MOCK_LATENCY_MS")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .map_err(|_| "MOCK_LATENCY_MS must be a valid u64".to_string())?;

        let mock_failure_rate: f64 = env::var("MOCK_FAILURE_RATE")
            .unwrap_or_else(|_| "0.0".to_string())
            .parse()
            .map_err(|_| "MOCK_FAILURE_RATE must be a valid f64".to_string())?;

        Ok(Config {
            port,
            database_url: database_url_from_env("payments_db"),
            mock_latency_ms,
            mock_failure_rate: mock_failure_rate.clamp(0.0, 1.0),
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
