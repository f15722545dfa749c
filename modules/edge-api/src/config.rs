use std::env;

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub payments_service_url: String,
    pub http_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8081".to_string())
            .parse()
            .map_err(|_| "PORT must be a valid u16".to_string())?;

        let payments_service_url = env::var("PAYMENTS_SERVICE_URL")
            .unwrap_or_else(|_| "http://localhost:8083".to_string());

        let http_timeout_ms: u64 = env::var("HTTP_TIMEOUT_MS")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .map_err(|_| "HTTP_TIMEOUT_MS must be a valid u64".to_string())?;

        Ok(Config {
            port,
            database_url: database_url_from_env("edge_db"),
            payments_service_url,
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
