//! Typed client for the Inventory service.
//!
//! [`InventoryApi`] is the seam the orchestrator programs against for
//! reserve/release; [`HttpInventoryClient`] is the production
//! implementation. Reservations are keyed by `order_id`, so a retried
//! reserve collapses to the pre-existing reservation set server-side.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// One line of a reservation request.
#[derive(Debug, Clone, Serialize)]
pub struct ReserveLineItem {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Request body for `POST /reservations`.
#[derive(Debug, Clone, Serialize)]
pub struct ReserveStockRequest {
    pub order_id: Uuid,
    pub items: Vec<ReserveLineItem>,
}

/// Response for a (possibly pre-existing) reservation set.
#[derive(Debug, Clone, Deserialize)]
pub struct ReserveStockResponse {
    pub order_id: Uuid,
    pub reservation_ids: Vec<Uuid>,
    pub line_items_reserved: i32,
    pub total_quantity_reserved: i64,
}

/// Response for `DELETE /reservations/{order_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseStockResponse {
    pub order_id: Uuid,
    pub reservations_released: i32,
    pub quantity_restored: i64,
}

/// Typed failure modes of the Inventory service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InventoryError {
    #[error("product not found: {product_id}")]
    ProductNotFound { product_id: Uuid },

    #[error("insufficient stock for {product_sku}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        product_sku: String,
        requested: i32,
        available: i32,
    },

    #[error("invalid reservation request: {message}")]
    Validation { message: String },

    #[error("inventory service connection error: {message}")]
    Connection { message: String },

    #[error("inventory service error ({status}): {message}")]
    Internal { status: u16, message: String },
}

impl InventoryError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Internal { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    product_id: Option<Uuid>,
    #[serde(default)]
    product_sku: Option<String>,
    #[serde(default)]
    requested: Option<i32>,
    #[serde(default)]
    available: Option<i32>,
}

fn classify_error(status: StatusCode, body: &str) -> InventoryError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or(ErrorBody {
        error: None,
        message: None,
        product_id: None,
        product_sku: None,
        requested: None,
        available: None,
    });
    let message = parsed.message.clone().unwrap_or_else(|| body.to_string());

    match status {
        StatusCode::NOT_FOUND => InventoryError::ProductNotFound {
            product_id: parsed.product_id.unwrap_or_default(),
        },
        StatusCode::CONFLICT if parsed.error.as_deref() == Some("insufficient_stock") => {
            InventoryError::InsufficientStock {
                product_id: parsed.product_id.unwrap_or_default(),
                product_sku: parsed.product_sku.unwrap_or_default(),
                requested: parsed.requested.unwrap_or_default(),
                available: parsed.available.unwrap_or_default(),
            }
        }
        StatusCode::BAD_REQUEST => InventoryError::Validation { message },
        other => InventoryError::Internal {
            status: other.as_u16(),
            message,
        },
    }
}

/// Seam for inventory reservation operations.
#[async_trait]
pub trait InventoryApi: Send + Sync {
    async fn reserve(
        &self,
        request: &ReserveStockRequest,
    ) -> Result<ReserveStockResponse, InventoryError>;

    async fn release(&self, order_id: Uuid) -> Result<ReleaseStockResponse, InventoryError>;
}

/// HTTP implementation of [`InventoryApi`].
#[derive(Debug, Clone)]
pub struct HttpInventoryClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpInventoryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl InventoryApi for HttpInventoryClient {
    async fn reserve(
        &self,
        request: &ReserveStockRequest,
    ) -> Result<ReserveStockResponse, InventoryError> {
        let url = format!("{}/reservations", self.base_url);

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| InventoryError::Connection {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            response
                .json::<ReserveStockResponse>()
                .await
                .map_err(|e| InventoryError::Internal {
                    status: status.as_u16(),
                    message: format!("malformed response body: {e}"),
                })
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(classify_error(status, &body))
        }
    }

    async fn release(&self, order_id: Uuid) -> Result<ReleaseStockResponse, InventoryError> {
        let url = format!("{}/reservations/{order_id}", self.base_url);

        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|e| InventoryError::Connection {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            response
                .json::<ReleaseStockResponse>()
                .await
                .map_err(|e| InventoryError::Internal {
                    status: status.as_u16(),
                    message: format!("malformed response body: {e}"),
                })
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(classify_error(status, &body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_classification() {
        let product_id = Uuid::new_v4();
        let body = format!(
            r#"{{"error":"insufficient_stock","product_id":"{product_id}","product_sku":"SKU-1","requested":2,"available":1}}"#
        );

        match classify_error(StatusCode::CONFLICT, &body) {
            InventoryError::InsufficientStock {
                product_id: pid,
                product_sku,
                requested,
                available,
            } => {
                assert_eq!(pid, product_id);
                assert_eq!(product_sku, "SKU-1");
                assert_eq!(requested, 2);
                assert_eq!(available, 1);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }

    #[test]
    fn test_product_not_found_classification() {
        let product_id = Uuid::new_v4();
        let body = format!(r#"{{"error":"product_not_found","product_id":"{product_id}"}}"#);

        match classify_error(StatusCode::NOT_FOUND, &body) {
            InventoryError::ProductNotFound { product_id: pid } => assert_eq!(pid, product_id),
            other => panic!("expected ProductNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_retryability() {
        assert!(!InventoryError::InsufficientStock {
            product_id: Uuid::nil(),
            product_sku: String::new(),
            requested: 1,
            available: 0,
        }
        .is_retryable());
        assert!(InventoryError::Connection {
            message: String::new(),
        }
        .is_retryable());
        assert!(InventoryError::Internal {
            status: 500,
            message: String::new(),
        }
        .is_retryable());
        assert!(!InventoryError::Validation {
            message: String::new(),
        }
        .is_retryable());
    }
}
