//! Typed client for the Orders service.
//!
//! [`OrdersApi`] is the seam the orchestrator programs against for the
//! create/confirm/cancel saga steps. Create is idempotent on
//! `order_ledger_id` server-side, and confirm/cancel are idempotent on
//! their target status, so a redelivered saga step is always safe.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// One line of an order create request.
#[derive(Debug, Clone, Serialize)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

/// Request body for `POST /orders`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    pub order_ledger_id: Uuid,
    pub user_id: Uuid,
    pub total_amount_cents: i64,
    pub currency: String,
    pub items: Vec<OrderItemRequest>,
}

/// An order as reported by the Orders service.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    pub order_id: Uuid,
    pub order_ledger_id: Uuid,
    pub status: String,
    pub total_amount_cents: i64,
    pub currency: String,
}

/// Typed failure modes of the Orders service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OrdersError {
    #[error("invalid order status: {message}")]
    InvalidOrderStatus { message: String },

    #[error("order not found")]
    OrderNotFound,

    #[error("invalid order request: {message}")]
    Validation { message: String },

    #[error("orders service connection error: {message}")]
    Connection { message: String },

    #[error("orders service error ({status}): {message}")]
    Internal { status: u16, message: String },
}

impl OrdersError {
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
}

fn classify_error(status: StatusCode, body: &str) -> OrdersError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or(ErrorBody {
        error: None,
        message: None,
    });
    let message = parsed.message.unwrap_or_else(|| body.to_string());

    match status {
        StatusCode::NOT_FOUND => OrdersError::OrderNotFound,
        StatusCode::CONFLICT if parsed.error.as_deref() == Some("invalid_order_status") => {
            OrdersError::InvalidOrderStatus { message }
        }
        StatusCode::BAD_REQUEST => OrdersError::Validation { message },
        other => OrdersError::Internal {
            status: other.as_u16(),
            message,
        },
    }
}

/// Seam for order lifecycle operations.
#[async_trait]
pub trait OrdersApi: Send + Sync {
    async fn create(&self, request: &CreateOrderRequest) -> Result<OrderResponse, OrdersError>;

    async fn confirm(&self, order_id: Uuid) -> Result<OrderResponse, OrdersError>;

    async fn cancel(&self, order_id: Uuid) -> Result<OrderResponse, OrdersError>;
}

/// HTTP implementation of [`OrdersApi`].
#[derive(Debug, Clone)]
pub struct HttpOrdersClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpOrdersClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn post_expect_order<B: Serialize>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<OrderResponse, OrdersError> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.http.post(&url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| OrdersError::Connection {
            message: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            response
                .json::<OrderResponse>()
                .await
                .map_err(|e| OrdersError::Internal {
                    status: status.as_u16(),
                    message: format!("malformed response body: {e}"),
                })
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(classify_error(status, &body))
        }
    }
}

#[async_trait]
impl OrdersApi for HttpOrdersClient {
    async fn create(&self, request: &CreateOrderRequest) -> Result<OrderResponse, OrdersError> {
        self.post_expect_order("/orders", Some(request)).await
    }

    async fn confirm(&self, order_id: Uuid) -> Result<OrderResponse, OrdersError> {
        self.post_expect_order::<()>(&format!("/orders/{order_id}/confirmation"), None)
            .await
    }

    async fn cancel(&self, order_id: Uuid) -> Result<OrderResponse, OrdersError> {
        self.post_expect_order::<()>(&format!("/orders/{order_id}/cancellation"), None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_status_classification() {
        let err = classify_error(
            StatusCode::CONFLICT,
            r#"{"error":"invalid_order_status","message":"cannot cancel a CONFIRMED order"}"#,
        );

        match err {
            OrdersError::InvalidOrderStatus { message } => {
                assert!(message.contains("CONFIRMED"));
            }
            other => panic!("expected InvalidOrderStatus, got {other:?}"),
        }
    }

    #[test]
    fn test_retryability() {
        assert!(!OrdersError::InvalidOrderStatus {
            message: String::new(),
        }
        .is_retryable());
        assert!(!OrdersError::OrderNotFound.is_retryable());
        assert!(OrdersError::Connection {
            message: String::new(),
        }
        .is_retryable());
        assert!(OrdersError::Internal {
            status: 503,
            message: String::new(),
        }
        .is_retryable());
    }

    #[test]
    fn test_internal_5xx_from_unclassified_status() {
        let err = classify_error(StatusCode::BAD_GATEWAY, "upstream down");
        match err {
            OrdersError::Internal { status, .. } => assert_eq!(status, 502),
            other => panic!("expected Internal, got {other:?}"),
        }
    }
}
