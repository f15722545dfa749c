use chrono::{DateTime, Utc};
use ledger_store::{OrderLedger, OrderLedgerItem};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentDetails {
    pub method: String,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: Uuid,
    pub email: String,
    pub items: Vec<OrderItemRequest>,
    pub payment: PaymentDetails,
    #[serde(default = "default_currency")]
    pub currency: String,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderAccepted {
    pub order_ledger_id: Uuid,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct DuplicateRequestResponse {
    pub error: String,
    pub order_ledger_id: Uuid,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct LedgerItemResponse {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    pub order_ledger_id: Uuid,
    pub client_request_id: String,
    pub status: String,
    pub user_id: Uuid,
    pub email: String,
    pub total_amount_cents: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_authorization_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<LedgerItemResponse>,
}

impl LedgerResponse {
    pub fn from_parts(ledger: OrderLedger, items: Vec<OrderLedgerItem>) -> Self {
        Self {
            order_ledger_id: ledger.id,
            client_request_id: ledger.client_request_id,
            status: ledger.status.as_str().to_string(),
            user_id: ledger.user_id,
            email: ledger.email,
            total_amount_cents: ledger.total_amount_cents,
            currency: ledger.currency,
            payment_authorization_id: ledger.payment_authorization_id,
            created_at: ledger.created_at,
            updated_at: ledger.updated_at,
            items: items
                .into_iter()
                .map(|item| LedgerItemResponse {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price_cents,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
