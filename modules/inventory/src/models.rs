use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationStatus {
    Reserved,
    Released,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reserved => "RESERVED",
            Self::Released => "RELEASED",
        }
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RESERVED" => Ok(Self::Reserved),
            "RELEASED" => Ok(Self::Released),
            other => Err(format!("unknown reservation status: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub stock_quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable record of a stock mutation outside of reservations.
#[derive(Debug, Clone)]
pub struct StockAdjustment {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity_change: i32,
    pub previous_quantity: i32,
    pub new_quantity: i32,
    pub reason: String,
    pub idempotency_key: String,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Reservation {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Wire DTOs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub initial_stock: i32,
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub stock_quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub product_id: Uuid,
    pub sku: String,
    pub stock_quantity: i32,
    pub reserved_quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddStockRequest {
    pub idempotency_key: String,
    pub quantity_change: i32,
    pub reason: String,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StockAdjustmentResponse {
    pub adjustment_id: Uuid,
    pub product_id: Uuid,
    pub quantity_change: i32,
    pub previous_quantity: i32,
    pub new_quantity: i32,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl From<StockAdjustment> for StockAdjustmentResponse {
    fn from(adjustment: StockAdjustment) -> Self {
        Self {
            adjustment_id: adjustment.id,
            product_id: adjustment.product_id,
            quantity_change: adjustment.quantity_change,
            previous_quantity: adjustment.previous_quantity,
            new_quantity: adjustment.new_quantity,
            reason: adjustment.reason,
            created_at: adjustment.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReserveLineItem {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReserveStockRequest {
    pub order_id: Uuid,
    pub items: Vec<ReserveLineItem>,
}

#[derive(Debug, Serialize)]
pub struct ReserveStockResponse {
    pub order_id: Uuid,
    pub reservation_ids: Vec<Uuid>,
    pub line_items_reserved: i32,
    pub total_quantity_reserved: i64,
}

#[derive(Debug, Serialize)]
pub struct ReleaseStockResponse {
    pub order_id: Uuid,
    pub reservations_released: i32,
    pub quantity_restored: i64,
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
