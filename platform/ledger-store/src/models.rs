use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an order ledger row.
///
/// Stored as TEXT; the saga only ever moves a row forward along this graph,
/// using conditional updates predicated on the expected prior status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerStatus {
    AwaitingAuthorization,
    Authorized,
    AuthorizationFailed,
    OrderCreated,
    InventoryReserved,
    PaymentCaptured,
    Completed,
    Compensating,
    Failed,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown ledger status: {0}")]
pub struct StatusParseError(pub String);

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingAuthorization => "AWAITING_AUTHORIZATION",
            Self::Authorized => "AUTHORIZED",
            Self::AuthorizationFailed => "AUTHORIZATION_FAILED",
            Self::OrderCreated => "ORDER_CREATED",
            Self::InventoryReserved => "INVENTORY_RESERVED",
            Self::PaymentCaptured => "PAYMENT_CAPTURED",
            Self::Completed => "COMPLETED",
            Self::Compensating => "COMPENSATING",
            Self::Failed => "FAILED",
        }
    }

    /// COMPLETED and FAILED rows never move again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a direct edge `self -> to` exists in the status graph.
    ///
    /// Forward motion is strictly sequential; any in-flight forward state
    /// may divert to COMPENSATING, which only resolves to FAILED.
    pub fn can_transition(&self, to: LedgerStatus) -> bool {
        use LedgerStatus::*;
        matches!(
            (self, to),
            (AwaitingAuthorization, Authorized)
                | (AwaitingAuthorization, AuthorizationFailed)
                | (Authorized, OrderCreated)
                | (OrderCreated, InventoryReserved)
                | (InventoryReserved, PaymentCaptured)
                | (PaymentCaptured, Completed)
                | (Authorized, Compensating)
                | (OrderCreated, Compensating)
                | (InventoryReserved, Compensating)
                | (PaymentCaptured, Compensating)
                | (Compensating, Failed)
        )
    }
}

impl std::str::FromStr for LedgerStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AWAITING_AUTHORIZATION" => Ok(Self::AwaitingAuthorization),
            "AUTHORIZED" => Ok(Self::Authorized),
            "AUTHORIZATION_FAILED" => Ok(Self::AuthorizationFailed),
            "ORDER_CREATED" => Ok(Self::OrderCreated),
            "INVENTORY_RESERVED" => Ok(Self::InventoryReserved),
            "PAYMENT_CAPTURED" => Ok(Self::PaymentCaptured),
            "COMPLETED" => Ok(Self::Completed),
            "COMPENSATING" => Ok(Self::Compensating),
            "FAILED" => Ok(Self::Failed),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

impl std::fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a transactional outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Processed,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processed => "PROCESSED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for OutboxStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSED" => Ok(Self::Processed),
            "FAILED" => Ok(Self::Failed),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

/// Authoritative record of a customer-initiated order attempt (edge-owned).
#[derive(Debug, Clone)]
pub struct OrderLedger {
    pub id: Uuid,
    pub client_request_id: String,
    pub user_id: Uuid,
    pub email: String,
    pub status: LedgerStatus,
    pub total_amount_cents: i64,
    pub currency: String,
    pub payment_authorization_id: Option<String>,
    pub order_id: Option<Uuid>,
    pub retry_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Line item recorded with the ledger in the same transaction.
#[derive(Debug, Clone)]
pub struct OrderLedgerItem {
    pub id: Uuid,
    pub order_ledger_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

/// Insert shape for ledger line items.
#[derive(Debug, Clone)]
pub struct LedgerItemInsert {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

/// A row of the transactional outbox.
#[derive(Debug, Clone)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub retry_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Payload of the `OrderAuthorized` outbox event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAuthorizedPayload {
    pub order_ledger_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub total_amount_cents: i64,
    pub currency: String,
    pub payment_authorization_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_round_trip() {
        for status in [
            LedgerStatus::AwaitingAuthorization,
            LedgerStatus::Authorized,
            LedgerStatus::AuthorizationFailed,
            LedgerStatus::OrderCreated,
            LedgerStatus::InventoryReserved,
            LedgerStatus::PaymentCaptured,
            LedgerStatus::Completed,
            LedgerStatus::Compensating,
            LedgerStatus::Failed,
        ] {
            assert_eq!(LedgerStatus::from_str(status.as_str()).unwrap(), status);
        }

        assert!(LedgerStatus::from_str("BOGUS").is_err());
    }

    #[test]
    fn test_forward_edges() {
        use LedgerStatus::*;

        assert!(Authorized.can_transition(OrderCreated));
        assert!(OrderCreated.can_transition(InventoryReserved));
        assert!(InventoryReserved.can_transition(PaymentCaptured));
        assert!(PaymentCaptured.can_transition(Completed));

        // No skipping steps
        assert!(!Authorized.can_transition(InventoryReserved));
        assert!(!Authorized.can_transition(PaymentCaptured));
        assert!(!OrderCreated.can_transition(Completed));
    }

    #[test]
    fn test_compensation_edges() {
        use LedgerStatus::*;

        for from in [Authorized, OrderCreated, InventoryReserved, PaymentCaptured] {
            assert!(from.can_transition(Compensating));
        }
        assert!(Compensating.can_transition(Failed));
        assert!(!Compensating.can_transition(Completed));
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_edges() {
        use LedgerStatus::*;

        let all = [
            AwaitingAuthorization,
            Authorized,
            AuthorizationFailed,
            OrderCreated,
            InventoryReserved,
            PaymentCaptured,
            Completed,
            Compensating,
            Failed,
        ];

        for terminal in [Completed, Failed, AuthorizationFailed] {
            for to in all {
                assert!(
                    !terminal.can_transition(to),
                    "{terminal} must not transition to {to}"
                );
            }
        }
    }

    #[test]
    fn test_order_authorized_payload_wire_shape() {
        let payload = OrderAuthorizedPayload {
            order_ledger_id: Uuid::nil(),
            user_id: Uuid::nil(),
            email: "c@x.com".to_string(),
            total_amount_cents: 2000,
            currency: "USD".to_string(),
            payment_authorization_id: "auth_123".to_string(),
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("order_ledger_id").is_some());
        assert!(json.get("payment_authorization_id").is_some());
        assert_eq!(json["total_amount_cents"], 2000);
    }
}
