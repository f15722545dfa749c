//! In-memory doubles for the saga seams, mirroring the conditional-update
//! semantics of the real stores so resume and race behaviour can be
//! exercised without a database.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use ledger_store::{
    LedgerStatus, OrderAuthorizedPayload, OrderLedger, OrderLedgerItem, OutboxEvent, OutboxStatus,
};
use platform_client_inventory::{
    InventoryApi, InventoryError, ReleaseStockResponse, ReserveStockRequest, ReserveStockResponse,
};
use platform_client_orders::{CreateOrderRequest, OrderResponse, OrdersApi, OrdersError};
use platform_client_payments::{
    AuthorizationResponse, AuthorizeRequest, PaymentsApi, PaymentsError,
};

use crate::store::LedgerStore;

// ============================================================================
// Ledger
// ============================================================================

#[derive(Default)]
pub struct InMemoryLedger {
    rows: Mutex<HashMap<Uuid, OrderLedger>>,
    items: Mutex<HashMap<Uuid, Vec<OrderLedgerItem>>>,
    pub retries: Mutex<Vec<(Uuid, DateTime<Utc>)>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ledger: OrderLedger, items: Vec<OrderLedgerItem>) {
        self.items.lock().unwrap().insert(ledger.id, items);
        self.rows.lock().unwrap().insert(ledger.id, ledger);
    }

    pub fn status_of(&self, id: Uuid) -> LedgerStatus {
        self.rows.lock().unwrap().get(&id).expect("ledger row").status
    }

    pub fn order_id_of(&self, id: Uuid) -> Option<Uuid> {
        self.rows.lock().unwrap().get(&id).expect("ledger row").order_id
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn find(&self, id: Uuid) -> Result<Option<OrderLedger>, sqlx::Error> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn fetch_items(&self, id: Uuid) -> Result<Vec<OrderLedgerItem>, sqlx::Error> {
        Ok(self.items.lock().unwrap().get(&id).cloned().unwrap_or_default())
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: LedgerStatus,
        to: LedgerStatus,
    ) -> Result<bool, sqlx::Error> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(row) if row.status == expected => {
                row.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_order_created(&self, id: Uuid, order_id: Uuid) -> Result<bool, sqlx::Error> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(row) if row.status == LedgerStatus::Authorized => {
                row.status = LedgerStatus::OrderCreated;
                row.order_id = Some(order_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_compensating(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(row)
                if matches!(
                    row.status,
                    LedgerStatus::Authorized
                        | LedgerStatus::OrderCreated
                        | LedgerStatus::InventoryReserved
                        | LedgerStatus::PaymentCaptured
                ) =>
            {
                row.status = LedgerStatus::Compensating;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_retry(
        &self,
        id: Uuid,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(&id) {
            row.retry_count += 1;
            row.next_retry_at = Some(next_retry_at);
        }
        self.retries.lock().unwrap().push((id, next_retry_at));
        Ok(())
    }
}

// ============================================================================
// Service doubles
// ============================================================================

/// Scripted orders service: queued results are consumed first, then every
/// call succeeds. `()` results stand for success; the response is derived.
#[derive(Default)]
pub struct FakeOrders {
    pub assigned_order_id: Option<Uuid>,
    pub create_results: Mutex<VecDeque<Result<(), OrdersError>>>,
    pub confirm_results: Mutex<VecDeque<Result<(), OrdersError>>>,
    pub cancel_results: Mutex<VecDeque<Result<(), OrdersError>>>,
    pub create_calls: AtomicUsize,
    pub confirm_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
}

impl FakeOrders {
    pub fn new() -> Self {
        Self {
            assigned_order_id: Some(Uuid::new_v4()),
            ..Self::default()
        }
    }

    pub fn with_create_failures(failures: Vec<OrdersError>) -> Self {
        let fake = Self::new();
        *fake.create_results.lock().unwrap() = failures.into_iter().map(Err).collect();
        fake
    }

    fn order_response(&self, order_ledger_id: Uuid, status: &str) -> OrderResponse {
        OrderResponse {
            order_id: self.assigned_order_id.unwrap_or_else(Uuid::new_v4),
            order_ledger_id,
            status: status.to_string(),
            total_amount_cents: 0,
            currency: "USD".to_string(),
        }
    }
}

#[async_trait]
impl OrdersApi for FakeOrders {
    async fn create(&self, request: &CreateOrderRequest) -> Result<OrderResponse, OrdersError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.create_results.lock().unwrap().pop_front() {
            scripted?;
        }
        Ok(self.order_response(request.order_ledger_id, "CREATED"))
    }

    async fn confirm(&self, _order_id: Uuid) -> Result<OrderResponse, OrdersError> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.confirm_results.lock().unwrap().pop_front() {
            scripted?;
        }
        Ok(self.order_response(Uuid::nil(), "CONFIRMED"))
    }

    async fn cancel(&self, _order_id: Uuid) -> Result<OrderResponse, OrdersError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.cancel_results.lock().unwrap().pop_front() {
            scripted?;
        }
        Ok(self.order_response(Uuid::nil(), "CANCELLED"))
    }
}

#[derive(Default)]
pub struct FakeInventory {
    pub reserve_results: Mutex<VecDeque<Result<(), InventoryError>>>,
    pub reserve_calls: AtomicUsize,
    pub release_calls: AtomicUsize,
    pub release_results: Mutex<VecDeque<Result<(), InventoryError>>>,
}

impl FakeInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reserve_failures(failures: Vec<InventoryError>) -> Self {
        let fake = Self::new();
        *fake.reserve_results.lock().unwrap() = failures.into_iter().map(Err).collect();
        fake
    }
}

#[async_trait]
impl InventoryApi for FakeInventory {
    async fn reserve(
        &self,
        request: &ReserveStockRequest,
    ) -> Result<ReserveStockResponse, InventoryError> {
        self.reserve_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.reserve_results.lock().unwrap().pop_front() {
            scripted?;
        }
        Ok(ReserveStockResponse {
            order_id: request.order_id,
            reservation_ids: request.items.iter().map(|_| Uuid::new_v4()).collect(),
            line_items_reserved: request.items.len() as i32,
            total_quantity_reserved: request.items.iter().map(|i| i64::from(i.quantity)).sum(),
        })
    }

    async fn release(&self, order_id: Uuid) -> Result<ReleaseStockResponse, InventoryError> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.release_results.lock().unwrap().pop_front() {
            scripted?;
        }
        Ok(ReleaseStockResponse {
            order_id,
            reservations_released: 1,
            quantity_restored: 1,
        })
    }
}

#[derive(Default)]
pub struct FakePayments {
    pub capture_results: Mutex<VecDeque<Result<(), PaymentsError>>>,
    pub void_results: Mutex<VecDeque<Result<(), PaymentsError>>>,
    pub capture_calls: AtomicUsize,
    pub void_calls: AtomicUsize,
}

impl FakePayments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capture_failures(failures: Vec<PaymentsError>) -> Self {
        let fake = Self::new();
        *fake.capture_results.lock().unwrap() = failures.into_iter().map(Err).collect();
        fake
    }

    pub fn with_void_failures(failures: Vec<PaymentsError>) -> Self {
        let fake = Self::new();
        *fake.void_results.lock().unwrap() = failures.into_iter().map(Err).collect();
        fake
    }

    fn response(&self, authorization_id: &str, status: &str) -> AuthorizationResponse {
        AuthorizationResponse {
            authorization_id: authorization_id.to_string(),
            status: status.to_string(),
            amount_cents: 0,
            currency: "USD".to_string(),
        }
    }
}

#[async_trait]
impl PaymentsApi for FakePayments {
    async fn authorize(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<AuthorizationResponse, PaymentsError> {
        Ok(self.response(&format!("auth_{}", request.idempotency_key), "AUTHORIZED"))
    }

    async fn capture(
        &self,
        authorization_id: &str,
        _idempotency_key: &str,
    ) -> Result<AuthorizationResponse, PaymentsError> {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.capture_results.lock().unwrap().pop_front() {
            scripted?;
        }
        Ok(self.response(authorization_id, "CAPTURED"))
    }

    async fn void(
        &self,
        authorization_id: &str,
        _idempotency_key: &str,
    ) -> Result<AuthorizationResponse, PaymentsError> {
        self.void_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.void_results.lock().unwrap().pop_front() {
            scripted?;
        }
        Ok(self.response(authorization_id, "VOIDED"))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn ledger_fixture(status: LedgerStatus) -> (OrderLedger, Vec<OrderLedgerItem>) {
    let ledger_id = Uuid::new_v4();
    let ledger = OrderLedger {
        id: ledger_id,
        client_request_id: format!("k-{ledger_id}"),
        user_id: Uuid::new_v4(),
        email: "c@x.com".to_string(),
        status,
        total_amount_cents: 2000,
        currency: "USD".to_string(),
        payment_authorization_id: Some("auth_test".to_string()),
        order_id: None,
        retry_count: 0,
        next_retry_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    let items = vec![OrderLedgerItem {
        id: Uuid::new_v4(),
        order_ledger_id: ledger_id,
        product_id: Uuid::new_v4(),
        quantity: 2,
        unit_price_cents: 1000,
    }];

    (ledger, items)
}

pub fn event_for(ledger: &OrderLedger, retry_count: i32) -> OutboxEvent {
    let payload = OrderAuthorizedPayload {
        order_ledger_id: ledger.id,
        user_id: ledger.user_id,
        email: ledger.email.clone(),
        total_amount_cents: ledger.total_amount_cents,
        currency: ledger.currency.clone(),
        payment_authorization_id: ledger
            .payment_authorization_id
            .clone()
            .unwrap_or_default(),
    };

    OutboxEvent {
        id: Uuid::new_v4(),
        aggregate_type: "order_ledger".to_string(),
        aggregate_id: ledger.id.to_string(),
        event_type: "OrderAuthorized".to_string(),
        payload: serde_json::to_value(&payload).expect("payload serializes"),
        status: OutboxStatus::Pending,
        retry_count,
        next_retry_at: None,
        created_at: Utc::now(),
        processed_at: None,
    }
}
