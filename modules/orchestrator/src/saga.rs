//! Saga executor: drives one `OrderAuthorized` event through
//! Create Order -> Reserve Inventory -> Capture Payment -> Confirm Order.
//!
//! The ledger's committed status is the resume point, so redelivering an
//! event is always safe: finished steps are skipped, and every downstream
//! call is idempotent (order creation collapses on `order_ledger_id`,
//! reservations on `order_id`, capture on its derived idempotency key).
//! Remote "already done" answers count as step success.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use ledger_store::{LedgerStatus, OrderAuthorizedPayload, OrderLedger, OutboxEvent};
use platform_client_inventory::{InventoryApi, ReserveLineItem, ReserveStockRequest};
use platform_client_orders::{CreateOrderRequest, OrderItemRequest, OrdersApi, OrdersError};
use platform_client_payments::{PaymentsApi, PaymentsError};

use crate::retry::{RetryDecision, RetryPolicy};
use crate::store::LedgerStore;

/// Everything compensation needs to undo the completed steps in reverse.
#[derive(Debug, Clone)]
pub struct CompensationContext {
    pub order_ledger_id: Uuid,
    pub order_id: Option<Uuid>,
    pub payment_authorization_id: Option<String>,
    pub last_successful_status: LedgerStatus,
}

/// Outcome of one saga run for one outbox event.
#[derive(Debug)]
pub enum SagaResult {
    /// Terminal success: ledger is COMPLETED.
    Completed { order_ledger_id: Uuid },
    /// Terminal failure with nothing to undo (diagnostic failures, events
    /// for ledgers already FAILED/COMPENSATING). The event is spent.
    Failed {
        order_ledger_id: Option<Uuid>,
        reason: String,
    },
    /// Transient step failure within the retry budget.
    RequiresRetry {
        order_ledger_id: Uuid,
        delay: Duration,
        error: String,
    },
    /// Permanent step failure: run compensation, then spend the event.
    RequiresCompensation {
        context: CompensationContext,
        error: String,
    },
}

pub struct SagaExecutor {
    ledger: Arc<dyn LedgerStore>,
    orders: Arc<dyn OrdersApi>,
    inventory: Arc<dyn InventoryApi>,
    payments: Arc<dyn PaymentsApi>,
    policy: RetryPolicy,
}

struct StepFailure {
    retryable: bool,
    error: String,
}

impl SagaExecutor {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        orders: Arc<dyn OrdersApi>,
        inventory: Arc<dyn InventoryApi>,
        payments: Arc<dyn PaymentsApi>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            orders,
            inventory,
            payments,
            policy,
        }
    }

    pub async fn execute(&self, event: &OutboxEvent) -> SagaResult {
        let payload: OrderAuthorizedPayload = match serde_json::from_value(event.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                return SagaResult::Failed {
                    order_ledger_id: None,
                    reason: format!("unparseable OrderAuthorized payload: {e}"),
                }
            }
        };
        let ledger_id = payload.order_ledger_id;

        loop {
            let ledger = match self.ledger.find(ledger_id).await {
                Ok(Some(ledger)) => ledger,
                Ok(None) => {
                    return SagaResult::Failed {
                        order_ledger_id: Some(ledger_id),
                        reason: "ledger row missing".to_string(),
                    }
                }
                Err(e) => return self.database_trouble(ledger_id, event, e),
            };

            match ledger.status {
                LedgerStatus::Completed => {
                    return SagaResult::Completed {
                        order_ledger_id: ledger_id,
                    }
                }
                LedgerStatus::Failed | LedgerStatus::Compensating => {
                    return SagaResult::Failed {
                        order_ledger_id: Some(ledger_id),
                        reason: format!("ledger is {}, not re-entering", ledger.status),
                    }
                }
                LedgerStatus::AwaitingAuthorization | LedgerStatus::AuthorizationFailed => {
                    return SagaResult::Failed {
                        order_ledger_id: Some(ledger_id),
                        reason: format!("event delivered for a {} ledger", ledger.status),
                    }
                }
                LedgerStatus::Authorized => {
                    if let Err(failure) = self.step_create_order(&payload, &ledger).await {
                        return self.step_failed(event, &ledger, "create_order", failure);
                    }
                }
                LedgerStatus::OrderCreated => {
                    if let Err(failure) = self.step_reserve_inventory(&ledger).await {
                        return self.step_failed(event, &ledger, "reserve_inventory", failure);
                    }
                }
                LedgerStatus::InventoryReserved => {
                    if let Err(failure) = self.step_capture_payment(&ledger).await {
                        return self.step_failed(event, &ledger, "capture_payment", failure);
                    }
                }
                LedgerStatus::PaymentCaptured => {
                    if let Err(failure) = self.step_confirm_order(&ledger).await {
                        return self.step_failed(event, &ledger, "confirm_order", failure);
                    }
                }
            }
            // Loop re-reads the committed status and resumes from there.
        }
    }

    async fn step_create_order(
        &self,
        payload: &OrderAuthorizedPayload,
        ledger: &OrderLedger,
    ) -> Result<(), StepFailure> {
        let items = self
            .ledger
            .fetch_items(ledger.id)
            .await
            .map_err(|e| StepFailure {
                retryable: true,
                error: format!("fetching ledger items: {e}"),
            })?;

        let order = self
            .orders
            .create(&CreateOrderRequest {
                order_ledger_id: ledger.id,
                user_id: payload.user_id,
                total_amount_cents: ledger.total_amount_cents,
                currency: ledger.currency.clone(),
                items: items
                    .iter()
                    .map(|item| OrderItemRequest {
                        product_id: item.product_id,
                        quantity: item.quantity,
                        unit_price_cents: item.unit_price_cents,
                    })
                    .collect(),
            })
            .await
            .map_err(|e| StepFailure {
                retryable: e.is_retryable(),
                error: format!("create order: {e}"),
            })?;

        tracing::info!(
            order_ledger_id = %ledger.id,
            order_id = %order.order_id,
            "Saga step: order created"
        );

        self.ledger
            .record_order_created(ledger.id, order.order_id)
            .await
            .map_err(|e| StepFailure {
                retryable: true,
                error: format!("recording order id: {e}"),
            })?;

        Ok(())
    }

    async fn step_reserve_inventory(&self, ledger: &OrderLedger) -> Result<(), StepFailure> {
        let order_id = ledger.order_id.ok_or_else(|| StepFailure {
            // ORDER_CREATED without an order id breaks invariant L3's
            // sibling; nothing downstream can fix it.
            retryable: false,
            error: "ledger is ORDER_CREATED but order_id is missing".to_string(),
        })?;

        let items = self
            .ledger
            .fetch_items(ledger.id)
            .await
            .map_err(|e| StepFailure {
                retryable: true,
                error: format!("fetching ledger items: {e}"),
            })?;

        let reserved = self
            .inventory
            .reserve(&ReserveStockRequest {
                order_id,
                items: items
                    .iter()
                    .map(|item| ReserveLineItem {
                        product_id: item.product_id,
                        quantity: item.quantity,
                    })
                    .collect(),
            })
            .await
            .map_err(|e| StepFailure {
                retryable: e.is_retryable(),
                error: format!("reserve inventory: {e}"),
            })?;

        tracing::info!(
            order_ledger_id = %ledger.id,
            order_id = %order_id,
            reservations = reserved.reservation_ids.len(),
            "Saga step: inventory reserved"
        );

        self.ledger
            .transition(
                ledger.id,
                LedgerStatus::OrderCreated,
                LedgerStatus::InventoryReserved,
            )
            .await
            .map_err(|e| StepFailure {
                retryable: true,
                error: format!("recording reservation: {e}"),
            })?;

        Ok(())
    }

    async fn step_capture_payment(&self, ledger: &OrderLedger) -> Result<(), StepFailure> {
        let authorization_id =
            ledger
                .payment_authorization_id
                .as_deref()
                .ok_or_else(|| StepFailure {
                    retryable: false,
                    error: "ledger has no payment_authorization_id".to_string(),
                })?;

        let capture_key = format!("capture-{}", ledger.id);
        match self.payments.capture(authorization_id, &capture_key).await {
            Ok(_) => {}
            // A previous delivery already captured under a different key
            // window; the money is where the saga wants it.
            Err(PaymentsError::AlreadyCaptured) => {
                tracing::info!(
                    order_ledger_id = %ledger.id,
                    "Saga step: capture already done"
                );
            }
            Err(e) => {
                return Err(StepFailure {
                    retryable: e.is_retryable(),
                    error: format!("capture payment: {e}"),
                })
            }
        }

        tracing::info!(
            order_ledger_id = %ledger.id,
            payment_authorization_id = %authorization_id,
            "Saga step: payment captured"
        );

        self.ledger
            .transition(
                ledger.id,
                LedgerStatus::InventoryReserved,
                LedgerStatus::PaymentCaptured,
            )
            .await
            .map_err(|e| StepFailure {
                retryable: true,
                error: format!("recording capture: {e}"),
            })?;

        Ok(())
    }

    async fn step_confirm_order(&self, ledger: &OrderLedger) -> Result<(), StepFailure> {
        let order_id = ledger.order_id.ok_or_else(|| StepFailure {
            retryable: false,
            error: "ledger is PAYMENT_CAPTURED but order_id is missing".to_string(),
        })?;

        match self.orders.confirm(order_id).await {
            Ok(_) => {}
            Err(OrdersError::InvalidOrderStatus { message }) => {
                return Err(StepFailure {
                    retryable: false,
                    error: format!("confirm order: {message}"),
                })
            }
            Err(e) => {
                return Err(StepFailure {
                    retryable: e.is_retryable(),
                    error: format!("confirm order: {e}"),
                })
            }
        }

        tracing::info!(
            order_ledger_id = %ledger.id,
            order_id = %order_id,
            "Saga step: order confirmed"
        );

        self.ledger
            .transition(
                ledger.id,
                LedgerStatus::PaymentCaptured,
                LedgerStatus::Completed,
            )
            .await
            .map_err(|e| StepFailure {
                retryable: true,
                error: format!("recording completion: {e}"),
            })?;

        Ok(())
    }

    /// Route a failed step through the retry policy.
    fn step_failed(
        &self,
        event: &OutboxEvent,
        ledger: &OrderLedger,
        step: &'static str,
        failure: StepFailure,
    ) -> SagaResult {
        tracing::warn!(
            order_ledger_id = %ledger.id,
            step,
            retryable = failure.retryable,
            retry_count = event.retry_count,
            error = %failure.error,
            "Saga step failed"
        );

        match self.policy.decide(failure.retryable, event.retry_count) {
            RetryDecision::Retry { delay } => SagaResult::RequiresRetry {
                order_ledger_id: ledger.id,
                delay,
                error: failure.error,
            },
            RetryDecision::Compensate => SagaResult::RequiresCompensation {
                context: CompensationContext {
                    order_ledger_id: ledger.id,
                    order_id: ledger.order_id,
                    payment_authorization_id: ledger.payment_authorization_id.clone(),
                    last_successful_status: ledger.status,
                },
                error: failure.error,
            },
        }
    }

    /// Ledger reads failing means the edge database is unwell; retry on the
    /// backoff schedule without burning the compensation path (which needs
    /// the same database).
    fn database_trouble(
        &self,
        order_ledger_id: Uuid,
        event: &OutboxEvent,
        e: sqlx::Error,
    ) -> SagaResult {
        let attempt = event.retry_count.saturating_add(1).max(1) as u32;
        SagaResult::RequiresRetry {
            order_ledger_id,
            delay: self.policy.delay_for_attempt(attempt),
            error: format!("ledger read: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::testkit::{
        event_for, ledger_fixture, FakeInventory, FakeOrders, FakePayments, InMemoryLedger,
    };
    use platform_client_inventory::InventoryError;
    use platform_client_orders::OrdersError;
    use std::sync::atomic::Ordering;

    struct Harness {
        ledger: Arc<InMemoryLedger>,
        orders: Arc<FakeOrders>,
        inventory: Arc<FakeInventory>,
        payments: Arc<FakePayments>,
        executor: SagaExecutor,
    }

    fn harness(orders: FakeOrders, inventory: FakeInventory, payments: FakePayments) -> Harness {
        let ledger = Arc::new(InMemoryLedger::new());
        let orders = Arc::new(orders);
        let inventory = Arc::new(inventory);
        let payments = Arc::new(payments);
        let executor = SagaExecutor::new(
            ledger.clone(),
            orders.clone(),
            inventory.clone(),
            payments.clone(),
            RetryPolicy::new(5, Duration::from_millis(1000), 2.0),
        );

        Harness {
            ledger,
            orders,
            inventory,
            payments,
            executor,
        }
    }

    fn default_harness() -> Harness {
        harness(FakeOrders::new(), FakeInventory::new(), FakePayments::new())
    }

    #[tokio::test]
    async fn test_happy_path_runs_all_four_steps_once() {
        let h = default_harness();
        let (ledger, items) = ledger_fixture(LedgerStatus::Authorized);
        let event = event_for(&ledger, 0);
        h.ledger.insert(ledger.clone(), items);

        let result = h.executor.execute(&event).await;

        assert!(matches!(result, SagaResult::Completed { .. }));
        assert_eq!(h.ledger.status_of(ledger.id), LedgerStatus::Completed);
        assert_eq!(h.orders.create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.inventory.reserve_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.payments.capture_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.orders.confirm_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.ledger.order_id_of(ledger.id), h.orders.assigned_order_id);
    }

    #[tokio::test]
    async fn test_redelivery_resumes_from_committed_status() {
        let h = default_harness();
        let (mut ledger, items) = ledger_fixture(LedgerStatus::InventoryReserved);
        ledger.order_id = Some(Uuid::new_v4());
        let event = event_for(&ledger, 0);
        h.ledger.insert(ledger.clone(), items);

        let result = h.executor.execute(&event).await;

        assert!(matches!(result, SagaResult::Completed { .. }));
        // Finished steps are skipped on redelivery.
        assert_eq!(h.orders.create_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.inventory.reserve_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.payments.capture_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.orders.confirm_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_completed_ledger_is_answered_without_calls() {
        let h = default_harness();
        let (ledger, items) = ledger_fixture(LedgerStatus::Completed);
        let event = event_for(&ledger, 0);
        h.ledger.insert(ledger.clone(), items);

        let result = h.executor.execute(&event).await;

        assert!(matches!(result, SagaResult::Completed { .. }));
        assert_eq!(h.orders.create_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.orders.confirm_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_and_compensating_ledgers_are_not_reentered() {
        for status in [LedgerStatus::Failed, LedgerStatus::Compensating] {
            let h = default_harness();
            let (ledger, items) = ledger_fixture(status);
            let event = event_for(&ledger, 0);
            h.ledger.insert(ledger.clone(), items);

            let result = h.executor.execute(&event).await;

            assert!(matches!(result, SagaResult::Failed { .. }), "{status}");
            assert_eq!(h.orders.create_calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_transient_failure_schedules_retry_with_base_delay() {
        let h = harness(
            FakeOrders::with_create_failures(vec![OrdersError::Connection {
                message: "connection refused".to_string(),
            }]),
            FakeInventory::new(),
            FakePayments::new(),
        );
        let (ledger, items) = ledger_fixture(LedgerStatus::Authorized);
        let event = event_for(&ledger, 0);
        h.ledger.insert(ledger.clone(), items);

        let result = h.executor.execute(&event).await;

        match result {
            SagaResult::RequiresRetry {
                order_ledger_id,
                delay,
                ..
            } => {
                assert_eq!(order_ledger_id, ledger.id);
                assert_eq!(delay, Duration::from_millis(1000));
            }
            other => panic!("expected RequiresRetry, got {other:?}"),
        }
        // Pre-step state is preserved for the next delivery.
        assert_eq!(h.ledger.status_of(ledger.id), LedgerStatus::Authorized);
    }

    #[tokio::test]
    async fn test_insufficient_stock_escalates_to_compensation() {
        let h = harness(
            FakeOrders::new(),
            FakeInventory::with_reserve_failures(vec![InventoryError::InsufficientStock {
                product_id: Uuid::new_v4(),
                product_sku: "SKU-1".to_string(),
                requested: 2,
                available: 1,
            }]),
            FakePayments::new(),
        );
        let (ledger, items) = ledger_fixture(LedgerStatus::Authorized);
        let event = event_for(&ledger, 0);
        h.ledger.insert(ledger.clone(), items);

        let result = h.executor.execute(&event).await;

        match result {
            SagaResult::RequiresCompensation { context, .. } => {
                assert_eq!(context.order_ledger_id, ledger.id);
                assert_eq!(context.last_successful_status, LedgerStatus::OrderCreated);
                assert!(context.order_id.is_some(), "order was created before the failure");
                assert_eq!(
                    context.payment_authorization_id.as_deref(),
                    Some("auth_test")
                );
            }
            other => panic!("expected RequiresCompensation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion_escalates_to_compensation() {
        let h = harness(
            FakeOrders::with_create_failures(vec![OrdersError::Connection {
                message: "still down".to_string(),
            }]),
            FakeInventory::new(),
            FakePayments::new(),
        );
        let (ledger, items) = ledger_fixture(LedgerStatus::Authorized);
        // Four retries already scheduled; the fifth attempt is the last.
        let event = event_for(&ledger, 4);
        h.ledger.insert(ledger.clone(), items);

        let result = h.executor.execute(&event).await;

        match result {
            SagaResult::RequiresCompensation { context, .. } => {
                assert_eq!(context.last_successful_status, LedgerStatus::Authorized);
                assert!(context.order_id.is_none());
            }
            other => panic!("expected RequiresCompensation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_already_captured_counts_as_step_success() {
        let h = harness(
            FakeOrders::new(),
            FakeInventory::new(),
            FakePayments::with_capture_failures(vec![PaymentsError::AlreadyCaptured]),
        );
        let (mut ledger, items) = ledger_fixture(LedgerStatus::InventoryReserved);
        ledger.order_id = Some(Uuid::new_v4());
        let event = event_for(&ledger, 0);
        h.ledger.insert(ledger.clone(), items);

        let result = h.executor.execute(&event).await;

        assert!(matches!(result, SagaResult::Completed { .. }));
        assert_eq!(h.ledger.status_of(ledger.id), LedgerStatus::Completed);
    }

    #[tokio::test]
    async fn test_missing_ledger_row_spends_the_event() {
        let h = default_harness();
        let (ledger, _) = ledger_fixture(LedgerStatus::Authorized);
        let event = event_for(&ledger, 0);
        // Ledger row intentionally not inserted.

        let result = h.executor.execute(&event).await;

        match result {
            SagaResult::Failed { reason, .. } => assert!(reason.contains("missing")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparseable_payload_spends_the_event() {
        let h = default_harness();
        let (ledger, items) = ledger_fixture(LedgerStatus::Authorized);
        let mut event = event_for(&ledger, 0);
        event.payload = serde_json::json!({"unexpected": true});
        h.ledger.insert(ledger, items);

        let result = h.executor.execute(&event).await;

        match result {
            SagaResult::Failed { reason, .. } => assert!(reason.contains("payload")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }
}
