//! Compensation executor: best-effort undo in strict reverse order.
//!
//! Void payment (only while capture has not happened), release inventory,
//! cancel order. A failing step is recorded and the executor moves on; it
//! never stops on a partial failure. Afterwards the ledger is finalised to
//! FAILED regardless of how the steps went.

use std::sync::Arc;

use ledger_store::LedgerStatus;
use platform_client_inventory::InventoryApi;
use platform_client_orders::OrdersApi;
use platform_client_payments::{PaymentsApi, PaymentsError};

use crate::saga::CompensationContext;
use crate::store::LedgerStore;

#[derive(Debug)]
pub enum CompensationOutcome {
    Completed {
        steps_executed: Vec<&'static str>,
    },
    Failed {
        steps_executed: Vec<&'static str>,
        errors: Vec<String>,
    },
}

pub struct CompensationExecutor {
    ledger: Arc<dyn LedgerStore>,
    orders: Arc<dyn OrdersApi>,
    inventory: Arc<dyn InventoryApi>,
    payments: Arc<dyn PaymentsApi>,
}

impl CompensationExecutor {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        orders: Arc<dyn OrdersApi>,
        inventory: Arc<dyn InventoryApi>,
        payments: Arc<dyn PaymentsApi>,
    ) -> Self {
        Self {
            ledger,
            orders,
            inventory,
            payments,
        }
    }

    pub async fn run(
        &self,
        context: &CompensationContext,
    ) -> Result<CompensationOutcome, sqlx::Error> {
        let ledger_id = context.order_ledger_id;

        // Block forward motion before undoing anything. `false` means the
        // row already left the forward states, which is fine.
        self.ledger.mark_compensating(ledger_id).await?;

        tracing::warn!(
            order_ledger_id = %ledger_id,
            last_successful_status = context.last_successful_status.as_str(),
            "Starting compensation"
        );

        let mut steps_executed: Vec<&'static str> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        // 1. Void payment: only while capture has not happened.
        if matches!(
            context.last_successful_status,
            LedgerStatus::Authorized | LedgerStatus::OrderCreated | LedgerStatus::InventoryReserved
        ) {
            if let Some(authorization_id) = &context.payment_authorization_id {
                steps_executed.push("void_payment");
                let void_key = format!("void-{ledger_id}");
                match self.payments.void(authorization_id, &void_key).await {
                    Ok(_) => {
                        tracing::info!(
                            order_ledger_id = %ledger_id,
                            payment_authorization_id = %authorization_id,
                            "Compensation: payment voided"
                        );
                    }
                    // Someone already voided it; the goal state holds.
                    Err(PaymentsError::AlreadyVoided) => {}
                    Err(e) => errors.push(format!("void_payment: {e}")),
                }
            }
        }

        // 2. Release inventory: only if a reservation could exist.
        if matches!(
            context.last_successful_status,
            LedgerStatus::InventoryReserved | LedgerStatus::PaymentCaptured
        ) {
            if let Some(order_id) = context.order_id {
                steps_executed.push("release_inventory");
                match self.inventory.release(order_id).await {
                    Ok(released) => {
                        tracing::info!(
                            order_ledger_id = %ledger_id,
                            order_id = %order_id,
                            reservations_released = released.reservations_released,
                            "Compensation: inventory released"
                        );
                    }
                    Err(e) => errors.push(format!("release_inventory: {e}")),
                }
            }
        }

        // 3. Cancel order: whenever one was created.
        if let Some(order_id) = context.order_id {
            steps_executed.push("cancel_order");
            match self.orders.cancel(order_id).await {
                Ok(_) => {
                    tracing::info!(
                        order_ledger_id = %ledger_id,
                        order_id = %order_id,
                        "Compensation: order cancelled"
                    );
                }
                Err(e) => errors.push(format!("cancel_order: {e}")),
            }
        }

        // The ledger is FAILED regardless of how the steps went.
        self.ledger
            .transition(ledger_id, LedgerStatus::Compensating, LedgerStatus::Failed)
            .await?;

        if errors.is_empty() {
            tracing::info!(
                order_ledger_id = %ledger_id,
                steps = ?steps_executed,
                "Compensation completed"
            );
            Ok(CompensationOutcome::Completed { steps_executed })
        } else {
            tracing::error!(
                order_ledger_id = %ledger_id,
                steps = ?steps_executed,
                errors = ?errors,
                "Compensation finished with errors"
            );
            Ok(CompensationOutcome::Failed {
                steps_executed,
                errors,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{ledger_fixture, FakeInventory, FakeOrders, FakePayments, InMemoryLedger};
    use platform_client_orders::OrdersError;
    use std::sync::atomic::Ordering;
    use uuid::Uuid;

    struct Harness {
        ledger: Arc<InMemoryLedger>,
        orders: Arc<FakeOrders>,
        inventory: Arc<FakeInventory>,
        payments: Arc<FakePayments>,
        executor: CompensationExecutor,
    }

    fn harness(orders: FakeOrders, inventory: FakeInventory, payments: FakePayments) -> Harness {
        let ledger = Arc::new(InMemoryLedger::new());
        let orders = Arc::new(orders);
        let inventory = Arc::new(inventory);
        let payments = Arc::new(payments);
        let executor = CompensationExecutor::new(
            ledger.clone(),
            orders.clone(),
            inventory.clone(),
            payments.clone(),
        );

        Harness {
            ledger,
            orders,
            inventory,
            payments,
            executor,
        }
    }

    fn context(
        h: &Harness,
        last_successful_status: LedgerStatus,
        with_order: bool,
    ) -> CompensationContext {
        let (mut ledger, items) = ledger_fixture(last_successful_status);
        if with_order {
            ledger.order_id = Some(Uuid::new_v4());
        }
        let context = CompensationContext {
            order_ledger_id: ledger.id,
            order_id: ledger.order_id,
            payment_authorization_id: ledger.payment_authorization_id.clone(),
            last_successful_status,
        };
        h.ledger.insert(ledger, items);
        context
    }

    #[tokio::test]
    async fn test_failure_after_capture_skips_void() {
        let h = harness(FakeOrders::new(), FakeInventory::new(), FakePayments::new());
        let ctx = context(&h, LedgerStatus::PaymentCaptured, true);

        let outcome = h.executor.run(&ctx).await.expect("run failed");

        match outcome {
            CompensationOutcome::Completed { steps_executed } => {
                assert_eq!(steps_executed, vec!["release_inventory", "cancel_order"]);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
        // Captured money is never voided.
        assert_eq!(h.payments.void_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.inventory.release_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.orders.cancel_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.ledger.status_of(ctx.order_ledger_id), LedgerStatus::Failed);
    }

    #[tokio::test]
    async fn test_failure_before_reservation_skips_release() {
        let h = harness(FakeOrders::new(), FakeInventory::new(), FakePayments::new());
        let ctx = context(&h, LedgerStatus::OrderCreated, true);

        let outcome = h.executor.run(&ctx).await.expect("run failed");

        match outcome {
            CompensationOutcome::Completed { steps_executed } => {
                assert_eq!(steps_executed, vec!["void_payment", "cancel_order"]);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
        assert_eq!(h.inventory.release_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.ledger.status_of(ctx.order_ledger_id), LedgerStatus::Failed);
    }

    #[tokio::test]
    async fn test_failure_before_order_creation_only_voids() {
        let h = harness(FakeOrders::new(), FakeInventory::new(), FakePayments::new());
        let ctx = context(&h, LedgerStatus::Authorized, false);

        let outcome = h.executor.run(&ctx).await.expect("run failed");

        match outcome {
            CompensationOutcome::Completed { steps_executed } => {
                assert_eq!(steps_executed, vec!["void_payment"]);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
        assert_eq!(h.orders.cancel_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.inventory.release_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.ledger.status_of(ctx.order_ledger_id), LedgerStatus::Failed);
    }

    #[tokio::test]
    async fn test_already_voided_counts_as_success() {
        let h = harness(
            FakeOrders::new(),
            FakeInventory::new(),
            FakePayments::with_void_failures(vec![PaymentsError::AlreadyVoided]),
        );
        let ctx = context(&h, LedgerStatus::OrderCreated, true);

        let outcome = h.executor.run(&ctx).await.expect("run failed");

        assert!(matches!(outcome, CompensationOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn test_void_conflict_is_recorded_but_does_not_stop_the_run() {
        let h = harness(
            FakeOrders::new(),
            FakeInventory::new(),
            FakePayments::with_void_failures(vec![PaymentsError::AlreadyCaptured]),
        );
        let ctx = context(&h, LedgerStatus::InventoryReserved, true);

        let outcome = h.executor.run(&ctx).await.expect("run failed");

        match outcome {
            CompensationOutcome::Failed {
                steps_executed,
                errors,
            } => {
                assert_eq!(
                    steps_executed,
                    vec!["void_payment", "release_inventory", "cancel_order"]
                );
                assert_eq!(errors.len(), 1);
                assert!(errors[0].contains("void_payment"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        // The later steps still ran.
        assert_eq!(h.inventory.release_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.orders.cancel_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.ledger.status_of(ctx.order_ledger_id), LedgerStatus::Failed);
    }

    #[tokio::test]
    async fn test_every_applicable_step_is_attempted_despite_failures() {
        let h = harness(
            FakeOrders::with_create_failures(vec![]),
            FakeInventory::new(),
            FakePayments::with_void_failures(vec![PaymentsError::Connection {
                message: "gateway down".to_string(),
            }]),
        );
        *h.orders.cancel_results.lock().unwrap() = vec![Err(OrdersError::InvalidOrderStatus {
            message: "cannot cancel a CONFIRMED order".to_string(),
        })]
        .into_iter()
        .collect();
        let ctx = context(&h, LedgerStatus::InventoryReserved, true);

        let outcome = h.executor.run(&ctx).await.expect("run failed");

        match outcome {
            CompensationOutcome::Failed {
                steps_executed,
                errors,
            } => {
                assert_eq!(
                    steps_executed,
                    vec!["void_payment", "release_inventory", "cancel_order"]
                );
                assert_eq!(errors.len(), 2);
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(h.ledger.status_of(ctx.order_ledger_id), LedgerStatus::Failed);
    }
}
