//! Order intake: authorise-then-persist with a transactional outbox.
//!
//! The `Idempotency-Key` header is the client's request identity. A key
//! that already has a ledger row is answered from that row without a second
//! authorisation. On a fresh key the payment is authorised first; only then
//! does one transaction insert the ledger row, its line items and the
//! `OrderAuthorized` outbox event, so the saga can never observe a
//! half-written order.

use std::sync::Arc;

use platform_client_payments::{AuthorizeRequest, PaymentsApi, PaymentsError};
use sqlx::PgPool;
use uuid::Uuid;

use ledger_store::{
    ledger_repo, outbox_repo, LedgerItemInsert, LedgerStatus, OrderAuthorizedPayload, OrderLedger,
    OrderLedgerItem,
};

use crate::models::CreateOrderRequest;
use crate::services::is_unique_violation;
use crate::validation::{compute_total, validate_create_order, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum EdgeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("order ledger entry not found")]
    NotFound,

    #[error("payment gateway error: {message}")]
    Gateway { message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Outcome of a create-order call; every variant maps to exactly one
/// response shape.
#[derive(Debug)]
pub enum CreateOrderOutcome {
    /// 202: ledger written, outbox event queued.
    Accepted(OrderLedger),
    /// 409: the idempotency key already has a ledger row.
    Duplicate(OrderLedger),
    /// 402: gateway declined; an AUTHORIZATION_FAILED row was written for
    /// audit.
    Declined {
        decline_code: String,
        message: String,
    },
}

pub struct OrderService {
    pool: PgPool,
    payments: Arc<dyn PaymentsApi>,
}

impl OrderService {
    pub fn new(pool: PgPool, payments: Arc<dyn PaymentsApi>) -> Self {
        Self { pool, payments }
    }

    pub async fn create_order(
        &self,
        idempotency_key: &str,
        request: &CreateOrderRequest,
    ) -> Result<CreateOrderOutcome, EdgeError> {
        validate_create_order(request)?;
        let total_amount_cents = compute_total(&request.items)?;

        if let Some(existing) =
            ledger_repo::find_by_client_request_id(&self.pool, idempotency_key).await?
        {
            tracing::info!(
                client_request_id = %idempotency_key,
                order_ledger_id = %existing.id,
                status = existing.status.as_str(),
                "Duplicate request, returning existing ledger entry"
            );
            return Ok(CreateOrderOutcome::Duplicate(existing));
        }

        let authorization = self
            .payments
            .authorize(&AuthorizeRequest {
                user_id: request.user_id,
                amount_cents: total_amount_cents,
                currency: request.currency.clone(),
                token: request.payment.token.clone(),
                idempotency_key: idempotency_key.to_string(),
            })
            .await;

        match authorization {
            Ok(authorized) => {
                self.persist_authorized(
                    idempotency_key,
                    request,
                    total_amount_cents,
                    &authorized.authorization_id,
                )
                .await
            }
            Err(PaymentsError::Declined {
                decline_code,
                message,
            }) => {
                self.persist_declined(idempotency_key, request, total_amount_cents)
                    .await?;
                Ok(CreateOrderOutcome::Declined {
                    decline_code,
                    message,
                })
            }
            // Transient gateway trouble: nothing is persisted so the client
            // can retry with the same key.
            Err(e) => Err(EdgeError::Gateway {
                message: e.to_string(),
            }),
        }
    }

    /// Single transaction: AUTHORIZED ledger row + items + outbox event.
    async fn persist_authorized(
        &self,
        idempotency_key: &str,
        request: &CreateOrderRequest,
        total_amount_cents: i64,
        authorization_id: &str,
    ) -> Result<CreateOrderOutcome, EdgeError> {
        let ledger_id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        let insert = ledger_repo::insert_ledger(
            &mut tx,
            ledger_id,
            idempotency_key,
            request.user_id,
            &request.email,
            LedgerStatus::Authorized,
            total_amount_cents,
            &request.currency,
            Some(authorization_id),
        )
        .await;

        if let Err(e) = insert {
            if is_unique_violation(&e) {
                // A concurrent request with the same key won the insert; the
                // gateway collapsed the two authorisations onto one key, so
                // answering from the winner's row is correct.
                drop(tx);
                let existing =
                    ledger_repo::find_by_client_request_id(&self.pool, idempotency_key)
                        .await?
                        .ok_or(EdgeError::NotFound)?;
                return Ok(CreateOrderOutcome::Duplicate(existing));
            }
            return Err(e.into());
        }

        let items: Vec<LedgerItemInsert> = request
            .items
            .iter()
            .map(|item| LedgerItemInsert {
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
            })
            .collect();
        ledger_repo::insert_items(&mut tx, ledger_id, &items).await?;

        outbox_repo::enqueue(
            &mut tx,
            Uuid::new_v4(),
            "order_ledger",
            &ledger_id.to_string(),
            "OrderAuthorized",
            &OrderAuthorizedPayload {
                order_ledger_id: ledger_id,
                user_id: request.user_id,
                email: request.email.clone(),
                total_amount_cents,
                currency: request.currency.clone(),
                payment_authorization_id: authorization_id.to_string(),
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            order_ledger_id = %ledger_id,
            payment_authorization_id = %authorization_id,
            total_amount_cents,
            "Order accepted, ledger and outbox written"
        );

        ledger_repo::find_by_id(&self.pool, ledger_id)
            .await?
            .ok_or(EdgeError::NotFound)
            .map(CreateOrderOutcome::Accepted)
    }

    /// Audit row for a decline: AUTHORIZATION_FAILED, no outbox event.
    async fn persist_declined(
        &self,
        idempotency_key: &str,
        request: &CreateOrderRequest,
        total_amount_cents: i64,
    ) -> Result<(), EdgeError> {
        let ledger_id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        let insert = ledger_repo::insert_ledger(
            &mut tx,
            ledger_id,
            idempotency_key,
            request.user_id,
            &request.email,
            LedgerStatus::AuthorizationFailed,
            total_amount_cents,
            &request.currency,
            None,
        )
        .await;

        if let Err(e) = insert {
            if is_unique_violation(&e) {
                // The concurrent twin already recorded this key; either
                // outcome is the stored truth for future duplicates.
                return Ok(());
            }
            return Err(e.into());
        }

        let items: Vec<LedgerItemInsert> = request
            .items
            .iter()
            .map(|item| LedgerItemInsert {
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
            })
            .collect();
        ledger_repo::insert_items(&mut tx, ledger_id, &items).await?;

        tx.commit().await?;

        tracing::warn!(
            order_ledger_id = %ledger_id,
            client_request_id = %idempotency_key,
            "Authorization declined, audit row written"
        );

        Ok(())
    }

    pub async fn get_order(
        &self,
        order_ledger_id: Uuid,
    ) -> Result<(OrderLedger, Vec<OrderLedgerItem>), EdgeError> {
        let ledger = ledger_repo::find_by_id(&self.pool, order_ledger_id)
            .await?
            .ok_or(EdgeError::NotFound)?;
        let items = ledger_repo::fetch_items(&self.pool, order_ledger_id).await?;
        Ok((ledger, items))
    }
}
