//! Ledger persistence seam for the saga.
//!
//! The executor and the compensation path program against [`LedgerStore`];
//! [`PgLedgerStore`] is the production implementation over the edge
//! database. Tests drive the saga against an in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use ledger_store::{ledger_repo, LedgerStatus, OrderLedger, OrderLedgerItem};

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find(&self, id: Uuid) -> Result<Option<OrderLedger>, sqlx::Error>;

    async fn fetch_items(&self, id: Uuid) -> Result<Vec<OrderLedgerItem>, sqlx::Error>;

    /// Conditional move `expected -> to`; `false` when the row was elsewhere.
    async fn transition(
        &self,
        id: Uuid,
        expected: LedgerStatus,
        to: LedgerStatus,
    ) -> Result<bool, sqlx::Error>;

    /// AUTHORIZED -> ORDER_CREATED, recording the remote order id.
    async fn record_order_created(&self, id: Uuid, order_id: Uuid) -> Result<bool, sqlx::Error>;

    /// Divert any in-flight forward state to COMPENSATING.
    async fn mark_compensating(&self, id: Uuid) -> Result<bool, sqlx::Error>;

    /// Mirror a scheduled retry onto the ledger row.
    async fn record_retry(&self, id: Uuid, next_retry_at: DateTime<Utc>)
        -> Result<(), sqlx::Error>;
}

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn find(&self, id: Uuid) -> Result<Option<OrderLedger>, sqlx::Error> {
        ledger_repo::find_by_id(&self.pool, id).await
    }

    async fn fetch_items(&self, id: Uuid) -> Result<Vec<OrderLedgerItem>, sqlx::Error> {
        ledger_repo::fetch_items(&self.pool, id).await
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: LedgerStatus,
        to: LedgerStatus,
    ) -> Result<bool, sqlx::Error> {
        ledger_repo::transition_status(&self.pool, id, expected, to).await
    }

    async fn record_order_created(&self, id: Uuid, order_id: Uuid) -> Result<bool, sqlx::Error> {
        ledger_repo::record_order_created(&self.pool, id, order_id).await
    }

    async fn mark_compensating(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        ledger_repo::mark_compensating(&self.pool, id).await
    }

    async fn record_retry(
        &self,
        id: Uuid,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        ledger_repo::record_retry(&self.pool, id, next_retry_at).await
    }
}
