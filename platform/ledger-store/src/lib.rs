//! # Ledger Store
//!
//! Models and repositories for the edge database: the order ledger (the
//! authoritative record of each customer order attempt) and the
//! transactional outbox that is co-written with it.
//!
//! Two services share this crate:
//! - the **edge API** writes ledger rows, line items and outbox events in a
//!   single transaction,
//! - the **orchestrator** claims outbox events and drives ledger status
//!   transitions as the saga progresses.
//!
//! All cross-instance coordination happens through the database: unique
//! constraints (`client_request_id`), conditional updates predicated on the
//! expected prior status, and `FOR UPDATE SKIP LOCKED` claims on the outbox.

pub mod ledger_repo;
pub mod models;
pub mod outbox_repo;

pub use models::{
    LedgerItemInsert, LedgerStatus, OrderAuthorizedPayload, OrderLedger, OrderLedgerItem,
    OutboxEvent, OutboxStatus, StatusParseError,
};
