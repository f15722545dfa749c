//! Outbox poller: claims due PENDING events and runs the saga on each.
//!
//! Wake-up is whichever fires first: the fixed poll interval or a
//! change-notification from the listener task. Claims are a single atomic
//! statement (`FOR UPDATE SKIP LOCKED` + visibility stamp), so any number
//! of workers can compete without double-delivery.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::mpsc::UnboundedReceiver;

use ledger_store::{outbox_repo, OutboxEvent};

use crate::compensation::{CompensationExecutor, CompensationOutcome};
use crate::saga::{SagaExecutor, SagaResult};
use crate::store::LedgerStore;

/// How long a claimed event stays invisible to other workers. Generous
/// against the sum of step timeouts; a crashed worker's events come back
/// after this lapses.
const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct PollerSettings {
    pub poll_interval: Duration,
    pub batch_size: i64,
}

pub struct Poller {
    pool: PgPool,
    ledger: Arc<dyn LedgerStore>,
    executor: Arc<SagaExecutor>,
    compensation: Arc<CompensationExecutor>,
    settings: PollerSettings,
}

impl Poller {
    pub fn new(
        pool: PgPool,
        ledger: Arc<dyn LedgerStore>,
        executor: Arc<SagaExecutor>,
        compensation: Arc<CompensationExecutor>,
        settings: PollerSettings,
    ) -> Self {
        Self {
            pool,
            ledger,
            executor,
            compensation,
            settings,
        }
    }

    /// Long-running poll loop. At most one worker owns the notification
    /// receiver; the rest run on the interval alone.
    pub async fn run(&self, mut wakeups: Option<UnboundedReceiver<String>>) {
        tracing::info!(
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            batch_size = self.settings.batch_size,
            with_listener = wakeups.is_some(),
            "Outbox poller started"
        );

        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let channel_closed = match wakeups.as_mut() {
                Some(receiver) => {
                    tokio::select! {
                        _ = interval.tick() => false,
                        notification = receiver.recv() => notification.is_none(),
                    }
                }
                None => {
                    interval.tick().await;
                    false
                }
            };

            if channel_closed {
                tracing::warn!("Notification channel closed, polling on interval only");
                wakeups = None;
            }

            // Coalesce any burst of notifications into this pass.
            if let Some(receiver) = wakeups.as_mut() {
                while receiver.try_recv().is_ok() {}
            }

            self.drain_due_events().await;
        }
    }

    /// Claim and process batches until the due backlog is empty.
    async fn drain_due_events(&self) {
        loop {
            let events = match outbox_repo::claim_due(
                &self.pool,
                self.settings.batch_size,
                VISIBILITY_TIMEOUT,
            )
            .await
            {
                Ok(events) => events,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim outbox events");
                    return;
                }
            };

            if events.is_empty() {
                return;
            }

            let batch_len = events.len();
            for event in events {
                self.process_event(event).await;
            }

            if (batch_len as i64) < self.settings.batch_size {
                return;
            }
        }
    }

    async fn process_event(&self, event: OutboxEvent) {
        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            retry_count = event.retry_count,
            "Processing outbox event"
        );

        match self.executor.execute(&event).await {
            SagaResult::Completed { order_ledger_id } => {
                tracing::info!(
                    event_id = %event.id,
                    order_ledger_id = %order_ledger_id,
                    "Saga completed"
                );
                self.finalize(event.id, false).await;
            }
            SagaResult::Failed {
                order_ledger_id,
                reason,
            } => {
                tracing::warn!(
                    event_id = %event.id,
                    order_ledger_id = ?order_ledger_id,
                    reason = %reason,
                    "Saga terminally failed, spending event"
                );
                self.finalize(event.id, false).await;
            }
            SagaResult::RequiresRetry {
                order_ledger_id,
                delay,
                error,
            } => {
                let next_retry_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());

                tracing::info!(
                    event_id = %event.id,
                    order_ledger_id = %order_ledger_id,
                    retry_count = event.retry_count,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Scheduling saga retry"
                );

                if let Err(e) =
                    outbox_repo::schedule_retry(&self.pool, event.id, next_retry_at).await
                {
                    // Leave the claim stamp in place; the event becomes due
                    // again once the visibility timeout lapses.
                    tracing::error!(event_id = %event.id, error = %e, "Failed to schedule retry");
                    return;
                }
                if let Err(e) = self.ledger.record_retry(order_ledger_id, next_retry_at).await {
                    tracing::error!(
                        order_ledger_id = %order_ledger_id,
                        error = %e,
                        "Failed to mirror retry onto ledger"
                    );
                }
            }
            SagaResult::RequiresCompensation { context, error } => {
                tracing::warn!(
                    event_id = %event.id,
                    order_ledger_id = %context.order_ledger_id,
                    error = %error,
                    "Escalating to compensation"
                );

                match self.compensation.run(&context).await {
                    Ok(CompensationOutcome::Completed { steps_executed }) => {
                        tracing::info!(
                            event_id = %event.id,
                            order_ledger_id = %context.order_ledger_id,
                            steps = ?steps_executed,
                            "Compensation completed, spending event"
                        );
                        self.finalize(event.id, false).await;
                    }
                    Ok(CompensationOutcome::Failed {
                        steps_executed,
                        errors,
                    }) => {
                        // Best-effort by contract: the ledger is FAILED, the
                        // per-step errors are on record, the event is spent.
                        tracing::error!(
                            event_id = %event.id,
                            order_ledger_id = %context.order_ledger_id,
                            steps = ?steps_executed,
                            errors = ?errors,
                            "Compensation finished with errors, spending event"
                        );
                        self.finalize(event.id, false).await;
                    }
                    Err(e) => {
                        // Safety valve: compensation itself died on the
                        // database. Park the event as FAILED so it cannot
                        // wedge the queue.
                        tracing::error!(
                            event_id = %event.id,
                            order_ledger_id = %context.order_ledger_id,
                            error = %e,
                            "Compensation errored internally, parking event as FAILED"
                        );
                        self.finalize(event.id, true).await;
                    }
                }
            }
        }
    }

    async fn finalize(&self, event_id: uuid::Uuid, park_failed: bool) {
        let result = if park_failed {
            outbox_repo::mark_failed(&self.pool, event_id).await
        } else {
            outbox_repo::mark_processed(&self.pool, event_id).await
        };

        if let Err(e) = result {
            // The claim stamp keeps the event invisible for now; it will be
            // redelivered and the saga re-run is idempotent.
            tracing::error!(event_id = %event_id, error = %e, "Failed to finalize outbox event");
        }
    }
}
