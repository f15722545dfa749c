//! Change-notification listener for the outbox.
//!
//! A dedicated connection LISTENs on the `outbox_events` channel (the edge
//! database raises a NOTIFY from an AFTER INSERT trigger) and forwards
//! payloads into an unbounded channel the poll loop selects on. Connection
//! loss degrades to interval-only polling until the reconnect succeeds, so
//! notifications are an optimisation, never a correctness requirement.

use sqlx::postgres::PgListener;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

const CHANNEL: &str = "outbox_events";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub async fn run_outbox_listener(database_url: String, wakeups: UnboundedSender<String>) {
    loop {
        match PgListener::connect(&database_url).await {
            Ok(mut listener) => {
                if let Err(e) = listener.listen(CHANNEL).await {
                    tracing::warn!(error = %e, "Failed to LISTEN on outbox channel");
                } else {
                    tracing::info!(channel = CHANNEL, "Outbox listener connected");

                    loop {
                        match listener.recv().await {
                            Ok(notification) => {
                                if wakeups.send(notification.payload().to_string()).is_err() {
                                    // Poll loop is gone; nothing left to wake.
                                    return;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Outbox listener lost connection");
                                break;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Outbox listener failed to connect");
            }
        }

        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}
