//! # LogWriter: events to `tracing`
//!
//! A subscriber that writes every [`Event`] as one `tracing` record under the
//! `txvisor` target. Failures go to `warn`, lifecycle to `info`, chatter
//! (claim start/stop, backoff) to `debug`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO txvisor: handle created handle="txn_producer-0" attempt=1
//! WARN txvisor: commit failed handle="txn_producer-0" topic="orders" attempt=0 reason="commit request timed out"
//! INFO txvisor: committed handle="txn_producer-0" topic="orders" attempt=2
//! INFO txvisor: session setup group="billing" generation=1 claims=3
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let handle = e.handle.as_deref().unwrap_or("");
        let group = e.group.as_deref().unwrap_or("");
        let topic = e.topic.as_deref().unwrap_or("");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::HandleCreated => {
                info!(target: "txvisor", handle, attempt = ?e.attempt, "handle created");
            }
            EventKind::HandleFactoryFailed => {
                warn!(target: "txvisor", handle, attempt = ?e.attempt, reason, "handle factory failed");
            }
            EventKind::BorrowBackoff => {
                debug!(target: "txvisor", attempt = ?e.attempt, delay_ms = ?e.delay_ms, reason, "borrow backoff");
            }
            EventKind::HandleDiscarded => {
                info!(target: "txvisor", handle, reason, "handle discarded");
            }
            EventKind::PoolCleared => {
                info!(target: "txvisor", closed = ?e.attempt, "pool cleared");
            }
            EventKind::TxnBeginFailed => {
                warn!(target: "txvisor", handle, topic, reason, "begin failed");
            }
            EventKind::TxnCommitted => {
                debug!(target: "txvisor", handle, topic, attempt = ?e.attempt, "committed");
            }
            EventKind::TxnCommitFailed => {
                warn!(target: "txvisor", handle, topic, attempt = ?e.attempt, reason, "commit failed");
            }
            EventKind::TxnAborted => {
                warn!(target: "txvisor", handle, topic, reason, "transaction aborted");
            }
            EventKind::TxnAbortFailed => {
                warn!(target: "txvisor", handle, topic, reason, "abort failed");
            }
            EventKind::TxnFatal => {
                warn!(target: "txvisor", handle, topic, attempt = ?e.attempt, "producer fatal, need to recreate it");
            }
            EventKind::TxnRetriesExhausted => {
                warn!(target: "txvisor", handle, topic, attempt = ?e.attempt, reason, "commit retries exhausted");
            }
            EventKind::SessionSetup => {
                info!(target: "txvisor", group, generation = ?e.generation, claims = ?e.attempt, "session setup");
            }
            EventKind::SessionCleanup => {
                info!(target: "txvisor", group, generation = ?e.generation, "session cleanup");
            }
            EventKind::ClaimStarted => {
                debug!(target: "txvisor", group, topic, partition = ?e.partition, offset = ?e.offset, "claim started");
            }
            EventKind::ClaimStopped => {
                debug!(target: "txvisor", group, topic, partition = ?e.partition, offset = ?e.offset, "claim stopped");
            }
            EventKind::HandlerFailed => {
                warn!(
                    target: "txvisor",
                    group, topic,
                    partition = ?e.partition,
                    offset = ?e.offset,
                    attempt = ?e.attempt,
                    reason,
                    "handler failed"
                );
            }
            EventKind::MessageSkipped => {
                warn!(target: "txvisor", group, topic, partition = ?e.partition, offset = ?e.offset, reason, "message skipped");
            }
            EventKind::MessageDeadLettered => {
                info!(target: "txvisor", group, dead_letter = topic, partition = ?e.partition, offset = ?e.offset, "message dead-lettered");
            }
            EventKind::ClaimHalted => {
                warn!(target: "txvisor", group, topic, partition = ?e.partition, offset = ?e.offset, reason, "claim halted");
            }
            EventKind::RejoinBackoff => {
                info!(target: "txvisor", group, attempt = ?e.attempt, delay_ms = ?e.delay_ms, reason, "rejoin backoff");
            }
            EventKind::ErrorSinkOverflow => {
                warn!(target: "txvisor", group, reason, "error sink full, error dropped");
            }
            EventKind::GroupConsumeFailed => {
                warn!(target: "txvisor", group, reason, "group consume failed");
            }
            EventKind::GroupClosed => {
                info!(target: "txvisor", group, reason, "group closed");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "txvisor", subscriber = handle, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                warn!(target: "txvisor", subscriber = handle, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
