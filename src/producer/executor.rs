//! # TransactionExecutor: one message, one transaction.
//!
//! ```text
//! begin_txn ──err──► ProduceError::Begin              (handle stays Idle)
//!     │
//! enqueue ────err──► abort (best effort) ─► ProduceError::Enqueue
//!     │
//! commit_txn ──ok──► Delivery::Committed
//!     │ err
//!     ▼
//! recover (at most max_commit_retries commit calls):
//!   status FATAL      ─► Fatal, ProduceError::Fatal       (abort never called)
//!   status ABORTABLE  ─► abort_txn ─ok─► Delivery::Aborted
//!                                  └err─► retry abort      (bounded by max_abort_failures,
//!                                                          commit budget untouched)
//!   otherwise         ─► commit_txn ─ok─► Delivery::Committed
//!                                   └err─► budget -= 1
//!   budget spent      ─► ProduceError::RetriesExhausted
//! ```
//!
//! Commit success is the only delivery confirmation; delivery reports are never read.
//! There is no internal timeout: wrap the call in `tokio::time::timeout` when
//! latency must be bounded.

use std::sync::Arc;

use crate::config::ProducerConfig;
use crate::error::{ProduceError, TransportError};
use crate::events::{Bus, Event, EventKind};
use crate::producer::{ProducerHandle, TxnState};
use crate::transport::Message;

/// Outcome of a send that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The transaction carrying the message committed.
    Committed,
    /// The transaction was aborted cleanly; the message was **not** delivered.
    Aborted {
        /// Commit failure that led to the abort.
        reason: String,
    },
    /// Non-transactional handle: the record was accepted by the input sink.
    Enqueued,
}

impl Delivery {
    pub fn is_committed(&self) -> bool {
        matches!(self, Delivery::Committed)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Delivery::Aborted { .. })
    }
}

/// Drives the begin → enqueue → commit/abort protocol on a borrowed handle.
#[derive(Clone, Debug)]
pub struct TransactionExecutor {
    max_commit_retries: u32,
    abort_failure_limit: Option<u32>,
    bus: Bus,
}

impl TransactionExecutor {
    pub fn new(cfg: &ProducerConfig, bus: Bus) -> Self {
        Self {
            max_commit_retries: cfg.max_commit_retries,
            abort_failure_limit: cfg.abort_failure_limit(),
            bus,
        }
    }

    /// Sends `message` inside one transaction on `handle`.
    pub async fn send(
        &self,
        handle: &mut ProducerHandle,
        message: Message,
    ) -> Result<Delivery, ProduceError> {
        let topic: Arc<str> = Arc::from(message.topic.as_str());

        if !handle.is_transactional() {
            handle
                .enqueue(message)
                .map_err(|error| ProduceError::Enqueue { error })?;
            return Ok(Delivery::Enqueued);
        }

        if let Err(error) = handle.begin_txn().await {
            self.publish(EventKind::TxnBeginFailed, handle, &topic, |e| {
                e.with_reason(error.to_string())
            });
            if handle.txn_status().is_fatal() {
                handle.set_state(TxnState::Fatal);
            }
            return Err(ProduceError::Begin { error });
        }
        handle.set_state(TxnState::InTransaction);

        if let Err(error) = handle.enqueue(message) {
            handle.set_state(TxnState::Aborting);
            match handle.abort_txn().await {
                Ok(()) => handle.set_state(TxnState::Idle),
                Err(abort) => self.publish(EventKind::TxnAbortFailed, handle, &topic, |e| {
                    e.with_reason(abort.to_string())
                }),
            }
            return Err(ProduceError::Enqueue { error });
        }

        handle.set_state(TxnState::Committing);
        match handle.commit_txn().await {
            Ok(()) => {
                handle.set_state(TxnState::Idle);
                self.publish(EventKind::TxnCommitted, handle, &topic, |e| e.with_attempt(1));
                Ok(Delivery::Committed)
            }
            Err(error) => {
                self.publish(EventKind::TxnCommitFailed, handle, &topic, |e| {
                    e.with_attempt(0).with_reason(error.to_string())
                });
                self.recover(handle, &topic, error).await
            }
        }
    }

    /// Recovery loop after a failed commit.
    async fn recover(
        &self,
        handle: &mut ProducerHandle,
        topic: &Arc<str>,
        mut last: TransportError,
    ) -> Result<Delivery, ProduceError> {
        let mut retries = 0u32;
        let mut abort_failures = 0u32;

        while retries < self.max_commit_retries {
            let status = handle.txn_status();

            if status.is_fatal() {
                handle.set_state(TxnState::Fatal);
                let commits = retries + 1;
                self.publish(EventKind::TxnFatal, handle, topic, |e| e.with_attempt(commits));
                return Err(ProduceError::Fatal { attempt: commits });
            }

            if status.is_abortable() {
                handle.set_state(TxnState::Aborting);
                match handle.abort_txn().await {
                    Ok(()) => {
                        handle.set_state(TxnState::Idle);
                        let reason = last.to_string();
                        self.publish(EventKind::TxnAborted, handle, topic, |e| {
                            e.with_reason(reason.as_str())
                        });
                        return Ok(Delivery::Aborted { reason });
                    }
                    Err(error) => {
                        abort_failures += 1;
                        self.publish(EventKind::TxnAbortFailed, handle, topic, |e| {
                            e.with_attempt(abort_failures).with_reason(error.to_string())
                        });
                        last = error;
                        if self
                            .abort_failure_limit
                            .is_some_and(|limit| abort_failures >= limit)
                        {
                            break;
                        }
                        continue;
                    }
                }
            }

            retries += 1;
            handle.set_state(TxnState::Committing);
            match handle.commit_txn().await {
                Ok(()) => {
                    handle.set_state(TxnState::Idle);
                    self.publish(EventKind::TxnCommitted, handle, topic, |e| {
                        e.with_attempt(retries + 1)
                    });
                    return Ok(Delivery::Committed);
                }
                Err(error) => {
                    self.publish(EventKind::TxnCommitFailed, handle, topic, |e| {
                        e.with_attempt(retries).with_reason(error.to_string())
                    });
                    last = error;
                }
            }
        }

        self.publish(EventKind::TxnRetriesExhausted, handle, topic, |e| {
            e.with_attempt(retries).with_reason(last.to_string())
        });
        Err(ProduceError::RetriesExhausted {
            attempts: retries,
            error: last,
        })
    }

    fn publish(
        &self,
        kind: EventKind,
        handle: &ProducerHandle,
        topic: &Arc<str>,
        f: impl FnOnce(Event) -> Event,
    ) {
        let ev = Event::new(kind)
            .with_handle(Arc::clone(handle.label()))
            .with_topic(Arc::clone(topic));
        self.bus.publish(f(ev));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryBroker;
    use crate::transport::{ProducerSettings, Transport, TxnStatus};
    use bytes::Bytes;

    async fn open(broker: &MemoryBroker) -> ProducerHandle {
        let cfg = ProducerConfig::default();
        let settings = ProducerSettings::from_config(
            &["mem:9092".to_string()],
            &cfg,
            Some("txn_producer-0".to_string()),
        );
        let session = broker.new_producer(&settings).await.unwrap();
        ProducerHandle::new(0, Some("txn_producer-0".to_string()), session)
    }

    fn executor() -> TransactionExecutor {
        TransactionExecutor::new(&ProducerConfig::default(), Bus::new(64))
    }

    fn msg() -> Message {
        Message::new("orders", Bytes::from_static(b"k"), Bytes::from_static(b"v"))
    }

    #[tokio::test]
    async fn test_commit_success_leaves_handle_idle() {
        let broker = MemoryBroker::new();
        let mut handle = open(&broker).await;

        let out = executor().send(&mut handle, msg()).await.unwrap();
        assert_eq!(out, Delivery::Committed);
        assert_eq!(handle.state(), TxnState::Idle);
        assert_eq!(broker.records("orders", 0).len(), 1);
    }

    #[tokio::test]
    async fn test_begin_failure_keeps_handle_idle() {
        let broker = MemoryBroker::new();
        let mut handle = open(&broker).await;
        broker.faults().fail_begin(1);

        let err = executor().send(&mut handle, msg()).await.unwrap_err();
        assert_eq!(err.as_label(), "produce_begin");
        assert_eq!(handle.state(), TxnState::Idle);
        assert_eq!(broker.stats().commits, 0);
    }

    #[tokio::test]
    async fn test_enqueue_failure_aborts_transaction() {
        let broker = MemoryBroker::new();
        let mut handle = open(&broker).await;
        broker.faults().fail_enqueue(1);

        let err = executor().send(&mut handle, msg()).await.unwrap_err();
        assert!(matches!(err, ProduceError::Enqueue { .. }));
        assert_eq!(handle.state(), TxnState::Idle);
        assert_eq!(broker.stats().aborts, 1);
    }

    #[tokio::test]
    async fn test_abortable_commit_failure_reports_abort() {
        let broker = MemoryBroker::new();
        let mut handle = open(&broker).await;
        broker.faults().fail_commit(TxnStatus::ABORTABLE_ERROR);

        let out = executor().send(&mut handle, msg()).await.unwrap();
        assert!(out.is_aborted());
        assert_eq!(handle.state(), TxnState::Idle);
        assert!(broker.records("orders", 0).is_empty());
    }

    #[tokio::test]
    async fn test_fatal_flag_never_aborts() {
        let broker = MemoryBroker::new();
        let mut handle = open(&broker).await;
        broker.faults().fail_commit(TxnStatus::FATAL_ERROR);

        let err = executor().send(&mut handle, msg()).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(handle.state(), TxnState::Fatal);
        assert_eq!(broker.stats().aborts, 0);
    }
}
