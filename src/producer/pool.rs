//! # ProducerPool: lends transactional handles.
//!
//! ```text
//! borrow():
//!   loop {
//!     lock ─► pop most recently released idle handle ─► return it
//!          └► none: open a new session (txn id "<base>-<n>") ─► return it
//!     unlock
//!     attempt >= max_factory_attempts ─► PoolError::Exhausted
//!     sleep(factory_backoff.next(attempt))            (lock not held)
//!   }
//!
//! release(handle):
//!   Idle and no error flags ─► push back
//!   otherwise               ─► close and drop          (lock not held)
//! ```
//!
//! Invariants: every idle handle is [`TxnState::Idle`]; a fatal handle never
//! re-enters the pool; a borrowed handle is owned by exactly one caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use crate::config::ProducerConfig;
use crate::error::{PoolError, ProduceError, TransportError};
use crate::events::{Bus, Event, EventKind};
use crate::producer::{Delivery, ProducerHandle, TransactionExecutor};
use crate::transport::{Message, ProducerSettings, Transport};

/// Pool of producer handles sharing one configuration.
pub struct ProducerPool {
    transport: Arc<dyn Transport>,
    brokers: Vec<String>,
    cfg: ProducerConfig,
    idle: Mutex<Vec<ProducerHandle>>,
    next_txn_id: AtomicU64,
    next_handle: AtomicU64,
    executor: TransactionExecutor,
    bus: Bus,
}

impl ProducerPool {
    pub fn new(
        transport: Arc<dyn Transport>,
        brokers: Vec<String>,
        cfg: ProducerConfig,
        bus: Bus,
    ) -> Self {
        let executor = TransactionExecutor::new(&cfg, bus.clone());
        Self {
            transport,
            brokers,
            cfg,
            idle: Mutex::new(Vec::new()),
            next_txn_id: AtomicU64::new(0),
            next_handle: AtomicU64::new(0),
            executor,
            bus,
        }
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.cfg
    }

    /// Number of idle handles.
    pub async fn len(&self) -> usize {
        self.idle.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.idle.lock().await.is_empty()
    }

    /// Takes an idle handle or opens a new one.
    ///
    /// Construction failures are retried with `factory_backoff` until
    /// `max_factory_attempts` is reached (`0` retries forever).
    pub async fn borrow(&self) -> Result<ProducerHandle, PoolError> {
        let limit = self.cfg.factory_attempt_limit();
        let mut attempt = 0u32;

        loop {
            let error = {
                let mut idle = self.idle.lock().await;
                if let Some(handle) = idle.pop() {
                    return Ok(handle);
                }
                attempt = attempt.saturating_add(1);
                match self.open(attempt).await {
                    Ok(handle) => return Ok(handle),
                    Err(error) => error,
                }
            };

            if limit.is_some_and(|max| attempt >= max) {
                return Err(PoolError::Exhausted {
                    attempts: attempt,
                    error,
                });
            }

            let delay = self.cfg.factory_backoff.next(attempt - 1);
            self.bus.publish(
                Event::new(EventKind::BorrowBackoff)
                    .with_attempt(attempt)
                    .with_delay(delay)
                    .with_reason(error.to_string()),
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Returns `handle` to the pool, or closes it when it is not reusable.
    pub async fn release(&self, mut handle: ProducerHandle) {
        if let Some(reason) = handle.discard_reason() {
            self.bus.publish(
                Event::new(EventKind::HandleDiscarded)
                    .with_handle(Arc::clone(handle.label()))
                    .with_reason(reason),
            );
            if let Err(err) = handle.close().await {
                tracing::debug!(handle = %handle.label(), error = %err, "closing discarded handle failed");
            }
            return;
        }
        self.idle.lock().await.push(handle);
    }

    /// Closes and drops every idle handle. Borrowed handles are unaffected.
    pub async fn clear(&self) {
        let drained: Vec<ProducerHandle> = std::mem::take(&mut *self.idle.lock().await);
        let count = drained.len();
        for mut handle in drained {
            if let Err(err) = handle.close().await {
                tracing::debug!(handle = %handle.label(), error = %err, "closing idle handle failed");
            }
        }
        self.bus.publish(
            Event::new(EventKind::PoolCleared).with_attempt(u32::try_from(count).unwrap_or(u32::MAX)),
        );
    }

    /// Borrows a handle, sends `message` in one transaction and releases the handle.
    pub async fn send(&self, message: Message) -> Result<Delivery, ProduceError> {
        let mut handle = self.borrow().await?;
        let outcome = self.executor.send(&mut handle, message).await;
        self.release(handle).await;
        outcome
    }

    /// Opens one session. Every call takes a fresh transactional id suffix.
    async fn open(&self, attempt: u32) -> Result<ProducerHandle, TransportError> {
        let transactional_id = self.cfg.is_transactional().then(|| {
            let n = self.next_txn_id.fetch_add(1, Ordering::Relaxed);
            format!("{}-{n}", self.cfg.transactional_id)
        });
        let settings =
            ProducerSettings::from_config(&self.brokers, &self.cfg, transactional_id.clone());
        let label = transactional_id.clone().unwrap_or_else(|| "producer".to_string());

        match self.transport.new_producer(&settings).await {
            Ok(session) => {
                let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
                let handle = ProducerHandle::new(id, transactional_id, session);
                self.bus.publish(
                    Event::new(EventKind::HandleCreated)
                        .with_handle(Arc::clone(handle.label()))
                        .with_attempt(attempt),
                );
                Ok(handle)
            }
            Err(err) => {
                self.bus.publish(
                    Event::new(EventKind::HandleFactoryFailed)
                        .with_handle(label)
                        .with_attempt(attempt)
                        .with_reason(err.to_string()),
                );
                Err(err)
            }
        }
    }
}
