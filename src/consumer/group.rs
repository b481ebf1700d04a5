//! # ConsumerGroup: supervises sessions across rebalances.
//!
//! ```text
//! subscribe(topics)
//!   ├─► spawn supervisor ──► loop {
//!   │                          keep-running == false or token cancelled ─► exit
//!   │                          client.consume(token, topics, ConsumerSession::new(gate))
//!   │                            ├─ Ok  ─► next generation (fresh gate)
//!   │                            │         claim failed ─► backoff before rejoining
//!   │                            │                         (reset once a generation marks)
//!   │                            └─ Err ─► error sink, exit
//!   │                        }
//!   └─► wait for the first gate ── fired ─► Ok(())
//!                               └─ supervisor exited first ─► its error, or Canceled
//!
//! close()
//!   keep-running = false ─► client.close() ─► join supervisor
//! ```
//!
//! ## Example
//! ```rust
//! # async fn demo() -> Result<(), txvisor::ConsumerError> {
//! use std::sync::Arc;
//! use txvisor::{Bus, ConsumerConfig, ConsumerGroup, ConsumerMessage, HandlerError, HandlerFn, MemoryBroker};
//!
//! let handler = HandlerFn::arc(|msg: ConsumerMessage| async move {
//!     println!("{}:{} {:?}", msg.partition, msg.offset, msg.value);
//!     Ok::<_, HandlerError>(())
//! });
//! let group = ConsumerGroup::new(
//!     Arc::new(MemoryBroker::new()),
//!     &["127.0.0.1:9092".to_string()],
//!     ConsumerConfig::for_group("billing"),
//!     handler,
//!     Bus::default(),
//! )
//! .await?;
//!
//! group.subscribe(["orders"]).await?;
//! group.close().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ConsumerConfig;
use crate::consumer::session::SessionContext;
use crate::consumer::{ConsumerSession, MessageHandler, ReadyGate, ready_gate};
use crate::core::shutdown;
use crate::error::{ConsumerError, TransportError};
use crate::events::{Bus, Event, EventKind};
use crate::producer::ProducerPool;
use crate::transport::{GroupClient, GroupHandler, Transport};

/// Long-lived subscription of one group member.
pub struct ConsumerGroup {
    group: Arc<str>,
    client: Arc<dyn GroupClient>,
    handler: Arc<dyn MessageHandler>,
    cfg: ConsumerConfig,
    dead_letter: Option<Arc<ProducerPool>>,
    bus: Bus,
    token: CancellationToken,
    running: watch::Sender<bool>,
    closed: AtomicBool,
    errors_tx: mpsc::Sender<ConsumerError>,
    errors_rx: Mutex<Option<mpsc::Receiver<ConsumerError>>>,
    supervisor: tokio::sync::Mutex<Option<JoinHandle<Result<(), ConsumerError>>>>,
}

impl ConsumerGroup {
    /// Creates the group client. Nothing is consumed until [`subscribe`](Self::subscribe).
    pub async fn new(
        transport: Arc<dyn Transport>,
        brokers: &[String],
        cfg: ConsumerConfig,
        handler: Arc<dyn MessageHandler>,
        bus: Bus,
    ) -> Result<Self, ConsumerError> {
        let client = transport.new_group(brokers, &cfg).await?;
        let (errors_tx, errors_rx) = mpsc::channel(cfg.error_capacity_clamped());
        let (running, _) = watch::channel(true);

        Ok(Self {
            group: Arc::from(cfg.group_id.as_str()),
            client,
            handler,
            cfg,
            dead_letter: None,
            bus,
            token: CancellationToken::new(),
            running,
            closed: AtomicBool::new(false),
            errors_tx,
            errors_rx: Mutex::new(Some(errors_rx)),
            supervisor: tokio::sync::Mutex::new(None),
        })
    }

    /// Producer pool used by [`Exhausted::DeadLetter`](crate::Exhausted::DeadLetter).
    pub fn with_dead_letter(mut self, pool: Arc<ProducerPool>) -> Self {
        self.dead_letter = Some(pool);
        self
    }

    /// Cancelling this token stops the supervisor after the running generation.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn group_id(&self) -> &str {
        &self.group
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Takes the receiving end of the error sink. Returns `None` after the first call.
    ///
    /// The sink holds `error_capacity` errors; further ones are dropped with an
    /// [`ErrorSinkOverflow`](crate::EventKind::ErrorSinkOverflow) event.
    pub fn errors(&self) -> Option<mpsc::Receiver<ConsumerError>> {
        self.errors_rx
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
    }

    /// Starts consuming `topics` and returns once the first session is set up.
    pub async fn subscribe<I, S>(&self, topics: I) -> Result<(), ConsumerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(ConsumerError::Closed);
        }
        let mut supervisor = self.supervisor.lock().await;
        if supervisor.as_ref().is_some_and(|task| !task.is_finished()) {
            return Err(ConsumerError::AlreadySubscribed);
        }

        let topics: Vec<String> = topics.into_iter().map(Into::into).collect();
        let ctx = Arc::new(SessionContext {
            group: Arc::clone(&self.group),
            handler: Arc::clone(&self.handler),
            policy: self.cfg.on_failure.clone(),
            dead_letter: self.dead_letter.clone(),
            errors: self.errors_tx.clone(),
            bus: self.bus.clone(),
        });
        let (gate, mut waiter) = ready_gate();
        let run = Supervise {
            client: Arc::clone(&self.client),
            ctx,
            topics,
            token: self.token.clone(),
            running: self.running.subscribe(),
        };
        let task = tokio::spawn(supervise(run, gate));

        if waiter.ready().await {
            *supervisor = Some(task);
            return Ok(());
        }
        // gate dropped unfired: the supervisor is gone
        match task.await {
            Ok(Ok(())) => Err(ConsumerError::Canceled),
            Ok(Err(err)) => Err(err),
            Err(join) => Err(TransportError::group(format!("supervisor task failed: {join}")).into()),
        }
    }

    /// Stops the supervisor, closes the group client and waits for the loop to exit.
    ///
    /// Calling it again is a no-op.
    pub async fn close(&self) -> Result<(), ConsumerError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.running.send_replace(false);

        let closed = self.client.close().await;
        let mut ev = Event::new(EventKind::GroupClosed).with_group(Arc::clone(&self.group));
        if let Err(err) = &closed {
            ev = ev.with_reason(err.to_string());
        }
        self.bus.publish(ev);

        let task = self.supervisor.lock().await.take();
        if let Some(task) = task {
            if let Err(join) = task.await {
                tracing::warn!(group = %self.group, error = %join, "consumer supervisor panicked");
            }
        }
        closed.map_err(ConsumerError::from)
    }

    /// Subscribes, runs until a termination signal or the group token, then closes.
    pub async fn serve<I, S>(&self, topics: I) -> Result<(), ConsumerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscribe(topics).await?;
        tokio::select! {
            res = shutdown::wait_for_shutdown_signal() => {
                if let Err(err) = res {
                    tracing::warn!(group = %self.group, error = %err, "signal handlers unavailable; waiting for cancellation");
                    self.token.cancelled().await;
                }
            }
            _ = self.token.cancelled() => {}
        }
        self.close().await
    }
}

/// Lower bound for the rejoin delay after a failed generation.
const MIN_REJOIN_DELAY: Duration = Duration::from_millis(10);

struct Supervise {
    client: Arc<dyn GroupClient>,
    ctx: Arc<SessionContext>,
    topics: Vec<String>,
    token: CancellationToken,
    running: watch::Receiver<bool>,
}

/// Joins one generation after another until closed, cancelled or failed.
async fn supervise(s: Supervise, mut gate: ReadyGate) -> Result<(), ConsumerError> {
    let mut failures = 0u32;
    loop {
        if !*s.running.borrow() || s.token.is_cancelled() {
            return Ok(());
        }

        let session = Arc::new(ConsumerSession::new(Arc::clone(&s.ctx), gate));
        let handler: Arc<dyn GroupHandler> = session.clone();
        let res = s.client.consume(&s.token, &s.topics, handler).await;

        match res {
            Ok(()) => {
                // a session that never ran setup hands its gate to the next one
                gate = session.take_gate().unwrap_or_else(ReadyGate::detached);
                if session.progressed() {
                    failures = 0;
                }
                if !session.failed() {
                    continue;
                }

                let delay = s.ctx.policy.backoff.next(failures).max(MIN_REJOIN_DELAY);
                failures = failures.saturating_add(1);
                s.ctx.bus.publish(
                    Event::new(EventKind::RejoinBackoff)
                        .with_group(Arc::clone(&s.ctx.group))
                        .with_attempt(failures)
                        .with_delay(delay)
                        .with_reason("claim loop failed"),
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = s.token.cancelled() => return Ok(()),
                    _ = stopped(s.running.clone()) => return Ok(()),
                }
            }
            Err(err) => {
                if !*s.running.borrow() {
                    return Ok(());
                }
                s.ctx.bus.publish(
                    Event::new(EventKind::GroupConsumeFailed)
                        .with_group(Arc::clone(&s.ctx.group))
                        .with_reason(err.to_string()),
                );
                let err = ConsumerError::from(err);
                s.ctx.report(err.clone());
                return Err(err);
            }
        }
    }
}

/// Resolves once the keep-running flag is cleared or the group is dropped.
async fn stopped(mut running: watch::Receiver<bool>) {
    while *running.borrow_and_update() {
        if running.changed().await.is_err() {
            return;
        }
    }
}
