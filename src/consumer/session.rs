//! # ConsumerSession: one generation of group membership.
//!
//! ```text
//! setup(session)
//!   ├─► record claims and generation
//!   └─► fire the readiness gate (once; the gate is moved out)
//!
//! consume_claim(session, claim)          one task per (topic, partition)
//!   loop {
//!     select! { token cancelled ─► stop
//!               claim.next()    ─► message | None ─► stop }
//!     handle(message)
//!       ├─ Ok                         ─► mark (unless the generation ended)
//!       └─ Err ─► retry per FailurePolicy (Fatal errors skip retries)
//!                 then Skip       ─► mark
//!                      DeadLetter ─► publish to dead-letter topic ─► mark
//!                      Halt       ─► do not mark, end claim with error
//!   }
//!
//! cleanup(session)
//!   └─► clear claims
//! ```
//!
//! Marks follow delivery order within a partition.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::consumer::{MessageHandler, ReadyGate};
use crate::error::{ConsumerError, HandlerError, TransportError};
use crate::events::{Bus, Event, EventKind};
use crate::policies::{Exhausted, FailurePolicy};
use crate::producer::{Delivery, ProducerPool};
use crate::transport::{Claim, ConsumerMessage, GroupHandler, GroupSession};

/// State shared by every generation of one group.
pub(crate) struct SessionContext {
    pub(crate) group: Arc<str>,
    pub(crate) handler: Arc<dyn MessageHandler>,
    pub(crate) policy: FailurePolicy,
    pub(crate) dead_letter: Option<Arc<ProducerPool>>,
    pub(crate) errors: mpsc::Sender<ConsumerError>,
    pub(crate) bus: Bus,
}

impl SessionContext {
    /// Pushes `err` to the error sink; a full sink drops it and publishes `ErrorSinkOverflow`.
    pub(crate) fn report(&self, err: ConsumerError) {
        match self.errors.try_send(err) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(err)) => {
                self.bus.publish(
                    Event::new(EventKind::ErrorSinkOverflow)
                        .with_group(Arc::clone(&self.group))
                        .with_reason(err.to_string()),
                );
            }
        }
    }
}

/// What the claim loop does with a message after handling.
enum Verdict {
    Mark,
    /// Generation ended while retrying; leave the message for redelivery.
    Stop,
}

/// Group handler for one generation.
pub struct ConsumerSession {
    ctx: Arc<SessionContext>,
    gate: Mutex<Option<ReadyGate>>,
    claims: Mutex<Vec<(String, i32)>>,
    generation: AtomicI32,
    marked: AtomicBool,
    failed: AtomicBool,
}

impl ConsumerSession {
    pub(crate) fn new(ctx: Arc<SessionContext>, gate: ReadyGate) -> Self {
        Self {
            ctx,
            gate: Mutex::new(Some(gate)),
            claims: Mutex::new(Vec::new()),
            generation: AtomicI32::new(-1),
            marked: AtomicBool::new(false),
            failed: AtomicBool::new(false),
        }
    }

    /// Claims recorded by the last `setup`; empty after `cleanup`.
    pub fn claims(&self) -> Vec<(String, i32)> {
        lock(&self.claims).clone()
    }

    /// Generation id recorded by `setup`, `-1` before it ran.
    pub fn generation(&self) -> i32 {
        self.generation.load(Ordering::Acquire)
    }

    /// True once any claim loop of this generation marked a message.
    pub(crate) fn progressed(&self) -> bool {
        self.marked.load(Ordering::Acquire)
    }

    /// True if a claim loop of this generation ended with an error.
    pub(crate) fn failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Hands back the gate if `setup` never ran.
    pub(crate) fn take_gate(&self) -> Option<ReadyGate> {
        lock(&self.gate).take()
    }

    async fn process(
        &self,
        session: &dyn GroupSession,
        msg: &ConsumerMessage,
    ) -> Result<Verdict, ConsumerError> {
        let policy = &self.ctx.policy;
        let mut attempt = 0u32;

        let error = loop {
            attempt += 1;
            let error = match self.ctx.handler.handle(msg).await {
                Ok(()) => return Ok(Verdict::Mark),
                Err(error) => error,
            };
            self.publish(
                Event::new(EventKind::HandlerFailed)
                    .with_position(&msg.topic, msg.partition, msg.offset)
                    .with_attempt(attempt)
                    .with_reason(error.to_string()),
            );
            if !error.is_retryable() || attempt > policy.retries {
                break error;
            }
            let delay = policy.backoff.next(attempt - 1);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = session.token().cancelled() => return Ok(Verdict::Stop),
            }
        };

        match &policy.then {
            Exhausted::Skip => {
                self.publish(
                    Event::new(EventKind::MessageSkipped)
                        .with_position(&msg.topic, msg.partition, msg.offset)
                        .with_reason(error.to_string()),
                );
                Ok(Verdict::Mark)
            }
            Exhausted::DeadLetter { topic } => self.dead_letter(topic, msg).await,
            Exhausted::Halt => {
                self.publish(
                    Event::new(EventKind::ClaimHalted)
                        .with_position(&msg.topic, msg.partition, msg.offset)
                        .with_reason(error.to_string()),
                );
                Err(halted(msg, error))
            }
        }
    }

    async fn dead_letter(&self, topic: &str, msg: &ConsumerMessage) -> Result<Verdict, ConsumerError> {
        let Some(pool) = &self.ctx.dead_letter else {
            return Err(ConsumerError::DeadLetter {
                topic: topic.to_string(),
                error: "no dead-letter producer configured".to_string(),
            });
        };
        match pool.send(msg.to_message(topic)).await {
            Ok(Delivery::Committed | Delivery::Enqueued) => {
                self.publish(
                    Event::new(EventKind::MessageDeadLettered)
                        .with_topic(topic)
                        .with_partition(msg.partition)
                        .with_offset(msg.offset),
                );
                Ok(Verdict::Mark)
            }
            Ok(Delivery::Aborted { reason }) => Err(ConsumerError::DeadLetter {
                topic: topic.to_string(),
                error: format!("transaction aborted: {reason}"),
            }),
            Err(err) => Err(ConsumerError::DeadLetter {
                topic: topic.to_string(),
                error: err.to_string(),
            }),
        }
    }

    fn publish(&self, ev: Event) {
        self.ctx.bus.publish(ev.with_group(Arc::clone(&self.ctx.group)));
    }
}

fn halted(msg: &ConsumerMessage, error: HandlerError) -> ConsumerError {
    ConsumerError::Halted {
        topic: msg.topic.clone(),
        partition: msg.partition,
        offset: msg.offset,
        error,
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

#[async_trait]
impl GroupHandler for ConsumerSession {
    async fn setup(&self, session: &dyn GroupSession) -> Result<(), TransportError> {
        let claims = session.claims().to_vec();
        let count = claims.len();
        *lock(&self.claims) = claims;
        self.generation
            .store(session.generation_id(), Ordering::Release);

        if let Some(gate) = self.take_gate() {
            gate.fire();
        }
        self.publish(
            Event::new(EventKind::SessionSetup)
                .with_generation(session.generation_id())
                .with_attempt(u32::try_from(count).unwrap_or(u32::MAX)),
        );
        Ok(())
    }

    async fn cleanup(&self, session: &dyn GroupSession) -> Result<(), TransportError> {
        lock(&self.claims).clear();
        self.publish(Event::new(EventKind::SessionCleanup).with_generation(session.generation_id()));
        Ok(())
    }

    async fn consume_claim(
        &self,
        session: &dyn GroupSession,
        mut claim: Claim,
    ) -> Result<(), ConsumerError> {
        let topic = claim.topic().to_string();
        let partition = claim.partition();
        self.publish(
            Event::new(EventKind::ClaimStarted)
                .with_position(&topic, partition, claim.initial_offset()),
        );

        let token = session.token().clone();
        let mut last_marked: Option<i64> = None;
        let result = loop {
            let msg = tokio::select! {
                biased;
                _ = token.cancelled() => break Ok(()),
                next = claim.next() => match next {
                    Some(msg) => msg,
                    None => break Ok(()),
                },
            };
            match self.process(session, &msg).await {
                // the partition may belong to another member by now
                Ok(Verdict::Mark) if token.is_cancelled() => break Ok(()),
                Ok(Verdict::Mark) => {
                    session.mark_message(&msg);
                    self.marked.store(true, Ordering::Release);
                    last_marked = Some(msg.offset);
                }
                Ok(Verdict::Stop) => break Ok(()),
                Err(err) => {
                    self.failed.store(true, Ordering::Release);
                    self.ctx.report(err.clone());
                    break Err(err);
                }
            }
        };

        let mut stopped = Event::new(EventKind::ClaimStopped)
            .with_topic(topic.as_str())
            .with_partition(partition);
        if let Some(offset) = last_marked {
            stopped = stopped.with_offset(offset);
        }
        self.publish(stopped);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::{HandlerFn, ready_gate};
    use crate::policies::BackoffPolicy;
    use bytes::Bytes;
    use std::sync::atomic::AtomicU32;
    use std::time::{Duration, SystemTime};
    use tokio_util::sync::CancellationToken;

    struct FakeSession {
        token: CancellationToken,
        claims: Vec<(String, i32)>,
        marks: Mutex<Vec<i64>>,
    }

    impl FakeSession {
        fn new() -> Self {
            Self {
                token: CancellationToken::new(),
                claims: vec![("orders".to_string(), 0)],
                marks: Mutex::new(Vec::new()),
            }
        }
    }

    impl GroupSession for FakeSession {
        fn member_id(&self) -> &str {
            "m-0"
        }
        fn generation_id(&self) -> i32 {
            7
        }
        fn claims(&self) -> &[(String, i32)] {
            &self.claims
        }
        fn token(&self) -> &CancellationToken {
            &self.token
        }
        fn mark_message(&self, message: &ConsumerMessage) {
            self.marks.lock().unwrap().push(message.offset);
        }
    }

    fn message(offset: i64, value: &'static str) -> ConsumerMessage {
        ConsumerMessage {
            topic: "orders".to_string(),
            partition: 0,
            offset,
            key: Bytes::from_static(b"k"),
            value: Bytes::from_static(value.as_bytes()),
            timestamp: SystemTime::now(),
        }
    }

    fn session_with(handler: Arc<dyn MessageHandler>, policy: FailurePolicy) -> (ConsumerSession, mpsc::Receiver<ConsumerError>) {
        let (tx, rx) = mpsc::channel(16);
        let ctx = Arc::new(SessionContext {
            group: Arc::from("billing"),
            handler,
            policy,
            dead_letter: None,
            errors: tx,
            bus: Bus::new(64),
        });
        (ConsumerSession::new(ctx, ReadyGate::detached()), rx)
    }

    fn claim_of(msgs: Vec<ConsumerMessage>) -> Claim {
        let (tx, rx) = mpsc::channel(16);
        for m in msgs {
            tx.try_send(m).unwrap();
        }
        Claim::new("orders", 0, 0, rx)
    }

    #[tokio::test]
    async fn test_setup_fires_gate_and_records_claims() {
        let (gate, mut waiter) = ready_gate();
        let (tx, _rx) = mpsc::channel(16);
        let ctx = Arc::new(SessionContext {
            group: Arc::from("billing"),
            handler: HandlerFn::arc(|_m: ConsumerMessage| async { Ok::<_, HandlerError>(()) }),
            policy: FailurePolicy::default(),
            dead_letter: None,
            errors: tx,
            bus: Bus::new(8),
        });
        let cs = ConsumerSession::new(ctx, gate);
        let fake = FakeSession::new();

        cs.setup(&fake).await.unwrap();
        assert!(waiter.ready().await);
        assert_eq!(cs.claims(), vec![("orders".to_string(), 0)]);
        assert_eq!(cs.generation(), 7);
        assert!(cs.take_gate().is_none());

        cs.cleanup(&fake).await.unwrap();
        assert!(cs.claims().is_empty());
    }

    #[tokio::test]
    async fn test_marks_follow_delivery_order() {
        let (cs, _rx) = session_with(
            HandlerFn::arc(|_m: ConsumerMessage| async { Ok::<_, HandlerError>(()) }),
            FailurePolicy::default(),
        );
        let fake = FakeSession::new();
        let claim = claim_of(vec![message(0, "a"), message(1, "b"), message(2, "c")]);

        // sender dropped: the claim drains and ends
        cs.consume_claim(&fake, claim).await.unwrap();
        assert_eq!(*fake.marks.lock().unwrap(), vec![0, 1, 2]);
        assert!(cs.progressed());
        assert!(!cs.failed());
    }

    #[tokio::test]
    async fn test_retries_then_skip_marks_message() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let handler = HandlerFn::arc(move |_m: ConsumerMessage| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(HandlerError::fail("downstream unavailable"))
            }
        });
        let policy = FailurePolicy {
            retries: 2,
            backoff: BackoffPolicy::constant(Duration::from_millis(1)),
            then: Exhausted::Skip,
        };
        let (cs, _rx) = session_with(handler, policy);
        let fake = FakeSession::new();

        cs.consume_claim(&fake, claim_of(vec![message(0, "a")])).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*fake.marks.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_fatal_handler_error_halts_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let handler = HandlerFn::arc(move |m: ConsumerMessage| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                if m.offset == 1 {
                    return Err(HandlerError::fatal("poison"));
                }
                Ok(())
            }
        });
        let policy = FailurePolicy::halt_after(5, BackoffPolicy::constant(Duration::from_millis(1)));
        let (cs, mut errors) = session_with(handler, policy);
        let fake = FakeSession::new();

        let err = cs
            .consume_claim(&fake, claim_of(vec![message(0, "a"), message(1, "b"), message(2, "c")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ConsumerError::Halted { offset: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*fake.marks.lock().unwrap(), vec![0]);
        assert_eq!(errors.try_recv().unwrap(), err);
        assert!(cs.failed());
    }

    #[tokio::test]
    async fn test_dead_letter_without_pool_fails_claim() {
        let handler = HandlerFn::arc(|_m: ConsumerMessage| async { Err::<(), _>(HandlerError::fatal("bad")) });
        let policy = FailurePolicy::dead_letter("orders.dlq", 0, BackoffPolicy::default());
        let (cs, _rx) = session_with(handler, policy);
        let fake = FakeSession::new();

        let err = cs.consume_claim(&fake, claim_of(vec![message(0, "a")])).await.unwrap_err();
        assert_eq!(err.as_label(), "consumer_dead_letter");
        assert!(fake.marks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_stops_claim() {
        let (cs, _rx) = session_with(
            HandlerFn::arc(|_m: ConsumerMessage| async { Ok::<_, HandlerError>(()) }),
            FailurePolicy::default(),
        );
        let fake = FakeSession::new();
        let (_tx, rx) = mpsc::channel(1);
        fake.token.cancel();

        cs.consume_claim(&fake, Claim::new("orders", 0, 0, rx)).await.unwrap();
        assert!(fake.marks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_mark_after_generation_ends_mid_handler() {
        let fake = Arc::new(FakeSession::new());
        let token = fake.token.clone();
        let handler = HandlerFn::arc(move |_m: ConsumerMessage| {
            let token = token.clone();
            async move {
                // rebalance while the handler is still running
                token.cancel();
                Ok::<_, HandlerError>(())
            }
        });
        let (cs, _rx) = session_with(handler, FailurePolicy::default());

        cs.consume_claim(fake.as_ref(), claim_of(vec![message(0, "a"), message(1, "b")]))
            .await
            .unwrap();
        assert!(fake.marks.lock().unwrap().is_empty());
        assert!(!cs.progressed());
    }

    #[tokio::test]
    async fn test_full_error_sink_publishes_overflow() {
        let (tx, mut rx) = mpsc::channel(1);
        let bus = Bus::new(8);
        let mut events = bus.subscribe();
        let ctx = SessionContext {
            group: Arc::from("billing"),
            handler: HandlerFn::arc(|_m: ConsumerMessage| async { Ok::<_, HandlerError>(()) }),
            policy: FailurePolicy::default(),
            dead_letter: None,
            errors: tx,
            bus,
        };

        ctx.report(ConsumerError::Canceled);
        ctx.report(ConsumerError::Closed);

        let ev = events.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::ErrorSinkOverflow);
        assert_eq!(ev.group.as_deref(), Some("billing"));
        assert_eq!(rx.try_recv().unwrap(), ConsumerError::Canceled);
        assert!(rx.try_recv().is_err());
    }
}
