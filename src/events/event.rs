//! # Runtime events emitted by the producer and consumer sides.
//!
//! [`EventKind`] classifies events into four groups:
//! - **Pool**: handle construction, backoff and discard
//! - **Transactions**: per-send begin/commit/abort outcomes
//! - **Consumer**: generations, claims and handler failures
//! - **Subscribers**: overflow and panics of event subscribers
//!
//! [`Event`] carries the metadata (handle, topic/partition/offset, attempt, delay, reason).
//!
//! ## Ordering
//! Every event gets a process-wide monotonic `seq`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use txvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::BorrowBackoff)
//!     .with_handle("txn_producer-3")
//!     .with_attempt(2)
//!     .with_delay(Duration::from_millis(100))
//!     .with_reason("connection refused");
//!
//! assert_eq!(ev.kind, EventKind::BorrowBackoff);
//! assert_eq!(ev.handle.as_deref(), Some("txn_producer-3"));
//! assert_eq!(ev.delay_ms, Some(100));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Pool ===
    /// A new producer handle was opened.
    ///
    /// Sets: `handle`, `attempt` (construction attempt within the borrow)
    HandleCreated,

    /// Handle construction failed.
    ///
    /// Sets: `handle`, `attempt`, `reason`
    HandleFactoryFailed,

    /// Borrow sleeps before the next construction attempt.
    ///
    /// Sets: `attempt`, `delay_ms`, `reason` (last construction error)
    BorrowBackoff,

    /// A released handle was closed instead of returning to the pool.
    ///
    /// Sets: `handle`, `reason` (state or flags that caused the discard)
    HandleDiscarded,

    /// `clear()` closed every idle handle.
    ///
    /// Sets: `attempt` (number of handles closed)
    PoolCleared,

    // === Transactions ===
    /// `begin_txn` failed; nothing was sent.
    ///
    /// Sets: `handle`, `topic`, `reason`
    TxnBeginFailed,

    /// The transaction carrying the message committed.
    ///
    /// Sets: `handle`, `topic`, `attempt` (commit calls made)
    TxnCommitted,

    /// A commit call failed.
    ///
    /// Sets: `handle`, `topic`, `attempt` (recovery attempt, 0 = initial commit), `reason`
    TxnCommitFailed,

    /// The transaction was aborted; the message was not delivered.
    ///
    /// Sets: `handle`, `topic`, `reason` (commit failure that led to the abort)
    TxnAborted,

    /// An abort call failed (does not consume commit retry budget).
    ///
    /// Sets: `handle`, `topic`, `reason`
    TxnAbortFailed,

    /// The transport reported a fatal transaction state.
    ///
    /// Sets: `handle`, `topic`, `attempt`
    TxnFatal,

    /// The commit retry budget ran out.
    ///
    /// Sets: `handle`, `topic`, `attempt`, `reason`
    TxnRetriesExhausted,

    // === Consumer ===
    /// A generation started; the readiness gate fired.
    ///
    /// Sets: `group`, `generation`, `attempt` (number of claims)
    SessionSetup,

    /// A generation finished.
    ///
    /// Sets: `group`, `generation`
    SessionCleanup,

    /// A claim loop started.
    ///
    /// Sets: `group`, `topic`, `partition`, `offset` (initial offset)
    ClaimStarted,

    /// A claim loop stopped.
    ///
    /// Sets: `group`, `topic`, `partition`, `offset` (last marked, if any)
    ClaimStopped,

    /// The message handler returned an error.
    ///
    /// Sets: `group`, `topic`, `partition`, `offset`, `attempt`, `reason`
    HandlerFailed,

    /// A failing message was marked without successful handling.
    ///
    /// Sets: `group`, `topic`, `partition`, `offset`, `reason`
    MessageSkipped,

    /// A failing message was routed to the dead-letter topic.
    ///
    /// Sets: `group`, `topic` (dead-letter topic), `partition`, `offset`
    MessageDeadLettered,

    /// A claim loop stopped on a failing message, leaving it unmarked.
    ///
    /// Sets: `group`, `topic`, `partition`, `offset`, `reason`
    ClaimHalted,

    /// A generation ended on a claim error; the supervisor waits before rejoining.
    ///
    /// Sets: `group`, `attempt` (consecutive failed generations), `delay_ms`, `reason`
    RejoinBackoff,

    /// The error sink was full; the error was dropped.
    ///
    /// Sets: `group`, `reason` (the dropped error)
    ErrorSinkOverflow,

    /// The group client failed; the supervisor loop exits.
    ///
    /// Sets: `group`, `reason`
    GroupConsumeFailed,

    /// The group was closed.
    ///
    /// Sets: `group`, `reason` (close error, if any)
    GroupClosed,

    // === Subscribers ===
    /// A subscriber queue was full or closed; the event was dropped for it.
    ///
    /// Sets: `handle` (subscriber name), `reason`
    SubscriberOverflow,

    /// A subscriber panicked while handling an event.
    ///
    /// Sets: `handle` (subscriber name), `reason`
    SubscriberPanicked,
}

/// Runtime event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Process-wide monotonic sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    pub kind: EventKind,

    /// Transactional id of the producer handle (or subscriber name).
    pub handle: Option<Arc<str>>,
    /// Consumer group id.
    pub group: Option<Arc<str>>,
    pub topic: Option<Arc<str>>,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
    pub generation: Option<i32>,
    pub attempt: Option<u32>,
    /// Backoff delay in milliseconds.
    pub delay_ms: Option<u32>,
    /// Human-readable reason (errors, discard causes).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates an event with the current timestamp and the next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            handle: None,
            group: None,
            topic: None,
            partition: None,
            offset: None,
            generation: None,
            attempt: None,
            delay_ms: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_handle(mut self, handle: impl Into<Arc<str>>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    #[inline]
    pub fn with_group(mut self, group: impl Into<Arc<str>>) -> Self {
        self.group = Some(group.into());
        self
    }

    #[inline]
    pub fn with_topic(mut self, topic: impl Into<Arc<str>>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Attaches topic, partition and offset at once.
    #[inline]
    pub fn with_position(mut self, topic: &str, partition: i32, offset: i64) -> Self {
        self.topic = Some(topic.into());
        self.partition = Some(partition);
        self.offset = Some(offset);
        self
    }

    #[inline]
    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }

    #[inline]
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[inline]
    pub fn with_generation(mut self, generation: i32) -> Self {
        self.generation = Some(generation);
        self
    }

    #[inline]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Attaches a delay (stored as milliseconds, saturating).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(d.as_millis().min(u128::from(u32::MAX)) as u32);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Subscriber overflow event.
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_handle(subscriber)
            .with_reason(reason)
    }

    /// Subscriber panic event.
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_handle(subscriber)
            .with_reason(info)
    }

    /// True for events that describe a failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self.kind,
            EventKind::HandleFactoryFailed
                | EventKind::TxnBeginFailed
                | EventKind::TxnCommitFailed
                | EventKind::TxnAbortFailed
                | EventKind::TxnFatal
                | EventKind::TxnRetriesExhausted
                | EventKind::HandlerFailed
                | EventKind::ClaimHalted
                | EventKind::GroupConsumeFailed
                | EventKind::ErrorSinkOverflow
                | EventKind::SubscriberOverflow
                | EventKind::SubscriberPanicked
        )
    }
}
