//! Error types used by the producer pool, the transaction executor and the consumer group.
//!
//! - [`TransportError`] failures reported by the broker transport.
//! - [`PoolError`] the pool could not hand out a producer handle.
//! - [`ProduceError`] terminal outcome of a failed transactional send.
//! - [`HandlerError`] returned by user message handlers.
//! - [`ConsumerError`] terminal outcome of the consumer group runner.
//!
//! Every type provides `as_label` (stable snake_case label for logs/metrics).
//! Retry counters and transaction flags stay internal; only these outcomes cross the API.

use thiserror::Error;

/// # Errors reported by the broker transport.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Broker connection or session construction failed.
    #[error("connect failed: {error}")]
    Connect {
        /// The underlying error message.
        error: String,
    },

    /// A transaction operation (begin/commit/abort) was rejected.
    #[error("transaction failed: {error}")]
    Txn {
        /// The underlying error message.
        error: String,
    },

    /// The async input sink refused the record.
    #[error("enqueue failed: {error}")]
    Enqueue {
        /// The underlying error message.
        error: String,
    },

    /// Group membership operation failed (join, sync, fetch, offset commit).
    #[error("group failure: {error}")]
    Group {
        /// The underlying error message.
        error: String,
    },

    /// The client or session was already closed.
    #[error("client closed")]
    Closed,
}

impl TransportError {
    /// Shorthand for [`TransportError::Connect`].
    pub fn connect(error: impl Into<String>) -> Self {
        Self::Connect {
            error: error.into(),
        }
    }

    /// Shorthand for [`TransportError::Txn`].
    pub fn txn(error: impl Into<String>) -> Self {
        Self::Txn {
            error: error.into(),
        }
    }

    /// Shorthand for [`TransportError::Enqueue`].
    pub fn enqueue(error: impl Into<String>) -> Self {
        Self::Enqueue {
            error: error.into(),
        }
    }

    /// Shorthand for [`TransportError::Group`].
    pub fn group(error: impl Into<String>) -> Self {
        Self::Group {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Connect { .. } => "transport_connect",
            TransportError::Txn { .. } => "transport_txn",
            TransportError::Enqueue { .. } => "transport_enqueue",
            TransportError::Group { .. } => "transport_group",
            TransportError::Closed => "transport_closed",
        }
    }

    /// Connection and group failures may clear up on their own; a closed client never does.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Closed)
    }
}

/// # The pool could not produce a handle.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Handle construction kept failing until the configured attempt cap was reached.
    #[error("producer factory failed {attempts} times; last error: {error}")]
    Exhausted {
        /// Number of construction attempts made.
        attempts: u32,
        /// The last construction error.
        error: TransportError,
    },
}

impl PoolError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PoolError::Exhausted { .. } => "pool_exhausted",
        }
    }
}

/// # Terminal outcome of a failed transactional send.
///
/// A send that ends in a clean abort is **not** an error: it is reported as
/// [`Delivery::Aborted`](crate::Delivery::Aborted).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProduceError {
    /// No handle could be borrowed.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// `begin_txn` failed; no transaction was opened and the handle is reusable.
    #[error("unable to start txn: {error}")]
    Begin {
        /// The transport error.
        error: TransportError,
    },

    /// The record could not be enqueued; the transaction was aborted best-effort.
    #[error("unable to enqueue record: {error}")]
    Enqueue {
        /// The transport error.
        error: TransportError,
    },

    /// The transport reported a fatal transaction state; the handle must be recreated.
    #[error("producer is in a fatal state after {attempt} attempt(s), need to recreate it")]
    Fatal {
        /// Commit calls made before the fatal flag was observed.
        attempt: u32,
    },

    /// The commit retry budget ran out.
    #[error("commit failed after {attempts} attempt(s): {error}")]
    RetriesExhausted {
        /// Net commit attempts made during recovery.
        attempts: u32,
        /// The last observed error.
        error: TransportError,
    },
}

impl ProduceError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProduceError::Pool(_) => "produce_pool",
            ProduceError::Begin { .. } => "produce_begin",
            ProduceError::Enqueue { .. } => "produce_enqueue",
            ProduceError::Fatal { .. } => "produce_fatal",
            ProduceError::RetriesExhausted { .. } => "produce_retries_exhausted",
        }
    }

    /// True when the producer handle involved must be replaced.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProduceError::Fatal { .. })
    }

    /// Indicates whether a fresh `send` of the same message may succeed.
    ///
    /// # Example
    /// ```
    /// use txvisor::{ProduceError, TransportError};
    ///
    /// let begin = ProduceError::Begin { error: TransportError::txn("coordinator loading") };
    /// assert!(begin.is_retryable());
    ///
    /// let fatal = ProduceError::Fatal { attempt: 1 };
    /// assert!(!fatal.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        !self.is_fatal()
    }
}

/// # Errors returned by message handlers.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Processing failed but may succeed if retried.
    #[error("handler failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Processing can never succeed for this message; retries are skipped.
    #[error("handler failed permanently: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        Self::Fail {
            error: error.into(),
        }
    }

    /// Shorthand for [`HandlerError::Fatal`].
    pub fn fatal(error: impl Into<String>) -> Self {
        Self::Fatal {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Fail { .. } => "handler_failed",
            HandlerError::Fatal { .. } => "handler_fatal",
        }
    }

    /// `Fail` is retried according to the failure policy, `Fatal` never is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Fail { .. })
    }
}

/// # Errors produced by the consumer group runner.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    /// The transport failed while creating or driving the group.
    #[error("error from consumer: {0}")]
    Transport(#[from] TransportError),

    /// A handler failure halted a claim loop.
    #[error("claim {topic}/{partition} halted at offset {offset}: {error}")]
    Halted {
        /// Topic of the failing message.
        topic: String,
        /// Partition of the failing message.
        partition: i32,
        /// Offset of the failing message (not marked).
        offset: i64,
        /// The handler error.
        error: HandlerError,
    },

    /// Dead-lettering a failed message did not succeed.
    #[error("dead-letter publish to {topic} failed: {error}")]
    DeadLetter {
        /// Dead-letter topic.
        topic: String,
        /// The produce error message.
        error: String,
    },

    /// The group is closed.
    #[error("consumer group closed")]
    Closed,

    /// The subscription was cancelled before the first session became ready.
    #[error("subscription cancelled")]
    Canceled,

    /// `subscribe` was called on a group that is already running.
    #[error("consumer group already subscribed")]
    AlreadySubscribed,
}

impl ConsumerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConsumerError::Transport(_) => "consumer_transport",
            ConsumerError::Halted { .. } => "consumer_halted",
            ConsumerError::DeadLetter { .. } => "consumer_dead_letter",
            ConsumerError::Closed => "consumer_closed",
            ConsumerError::Canceled => "consumer_canceled",
            ConsumerError::AlreadySubscribed => "consumer_already_subscribed",
        }
    }
}
