//! # Transport contract consumed by the pool and the consumer group.
//!
//! The broker client is an external collaborator. This module only defines the
//! capabilities the crate needs from it:
//!
//! ```text
//! Transport ──► new_producer(settings) ──► ProducerSession
//!           │                               begin_txn / send / commit_txn / abort_txn
//!           │                               txn_status / close
//!           └─► new_group(brokers, cfg) ──► GroupClient
//!                                           consume(token, topics, handler)   (one generation)
//!                                           close
//!
//! per generation, the group client drives the handler:
//!   handler.setup(session) ─► handler.consume_claim(session, claim) × partitions ─► handler.cleanup(session)
//! ```
//!
//! [`memory::MemoryBroker`] implements the whole contract in-process.

pub mod memory;
mod message;
mod status;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{Acks, ConsumerConfig, Partitioner, ProducerConfig};
use crate::error::{ConsumerError, TransportError};

pub use message::{ConsumerMessage, Message};
pub use status::TxnStatus;

/// Everything a transport needs to open one producer session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProducerSettings {
    pub brokers: Vec<String>,
    /// Unique transactional identity of this session (`None` = non-transactional).
    pub transactional_id: Option<String>,
    pub idempotent: bool,
    pub acks: Acks,
    pub partitioner: Partitioner,
    pub txn_retry_backoff: Duration,
    pub max_open_requests: u32,
}

impl ProducerSettings {
    /// Settings for one session; `transactional_id` already carries its unique suffix.
    pub fn from_config(
        brokers: &[String],
        cfg: &ProducerConfig,
        transactional_id: Option<String>,
    ) -> Self {
        Self {
            brokers: brokers.to_vec(),
            transactional_id,
            idempotent: cfg.idempotent,
            acks: cfg.acks,
            partitioner: cfg.partitioner,
            txn_retry_backoff: cfg.txn_retry_backoff,
            max_open_requests: cfg.max_open_requests,
        }
    }
}

/// Factory for broker sessions.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opens a producer session.
    async fn new_producer(
        &self,
        settings: &ProducerSettings,
    ) -> Result<Box<dyn ProducerSession>, TransportError>;

    /// Creates a consumer group client.
    async fn new_group(
        &self,
        brokers: &[String],
        cfg: &ConsumerConfig,
    ) -> Result<Arc<dyn GroupClient>, TransportError>;
}

/// One transactional producer session.
///
/// Owned by exactly one [`ProducerHandle`](crate::ProducerHandle), hence `&mut self`.
#[async_trait]
pub trait ProducerSession: Send + Sync {
    async fn begin_txn(&mut self) -> Result<(), TransportError>;

    async fn commit_txn(&mut self) -> Result<(), TransportError>;

    async fn abort_txn(&mut self) -> Result<(), TransportError>;

    /// Current transaction flags.
    fn txn_status(&self) -> TxnStatus;

    /// Enqueues a record on the async input sink (fire-and-forget).
    fn send(&mut self, message: Message) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Consumer group membership client.
#[async_trait]
pub trait GroupClient: Send + Sync {
    /// Joins the group and runs one generation.
    ///
    /// Blocks until the generation ends (rebalance, claim error, `token`
    /// cancellation or [`close`](GroupClient::close)). Returns `Ok(())` when the
    /// generation ended normally; call again to join the next one.
    async fn consume(
        &self,
        token: &CancellationToken,
        topics: &[String],
        handler: Arc<dyn GroupHandler>,
    ) -> Result<(), TransportError>;

    /// Leaves the group; a running `consume` returns.
    async fn close(&self) -> Result<(), TransportError>;
}

/// One generation of group membership, as seen by the handler.
pub trait GroupSession: Send + Sync {
    fn member_id(&self) -> &str;

    fn generation_id(&self) -> i32;

    /// `(topic, partition)` pairs assigned to this member for the generation.
    fn claims(&self) -> &[(String, i32)];

    /// Cancelled when the generation ends.
    fn token(&self) -> &CancellationToken;

    /// Marks `message` as processed; the next generation resumes after it.
    fn mark_message(&self, message: &ConsumerMessage);
}

/// Callbacks the group client invokes for every generation.
#[async_trait]
pub trait GroupHandler: Send + Sync + 'static {
    /// Runs once per generation before any claim is dispatched.
    async fn setup(&self, session: &dyn GroupSession) -> Result<(), TransportError>;

    /// Runs once per generation after every claim loop returned.
    async fn cleanup(&self, session: &dyn GroupSession) -> Result<(), TransportError>;

    /// Consumes one partition until the generation ends. An error ends the generation.
    async fn consume_claim(
        &self,
        session: &dyn GroupSession,
        claim: Claim,
    ) -> Result<(), ConsumerError>;
}

/// A topic-partition assigned to this member for one generation.
///
/// `next()` yields messages lazily and returns `None` once the transport
/// stopped feeding the claim.
#[derive(Debug)]
pub struct Claim {
    topic: String,
    partition: i32,
    initial_offset: i64,
    messages: mpsc::Receiver<ConsumerMessage>,
}

impl Claim {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        initial_offset: i64,
        messages: mpsc::Receiver<ConsumerMessage>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            initial_offset,
            messages,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Offset the claim started reading from.
    pub fn initial_offset(&self) -> i64 {
        self.initial_offset
    }

    /// Next delivered message, or `None` when the claim is drained.
    pub async fn next(&mut self) -> Option<ConsumerMessage> {
        self.messages.recv().await
    }
}
