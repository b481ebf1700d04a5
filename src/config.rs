//! # Runtime configuration.
//!
//! [`Config`] bundles the broker list, the event bus capacity and the settings of
//! both sides of the pipeline:
//! - [`ProducerConfig`] transactional producer sessions and pool recovery limits;
//! - [`ConsumerConfig`] consumer group identity and handler failure policy.
//!
//! ## Sentinel values
//! - `max_factory_attempts = 0` → borrow retries handle construction forever
//! - `max_abort_failures = 0` → abort failures are retried forever
//! - `channel_capacity = 0` → clamped to 1

use std::time::Duration;

use crate::policies::{BackoffPolicy, FailurePolicy};

/// Acknowledgement level requested from the broker for produced records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Acks {
    /// Fire and forget.
    None,
    /// Leader only.
    Leader,
    /// Every in-sync replica.
    #[default]
    All,
}

/// How records without an explicit partition are spread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Partitioner {
    /// Cycle through partitions.
    #[default]
    RoundRobin,
    /// Same key, same partition.
    Hash,
}

/// Where a group starts reading a partition that has no committed offset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InitialOffset {
    /// Only records produced after the claim started.
    #[default]
    Newest,
    /// From the beginning of the log.
    Oldest,
}

/// Producer-side settings.
///
/// The transport-facing fields (`idempotent`, `acks`, `partitioner`,
/// `txn_retry_backoff`, `max_open_requests`) are forwarded verbatim in
/// [`ProducerSettings`](crate::transport::ProducerSettings); the rest drive the
/// pool and the transaction executor.
#[derive(Clone, Debug)]
pub struct ProducerConfig {
    /// Base transactional id. Each handle gets `<base>-<n>`; empty disables transactions.
    pub transactional_id: String,
    /// Request idempotent delivery.
    pub idempotent: bool,
    /// Acknowledgement level.
    pub acks: Acks,
    /// Partitioning strategy for records.
    pub partitioner: Partitioner,
    /// Backoff the transport applies between its own transaction-coordinator retries.
    pub txn_retry_backoff: Duration,
    /// In-flight requests per connection (`1` keeps ordering under retries).
    pub max_open_requests: u32,
    /// Net commit attempts allowed during recovery after a failed commit.
    pub max_commit_retries: u32,
    /// Failed aborts tolerated during one recovery (`0` = unbounded).
    pub max_abort_failures: u32,
    /// Handle construction attempts per borrow (`0` = unbounded).
    pub max_factory_attempts: u32,
    /// Delay between failed handle constructions.
    pub factory_backoff: BackoffPolicy,
}

impl ProducerConfig {
    /// Returns the abort failure cap as an `Option` (`None` = unbounded).
    #[inline]
    pub fn abort_failure_limit(&self) -> Option<u32> {
        (self.max_abort_failures != 0).then_some(self.max_abort_failures)
    }

    /// Returns the construction attempt cap as an `Option` (`None` = unbounded).
    #[inline]
    pub fn factory_attempt_limit(&self) -> Option<u32> {
        (self.max_factory_attempts != 0).then_some(self.max_factory_attempts)
    }

    /// True when handles run transactions.
    #[inline]
    pub fn is_transactional(&self) -> bool {
        !self.transactional_id.is_empty()
    }
}

impl Default for ProducerConfig {
    /// Idempotent, `acks = all`, round-robin, 10ms coordinator backoff,
    /// transactional id `txn_producer`, one open request, 3 commit retries,
    /// 16 tolerated abort failures, 5 construction attempts per borrow.
    fn default() -> Self {
        Self {
            transactional_id: "txn_producer".to_string(),
            idempotent: true,
            acks: Acks::All,
            partitioner: Partitioner::RoundRobin,
            txn_retry_backoff: Duration::from_millis(10),
            max_open_requests: 1,
            max_commit_retries: 3,
            max_abort_failures: 16,
            max_factory_attempts: 5,
            factory_backoff: BackoffPolicy::default(),
        }
    }
}

/// Consumer-side settings.
#[derive(Clone, Debug)]
pub struct ConsumerConfig {
    /// Consumer group id.
    pub group_id: String,
    /// Start position for partitions without a committed offset.
    pub initial_offset: InitialOffset,
    /// Handler failure policy.
    pub on_failure: FailurePolicy,
    /// Per-claim message buffer between the transport and the claim loop.
    pub channel_capacity: usize,
    /// Errors buffered for [`ConsumerGroup::errors`](crate::ConsumerGroup::errors) (min 1).
    pub error_capacity: usize,
}

impl ConsumerConfig {
    /// Config for `group_id` with every other field defaulted.
    pub fn for_group(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            ..Self::default()
        }
    }

    /// Channel capacity clamped to a minimum of 1.
    #[inline]
    pub fn channel_capacity_clamped(&self) -> usize {
        self.channel_capacity.max(1)
    }

    /// Error sink capacity clamped to a minimum of 1.
    #[inline]
    pub fn error_capacity_clamped(&self) -> usize {
        self.error_capacity.max(1)
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group_id: "txvisor".to_string(),
            initial_offset: InitialOffset::Newest,
            on_failure: FailurePolicy::default(),
            channel_capacity: 256,
            error_capacity: 64,
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Bootstrap brokers handed to the transport.
    pub brokers: Vec<String>,
    /// Capacity of the event bus ring buffer (min 1).
    pub bus_capacity: usize,
    /// Producer settings.
    pub producer: ProducerConfig,
    /// Consumer settings.
    pub consumer: ConsumerConfig,
}

impl Config {
    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            brokers: vec!["127.0.0.1:9092".to_string()],
            bus_capacity: 1024,
            producer: ProducerConfig::default(),
            consumer: ConsumerConfig::default(),
        }
    }
}
