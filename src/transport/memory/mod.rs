//! # In-process transport.
//!
//! [`MemoryBroker`] implements [`Transport`] without a network: partitioned
//! in-memory logs, transactional staging (records become visible on commit),
//! consumer groups with generations and committed offsets. It backs the crate's
//! tests and the demos, and is handy for testing code built on top of the crate.
//!
//! Failures are injected through [`MemoryBroker::faults`]; call counters are
//! available from [`MemoryBroker::stats`].
//!
//! ## Groups
//! Every `consume` call joins one generation. A member joining or leaving, or an
//! explicit [`MemoryBroker::rebalance`], ends the running generation of every
//! member. Partitions are spread over members sorted by member id
//! (`partition % members`).

mod faults;
mod group;
mod producer;

use std::collections::{BTreeMap, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::{ConsumerConfig, InitialOffset, Partitioner};
use crate::error::TransportError;
use crate::transport::{
    ConsumerMessage, GroupClient, Message, ProducerSession, ProducerSettings, Transport,
};

pub use faults::{FaultScript, Stats};

use faults::Counters;
use group::MemoryGroupClient;
use producer::MemoryProducer;

#[derive(Clone)]
struct StoredRecord {
    key: Bytes,
    value: Bytes,
    timestamp: SystemTime,
}

#[derive(Default)]
struct GroupState {
    generation: i32,
    /// Member id → token of the member's running generation.
    members: BTreeMap<String, CancellationToken>,
    /// Next offset to read per `(topic, partition)`.
    offsets: HashMap<(String, i32), i64>,
    marks: Vec<(String, i32, i64)>,
}

impl GroupState {
    fn end_generation(&mut self) {
        self.generation += 1;
        for token in self.members.values() {
            token.cancel();
        }
    }
}

struct State {
    default_partitions: usize,
    topics: HashMap<String, Vec<Vec<StoredRecord>>>,
    round_robin: HashMap<String, usize>,
    groups: HashMap<String, GroupState>,
    transactional_ids: Vec<String>,
}

pub(crate) struct Shared {
    state: Mutex<State>,
    appended: Notify,
    faults: FaultScript,
    counters: Counters,
    setup_delay: Mutex<Duration>,
    next_member: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn setup_delay(&self) -> Duration {
        *self.setup_delay.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Appends a batch atomically and wakes claim feeders.
    fn append(&self, messages: Vec<Message>, partitioner: Partitioner) {
        if messages.is_empty() {
            return;
        }
        {
            let mut state = self.lock();
            let now = SystemTime::now();
            for msg in messages {
                let count = state.default_partitions;
                let partitions = state.topics.entry(msg.topic.clone()).or_insert_with(|| vec![Vec::new(); count]);
                let n = partitions.len().max(1);
                let idx = match partitioner {
                    Partitioner::Hash => {
                        let mut h = DefaultHasher::new();
                        msg.key.hash(&mut h);
                        (h.finish() % n as u64) as usize
                    }
                    Partitioner::RoundRobin => {
                        let cursor = state.round_robin.entry(msg.topic.clone()).or_insert(0);
                        let idx = *cursor % n;
                        *cursor += 1;
                        idx
                    }
                };
                if let Some(log) = state.topics.get_mut(&msg.topic).and_then(|p| p.get_mut(idx)) {
                    log.push(StoredRecord {
                        key: msg.key,
                        value: msg.value,
                        timestamp: now,
                    });
                }
            }
        }
        self.appended.notify_waiters();
    }

    /// Committed records of `topic/partition` starting at `from`.
    fn read(&self, topic: &str, partition: i32, from: i64) -> Vec<ConsumerMessage> {
        let state = self.lock();
        let Some(log) = state
            .topics
            .get(topic)
            .and_then(|p| p.get(usize::try_from(partition).ok()?))
        else {
            return Vec::new();
        };
        let start = usize::try_from(from.max(0)).unwrap_or(usize::MAX);
        log.iter()
            .enumerate()
            .skip(start)
            .map(|(offset, rec)| ConsumerMessage {
                topic: topic.to_string(),
                partition,
                offset: offset as i64,
                key: rec.key.clone(),
                value: rec.value.clone(),
                timestamp: rec.timestamp,
            })
            .collect()
    }

    /// Registers `member` for a new generation and returns its id and assignment.
    fn join(
        &self,
        group_id: &str,
        member_id: &str,
        topics: &[String],
        token: CancellationToken,
    ) -> (i32, Vec<(String, i32)>) {
        let mut state = self.lock();
        let default_partitions = state.default_partitions;
        for topic in topics {
            state
                .topics
                .entry(topic.clone())
                .or_insert_with(|| vec![Vec::new(); default_partitions]);
        }
        let partition_counts: Vec<(String, usize)> = topics
            .iter()
            .map(|t| (t.clone(), state.topics.get(t).map_or(0, Vec::len)))
            .collect();

        let group = state.groups.entry(group_id.to_string()).or_default();
        if !group.members.contains_key(member_id) {
            group.end_generation();
        }
        group.members.insert(member_id.to_string(), token);

        let members: Vec<&String> = group.members.keys().collect();
        let slot = members.iter().position(|m| m.as_str() == member_id).unwrap_or(0);
        let mut claims = Vec::new();
        for (topic, count) in partition_counts {
            for p in 0..count {
                if p % members.len() == slot {
                    claims.push((topic.clone(), p as i32));
                }
            }
        }
        (group.generation, claims)
    }

    fn leave(&self, group_id: &str, member_id: &str) {
        let mut state = self.lock();
        if let Some(group) = state.groups.get_mut(group_id) {
            if group.members.remove(member_id).is_some() {
                group.end_generation();
            }
        }
    }

    fn start_offset(&self, group_id: &str, topic: &str, partition: i32, initial: InitialOffset) -> i64 {
        let state = self.lock();
        let committed = state
            .groups
            .get(group_id)
            .and_then(|g| g.offsets.get(&(topic.to_string(), partition)))
            .copied();
        committed.unwrap_or_else(|| match initial {
            InitialOffset::Oldest => 0,
            InitialOffset::Newest => state
                .topics
                .get(topic)
                .and_then(|p| p.get(partition as usize))
                .map_or(0, |log| log.len() as i64),
        })
    }

    fn mark(&self, group_id: &str, message: &ConsumerMessage) {
        let mut state = self.lock();
        let group = state.groups.entry(group_id.to_string()).or_default();
        let committed = group
            .offsets
            .entry((message.topic.clone(), message.partition))
            .or_insert(0);
        // a late mark from a previous owner never moves the offset back
        *committed = (*committed).max(message.offset + 1);
        group
            .marks
            .push((message.topic.clone(), message.partition, message.offset));
    }
}

/// In-process broker implementing [`Transport`].
#[derive(Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// A broker whose auto-created topics have one partition.
    pub fn new() -> Self {
        Self::with_partitions(1)
    }

    /// A broker whose auto-created topics have `partitions` partitions (min 1).
    pub fn with_partitions(partitions: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    default_partitions: partitions.max(1),
                    topics: HashMap::new(),
                    round_robin: HashMap::new(),
                    groups: HashMap::new(),
                    transactional_ids: Vec::new(),
                }),
                appended: Notify::new(),
                faults: FaultScript::default(),
                counters: Counters::default(),
                setup_delay: Mutex::new(Duration::ZERO),
                next_member: AtomicU64::new(0),
            }),
        }
    }

    /// Creates `topic` with `partitions` partitions; no-op if it exists.
    pub fn create_topic(&self, topic: &str, partitions: usize) {
        self.shared
            .lock()
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions.max(1)]);
    }

    pub fn partition_count(&self, topic: &str) -> usize {
        self.shared.lock().topics.get(topic).map_or(0, Vec::len)
    }

    /// Committed records of one partition.
    pub fn records(&self, topic: &str, partition: i32) -> Vec<ConsumerMessage> {
        self.shared.read(topic, partition, 0)
    }

    /// Appends outside of any transaction.
    pub fn append(&self, message: Message) {
        self.shared.append(vec![message], Partitioner::RoundRobin);
    }

    /// Next offset `group` will read from `topic/partition`, if it marked anything.
    pub fn committed_offset(&self, group: &str, topic: &str, partition: i32) -> Option<i64> {
        self.shared
            .lock()
            .groups
            .get(group)
            .and_then(|g| g.offsets.get(&(topic.to_string(), partition)))
            .copied()
    }

    /// Every `(topic, partition, offset)` marked by `group`, in mark order.
    pub fn marks(&self, group: &str) -> Vec<(String, i32, i64)> {
        self.shared
            .lock()
            .groups
            .get(group)
            .map(|g| g.marks.clone())
            .unwrap_or_default()
    }

    /// Current generation of `group` (0 if it never formed).
    pub fn generation(&self, group: &str) -> i32 {
        self.shared.lock().groups.get(group).map_or(0, |g| g.generation)
    }

    /// Ends the running generation of every member of `group`.
    pub fn rebalance(&self, group: &str) {
        if let Some(g) = self.shared.lock().groups.get_mut(group) {
            g.end_generation();
        }
    }

    /// Delay inserted between joining a generation and calling the handler's `setup`.
    pub fn set_setup_delay(&self, delay: Duration) {
        *self.shared.setup_delay.lock().unwrap_or_else(|p| p.into_inner()) = delay;
    }

    pub fn faults(&self) -> &FaultScript {
        &self.shared.faults
    }

    pub fn stats(&self) -> Stats {
        let ids = self.shared.lock().transactional_ids.clone();
        self.shared.counters.snapshot(ids)
    }
}

#[async_trait]
impl Transport for MemoryBroker {
    async fn new_producer(
        &self,
        settings: &ProducerSettings,
    ) -> Result<Box<dyn ProducerSession>, TransportError> {
        Counters::bump(&self.shared.counters.connects);
        if settings.brokers.is_empty() {
            return Err(TransportError::connect("no brokers configured"));
        }
        if let Some(err) = self.shared.faults.take_connect() {
            return Err(err);
        }
        if let Some(id) = &settings.transactional_id {
            self.shared.lock().transactional_ids.push(id.clone());
        }
        Ok(Box::new(MemoryProducer::new(
            Arc::clone(&self.shared),
            settings.transactional_id.clone(),
            settings.partitioner,
        )))
    }

    async fn new_group(
        &self,
        brokers: &[String],
        cfg: &ConsumerConfig,
    ) -> Result<Arc<dyn GroupClient>, TransportError> {
        if brokers.is_empty() {
            return Err(TransportError::connect("no brokers configured"));
        }
        let n = self.shared.next_member.fetch_add(1, Ordering::Relaxed);
        let member_id = format!("{}-member-{n}", cfg.group_id);
        Ok(Arc::new(MemoryGroupClient::new(
            Arc::clone(&self.shared),
            cfg.clone(),
            member_id,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProducerConfig;

    fn settings(txn: Option<&str>) -> ProducerSettings {
        ProducerSettings::from_config(
            &["mem:9092".to_string()],
            &ProducerConfig::default(),
            txn.map(str::to_string),
        )
    }

    fn msg(v: &'static str) -> Message {
        Message::new("t", Bytes::from_static(b"k"), Bytes::from_static(v.as_bytes()))
    }

    #[tokio::test]
    async fn test_staged_records_visible_only_after_commit() {
        let broker = MemoryBroker::new();
        let mut p = broker.new_producer(&settings(Some("tx-0"))).await.unwrap();

        p.begin_txn().await.unwrap();
        p.send(msg("a")).unwrap();
        assert!(broker.records("t", 0).is_empty());
        p.commit_txn().await.unwrap();
        assert_eq!(broker.records("t", 0).len(), 1);

        p.begin_txn().await.unwrap();
        p.send(msg("b")).unwrap();
        p.abort_txn().await.unwrap();
        assert_eq!(broker.records("t", 0).len(), 1);
    }

    #[test]
    fn test_late_mark_keeps_committed_offset() {
        let broker = MemoryBroker::new();
        let at = |offset: i64| ConsumerMessage {
            topic: "t".to_string(),
            partition: 0,
            offset,
            key: Bytes::new(),
            value: Bytes::new(),
            timestamp: SystemTime::now(),
        };

        broker.shared.mark("g", &at(4));
        broker.shared.mark("g", &at(1));
        assert_eq!(broker.committed_offset("g", "t", 0), Some(5));
    }

    #[tokio::test]
    async fn test_send_outside_transaction_is_rejected() {
        let broker = MemoryBroker::new();
        let mut p = broker.new_producer(&settings(Some("tx-0"))).await.unwrap();
        assert!(matches!(p.send(msg("a")), Err(TransportError::Enqueue { .. })));
    }

    #[tokio::test]
    async fn test_commit_fault_leaves_error_flags() {
        let broker = MemoryBroker::new();
        let mut p = broker.new_producer(&settings(Some("tx-0"))).await.unwrap();
        broker.faults().fail_commit(crate::transport::TxnStatus::ABORTABLE_ERROR);

        p.begin_txn().await.unwrap();
        p.send(msg("a")).unwrap();
        assert!(p.commit_txn().await.is_err());
        let status = p.txn_status();
        assert!(status.is_in_error() && status.is_abortable());
    }

    #[tokio::test]
    async fn test_round_robin_spreads_over_partitions() {
        let broker = MemoryBroker::with_partitions(2);
        for v in ["a", "b", "c", "d"] {
            broker.append(msg(v));
        }
        assert_eq!(broker.records("t", 0).len(), 2);
        assert_eq!(broker.records("t", 1).len(), 2);
        assert_eq!(broker.records("t", 1)[1].offset, 1);
    }

    #[tokio::test]
    async fn test_empty_broker_list_fails_connect() {
        let broker = MemoryBroker::new();
        let mut s = settings(None);
        s.brokers.clear();
        assert!(matches!(
            broker.new_producer(&s).await,
            Err(TransportError::Connect { .. })
        ));
    }
}
