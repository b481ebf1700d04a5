//! Commit recovery: retries, aborts and fatal states.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use txvisor::{
    BackoffPolicy, Bus, Client, Config, Delivery, Event, EventKind, MemoryBroker, Message,
    ProduceError, ProducerConfig, ProducerPool, Publish, Subscribe, TxnStatus,
};

fn pool(broker: &MemoryBroker, cfg: ProducerConfig) -> ProducerPool {
    ProducerPool::new(
        Arc::new(broker.clone()),
        vec!["127.0.0.1:9092".to_string()],
        cfg,
        Bus::default(),
    )
}

fn config() -> ProducerConfig {
    ProducerConfig {
        factory_backoff: BackoffPolicy::constant(Duration::from_millis(1)),
        ..ProducerConfig::default()
    }
}

fn payment() -> Message {
    Message::new("payments", Bytes::from_static(b"p-1"), Bytes::from_static(b"100"))
}

#[tokio::test]
async fn test_single_commit_failure_commits_twice() {
    let broker = MemoryBroker::new();
    let pool = pool(&broker, config());

    broker.faults().fail_commit(TxnStatus::READY);
    assert_eq!(pool.send(payment()).await.unwrap(), Delivery::Committed);

    let stats = broker.stats();
    assert_eq!(stats.commits, 2);
    assert_eq!(stats.aborts, 0);
    assert_eq!(broker.records("payments", 0).len(), 1);
    assert_eq!(pool.len().await, 1);
}

#[tokio::test]
async fn test_fatal_flag_skips_abort() {
    let broker = MemoryBroker::new();
    let pool = pool(&broker, config());

    broker.faults().fail_commit(TxnStatus::FATAL_ERROR);
    let err = pool.send(payment()).await.unwrap_err();

    assert!(err.is_fatal());
    assert!(err.to_string().contains("need to recreate it"));
    assert_eq!(broker.stats().aborts, 0);
    assert!(broker.records("payments", 0).is_empty());
}

#[tokio::test]
async fn test_abort_failures_do_not_consume_commit_budget() {
    let broker = MemoryBroker::new();
    let pool = pool(&broker, config());

    broker.faults().fail_commit(TxnStatus::ABORTABLE_ERROR);
    broker.faults().fail_abort(2);
    let out = pool.send(payment()).await.unwrap();

    assert!(matches!(out, Delivery::Aborted { .. }));
    let stats = broker.stats();
    assert_eq!(stats.aborts, 3);
    assert_eq!(stats.commits, 1);
    assert!(broker.records("payments", 0).is_empty());
    // a clean abort leaves the handle reusable
    assert_eq!(pool.len().await, 1);
}

#[tokio::test]
async fn test_commit_budget_is_three_attempts() {
    let broker = MemoryBroker::new();
    let pool = pool(&broker, config());

    for _ in 0..4 {
        broker.faults().fail_commit(TxnStatus::READY);
    }
    let err = pool.send(payment()).await.unwrap_err();

    match err {
        ProduceError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(broker.stats().commits, 4);
    assert_eq!(pool.len().await, 0);
    assert_eq!(broker.stats().producers_closed, 1);
}

#[tokio::test]
async fn test_abort_failure_cap_ends_recovery() {
    let broker = MemoryBroker::new();
    let mut cfg = config();
    cfg.max_abort_failures = 2;
    let pool = pool(&broker, cfg);

    broker.faults().fail_commit(TxnStatus::ABORTABLE_ERROR);
    broker.faults().fail_abort(5);
    let err = pool.send(payment()).await.unwrap_err();

    assert_eq!(err.as_label(), "produce_retries_exhausted");
    assert_eq!(broker.stats().aborts, 2);
    assert_eq!(pool.len().await, 0);
}

#[tokio::test]
async fn test_begin_failure_is_reported_and_handle_kept() {
    let broker = MemoryBroker::new();
    let pool = pool(&broker, config());

    broker.faults().fail_begin(1);
    let err = pool.send(payment()).await.unwrap_err();
    assert!(matches!(err, ProduceError::Begin { .. }));
    assert_eq!(pool.len().await, 1);

    pool.send(payment()).await.unwrap();
    assert_eq!(broker.stats().connects, 1);
}

#[derive(Default)]
struct Recorder(Mutex<Vec<EventKind>>);

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, ev: &Event) {
        self.0.lock().unwrap().push(ev.kind);
    }
}

#[tokio::test]
async fn test_recovery_is_visible_to_subscribers() {
    let broker = MemoryBroker::new();
    let recorder = Arc::new(Recorder::default());
    let client = Client::builder(broker.clone())
        .with_config(Config::default())
        .with_subscribers(vec![recorder.clone() as Arc<dyn Subscribe>])
        .build();

    broker.faults().fail_commit(TxnStatus::ABORTABLE_ERROR);
    let out = client
        .publisher("payments")
        .publish(Bytes::from_static(b"k"), Bytes::from_static(b"v"))
        .await
        .unwrap();
    assert!(out.is_aborted());
    client.shutdown().await;

    let seen = recorder.0.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            EventKind::HandleCreated,
            EventKind::TxnCommitFailed,
            EventKind::TxnAborted,
            EventKind::PoolCleared,
        ]
    );
}
