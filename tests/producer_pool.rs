//! Producer pool tests: handle lifecycle and transactional id allocation.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use txvisor::{
    BackoffPolicy, Bus, Delivery, MemoryBroker, Message, ProduceError, ProducerConfig,
    ProducerPool, TxnState, TxnStatus,
};

fn fast_config() -> ProducerConfig {
    ProducerConfig {
        factory_backoff: BackoffPolicy::constant(Duration::from_millis(1)),
        ..ProducerConfig::default()
    }
}

fn pool(broker: &MemoryBroker, cfg: ProducerConfig) -> Arc<ProducerPool> {
    Arc::new(ProducerPool::new(
        Arc::new(broker.clone()),
        vec!["127.0.0.1:9092".to_string()],
        cfg,
        Bus::default(),
    ))
}

fn order(n: u32) -> Message {
    Message::new(
        "orders",
        Bytes::from(format!("key-{n}")),
        Bytes::from(format!("value-{n}")),
    )
}

#[tokio::test]
async fn test_concurrent_borrows_get_unique_suffixes() {
    let broker = MemoryBroker::new();
    let pool = pool(&broker, fast_config());

    let (a, b, c) = tokio::join!(pool.borrow(), pool.borrow(), pool.borrow());
    let handles = vec![a.unwrap(), b.unwrap(), c.unwrap()];

    let stats = broker.stats();
    assert_eq!(
        stats.transactional_ids,
        vec!["txn_producer-0", "txn_producer-1", "txn_producer-2"]
    );
    assert_eq!(stats.connects, 3);
    for h in &handles {
        let id = h.transactional_id().unwrap();
        assert!(stats.transactional_ids.iter().any(|t| t == id));
    }

    for h in handles {
        pool.release(h).await;
    }
    assert_eq!(pool.len().await, 3);
}

#[tokio::test]
async fn test_successful_send_leaves_handle_reusable() {
    let broker = MemoryBroker::new();
    let pool = pool(&broker, fast_config());

    assert_eq!(pool.send(order(1)).await.unwrap(), Delivery::Committed);
    assert_eq!(pool.len().await, 1);

    let handle = pool.borrow().await.unwrap();
    assert_eq!(handle.state(), TxnState::Idle);
    assert!(handle.txn_status().is_ready());
    pool.release(handle).await;

    pool.send(order(2)).await.unwrap();
    assert_eq!(broker.stats().connects, 1);
    assert_eq!(broker.records("orders", 0).len(), 2);
}

#[tokio::test]
async fn test_fatal_handle_never_returns_to_pool() {
    let broker = MemoryBroker::new();
    let pool = pool(&broker, fast_config());

    broker.faults().fail_commit(TxnStatus::FATAL_ERROR);
    let err = pool.send(order(1)).await.unwrap_err();
    assert!(matches!(err, ProduceError::Fatal { .. }));
    assert_eq!(pool.len().await, 0);

    pool.send(order(2)).await.unwrap();
    assert_eq!(
        broker.stats().transactional_ids,
        vec!["txn_producer-0".to_string(), "txn_producer-1".to_string()]
    );
    assert_eq!(broker.stats().producers_closed, 1);
}

#[tokio::test]
async fn test_unbounded_factory_retries_until_success() {
    let broker = MemoryBroker::new();
    let mut cfg = fast_config();
    cfg.max_factory_attempts = 0;
    let pool = pool(&broker, cfg);

    broker.faults().fail_connect(7);
    let handle = pool.borrow().await.unwrap();
    assert_eq!(handle.transactional_id(), Some("txn_producer-7"));
    assert_eq!(broker.stats().connects, 8);
}

#[tokio::test]
async fn test_factory_backoff_grows_between_attempts() {
    let broker = MemoryBroker::new();
    let mut cfg = ProducerConfig::default();
    cfg.max_factory_attempts = 3;
    cfg.factory_backoff = BackoffPolicy {
        first: Duration::from_millis(20),
        max: Duration::from_millis(100),
        factor: 2.0,
        jitter: txvisor::JitterPolicy::None,
    };
    let pool = pool(&broker, cfg);

    broker.faults().fail_connect(3);
    let started = tokio::time::Instant::now();
    let err = pool.borrow().await.unwrap_err();

    // 20ms + 40ms of sleep between the three attempts
    assert!(started.elapsed() >= Duration::from_millis(60));
    assert_eq!(err.as_label(), "pool_exhausted");
}

#[tokio::test]
async fn test_empty_transactional_id_disables_transactions() {
    let broker = MemoryBroker::new();
    let mut cfg = fast_config();
    cfg.transactional_id = String::new();
    let pool = pool(&broker, cfg);

    assert_eq!(pool.send(order(1)).await.unwrap(), Delivery::Enqueued);
    let stats = broker.stats();
    assert!(stats.transactional_ids.is_empty());
    assert_eq!(stats.begins, 0);
    assert_eq!(broker.records("orders", 0).len(), 1);
}
