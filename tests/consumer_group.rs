//! Consumer group runner: readiness, rebalances, close and failure policies.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use txvisor::{
    BackoffPolicy, Bus, Client, Config, ConsumerConfig, ConsumerError, ConsumerGroup,
    ConsumerMessage, EventKind, FailurePolicy, HandlerError, HandlerFn, InitialOffset, JitterPolicy,
    MemoryBroker, Message, MessageHandler, TransportError,
};

const WAIT: Duration = Duration::from_secs(5);

fn brokers() -> Vec<String> {
    vec!["127.0.0.1:9092".to_string()]
}

fn config(group: &str, on_failure: FailurePolicy) -> ConsumerConfig {
    ConsumerConfig {
        initial_offset: InitialOffset::Oldest,
        on_failure,
        ..ConsumerConfig::for_group(group)
    }
}

async fn group(broker: &MemoryBroker, cfg: ConsumerConfig, handler: Arc<dyn MessageHandler>) -> ConsumerGroup {
    ConsumerGroup::new(Arc::new(broker.clone()), &brokers(), cfg, handler, Bus::default())
        .await
        .unwrap()
}

/// Handler forwarding every value to a channel.
fn forwarding() -> (Arc<dyn MessageHandler>, mpsc::UnboundedReceiver<Bytes>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = HandlerFn::arc(move |msg: ConsumerMessage| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(msg.value);
            Ok::<_, HandlerError>(())
        }
    });
    (handler, rx)
}

/// Handler failing on values equal to `poison`.
fn failing_on(poison: &'static str) -> Arc<dyn MessageHandler> {
    HandlerFn::arc(move |msg: ConsumerMessage| async move {
        if msg.value == poison.as_bytes() {
            return Err(HandlerError::fail("cannot process"));
        }
        Ok(())
    })
}

fn record(value: &'static str) -> Message {
    Message::new("orders", Bytes::from_static(b"k"), Bytes::from_static(value.as_bytes()))
}

async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_subscribe_blocks_until_setup_fires() {
    let broker = MemoryBroker::new();
    broker.set_setup_delay(Duration::from_millis(150));
    let (handler, _rx) = forwarding();
    let g = group(&broker, ConsumerConfig::for_group("billing"), handler).await;

    let started = tokio::time::Instant::now();
    g.subscribe(["orders"]).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(broker.stats().consumes, 1);

    g.close().await.unwrap();
}

#[tokio::test]
async fn test_subscribe_returns_transport_error_instead_of_hanging() {
    let broker = MemoryBroker::new();
    broker.faults().fail_consume(1);
    let (handler, _rx) = forwarding();
    let g = group(&broker, ConsumerConfig::for_group("billing"), handler).await;
    let mut errors = g.errors().unwrap();
    assert!(g.errors().is_none());

    let err = tokio::time::timeout(WAIT, g.subscribe(["orders"]))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, ConsumerError::Transport(TransportError::Group { .. })));
    assert_eq!(errors.recv().await.unwrap(), err);
}

#[tokio::test]
async fn test_consumption_resumes_after_rebalance() {
    let broker = MemoryBroker::new();
    let (handler, mut rx) = forwarding();
    let g = group(&broker, config("billing", FailurePolicy::default()), handler).await;
    g.subscribe(["orders"]).await.unwrap();

    broker.append(record("first"));
    let got = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(got, Bytes::from_static(b"first"));

    let before = broker.generation("billing");
    broker.rebalance("billing");
    broker.append(record("second"));
    let got = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(got, Bytes::from_static(b"second"));

    assert!(broker.generation("billing") > before);
    assert!(broker.stats().consumes >= 2);
    eventually(|| broker.committed_offset("billing", "orders", 0) == Some(2)).await;
    g.close().await.unwrap();
}

#[tokio::test]
async fn test_close_is_idempotent_and_final() {
    let broker = MemoryBroker::new();
    let (handler, _rx) = forwarding();
    let g = group(&broker, ConsumerConfig::for_group("billing"), handler).await;
    g.subscribe(["orders"]).await.unwrap();

    assert!(matches!(
        g.subscribe(["orders"]).await,
        Err(ConsumerError::AlreadySubscribed)
    ));

    tokio::time::timeout(WAIT, g.close()).await.unwrap().unwrap();
    g.close().await.unwrap();
    assert!(matches!(g.subscribe(["orders"]).await, Err(ConsumerError::Closed)));
}

#[tokio::test]
async fn test_serve_returns_after_token_cancellation() {
    let broker = MemoryBroker::new();
    let (handler, _rx) = forwarding();
    let token = tokio_util::sync::CancellationToken::new();
    let g = group(&broker, ConsumerConfig::for_group("billing"), handler)
        .await
        .with_token(token.clone());

    let serve = tokio::spawn(async move { g.serve(["orders"]).await });
    eventually(|| broker.stats().consumes >= 1).await;
    token.cancel();

    let res = tokio::time::timeout(WAIT, serve).await.unwrap().unwrap();
    assert!(res.is_ok(), "{res:?}");
}

#[tokio::test]
async fn test_skip_marks_failing_message() {
    let broker = MemoryBroker::new();
    let policy = FailurePolicy {
        retries: 1,
        backoff: BackoffPolicy::constant(Duration::from_millis(1)),
        then: txvisor::Exhausted::Skip,
    };
    let g = group(&broker, config("billing", policy), failing_on("bad")).await;
    g.subscribe(["orders"]).await.unwrap();

    broker.append(record("bad"));
    broker.append(record("good"));
    eventually(|| broker.committed_offset("billing", "orders", 0) == Some(2)).await;
    assert_eq!(
        broker.marks("billing"),
        vec![("orders".to_string(), 0, 0), ("orders".to_string(), 0, 1)]
    );
    g.close().await.unwrap();
}

#[tokio::test]
async fn test_halt_leaves_message_for_redelivery() {
    let broker = MemoryBroker::new();
    let policy = FailurePolicy::halt_after(0, BackoffPolicy::constant(Duration::from_millis(1)));
    let g = group(&broker, config("billing", policy), failing_on("bad")).await;
    let mut errors = g.errors().unwrap();

    broker.append(record("ok"));
    broker.append(record("bad"));
    g.subscribe(["orders"]).await.unwrap();

    let err = tokio::time::timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert!(matches!(err, ConsumerError::Halted { offset: 1, .. }));
    g.close().await.unwrap();

    // only the message before the poison one is marked
    assert_eq!(broker.committed_offset("billing", "orders", 0), Some(1));
}

#[tokio::test]
async fn test_halted_message_backs_off_between_generations() {
    let broker = MemoryBroker::new();
    let backoff = BackoffPolicy {
        first: Duration::from_millis(50),
        max: Duration::from_secs(1),
        factor: 2.0,
        jitter: JitterPolicy::None,
    };
    let cfg = ConsumerConfig {
        error_capacity: 2,
        ..config("billing", FailurePolicy::halt_after(0, backoff))
    };
    let bus = Bus::default();
    let mut events = bus.subscribe();
    let g = ConsumerGroup::new(Arc::new(broker.clone()), &brokers(), cfg, failing_on("bad"), bus)
        .await
        .unwrap();

    broker.append(record("bad"));
    g.subscribe(["orders"]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // rejoins after 50ms, 100ms, 200ms
    let consumes = broker.stats().consumes;
    assert!((2..=5).contains(&consumes), "consumes = {consumes}");

    let first = tokio::time::timeout(WAIT, async {
        loop {
            let ev = events.recv().await.unwrap();
            if ev.kind == EventKind::RejoinBackoff {
                return ev;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(first.attempt, Some(1));
    assert_eq!(first.delay_ms, Some(50));

    let mut errors = g.errors().unwrap();
    let mut queued = 0;
    while errors.try_recv().is_ok() {
        queued += 1;
    }
    assert!((1..=2).contains(&queued), "queued = {queued}");

    tokio::time::timeout(WAIT, g.close()).await.unwrap().unwrap();
    assert_eq!(broker.committed_offset("billing", "orders", 0), None);
}

#[tokio::test]
async fn test_dead_letter_routes_failing_message() {
    let broker = MemoryBroker::new();
    let mut cfg = Config::default();
    cfg.consumer = config(
        "billing",
        FailurePolicy::dead_letter("orders.dlq", 0, BackoffPolicy::default()),
    );
    let client = Client::builder(broker.clone()).with_config(cfg).build();
    let g = client.consumer_group(failing_on("bad")).await.unwrap();
    g.subscribe(["orders"]).await.unwrap();

    broker.append(record("bad"));
    eventually(|| broker.committed_offset("billing", "orders", 0) == Some(1)).await;

    let dlq = broker.records("orders.dlq", 0);
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].value, Bytes::from_static(b"bad"));

    g.close().await.unwrap();
    client.shutdown().await;
}

#[tokio::test]
async fn test_second_member_triggers_rebalance_and_splits_partitions() {
    let broker = MemoryBroker::with_partitions(2);
    let seen: Arc<Mutex<Vec<i32>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let handler: Arc<dyn MessageHandler> = HandlerFn::arc(move |msg: ConsumerMessage| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(msg.partition);
            Ok::<_, HandlerError>(())
        }
    });

    let a = group(&broker, config("billing", FailurePolicy::default()), Arc::clone(&handler)).await;
    a.subscribe(["orders"]).await.unwrap();
    let first = broker.generation("billing");

    let b = group(&broker, config("billing", FailurePolicy::default()), handler).await;
    b.subscribe(["orders"]).await.unwrap();
    assert!(broker.generation("billing") > first);

    for v in ["a", "b", "c", "d"] {
        broker.append(record(v));
    }
    eventually(|| seen.lock().unwrap().len() == 4).await;
    let mut partitions = seen.lock().unwrap().clone();
    partitions.sort();
    assert_eq!(partitions, vec![0, 0, 1, 1]);

    a.close().await.unwrap();
    b.close().await.unwrap();
}
