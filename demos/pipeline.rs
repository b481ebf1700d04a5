//! # Example: transactional pipeline over the in-memory broker
//!
//! Publishes a handful of orders (one commit failure injected), consumes them
//! with a group that dead-letters a poison message, and stops after a second
//! or on Ctrl-C.
//!
//! ```text
//! cargo run --example pipeline --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use txvisor::{
    BackoffPolicy, Client, Config, ConsumerMessage, FailurePolicy, HandlerError, HandlerFn,
    InitialOffset, LogWriter, MemoryBroker, Publish, Subscribe, TxnStatus,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let broker = MemoryBroker::with_partitions(3);

    let mut cfg = Config::default();
    cfg.consumer.group_id = "billing".into();
    cfg.consumer.initial_offset = InitialOffset::Oldest;
    cfg.consumer.on_failure = FailurePolicy::dead_letter(
        "orders.dlq",
        2,
        BackoffPolicy::constant(Duration::from_millis(50)),
    );

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let client = Client::builder(broker.clone())
        .with_config(cfg)
        .with_subscribers(subs)
        .build();

    let orders = client.publisher("orders");
    broker.faults().fail_commit(TxnStatus::READY);
    for (id, body) in [("o-1", "paid"), ("o-2", "poison"), ("o-3", "paid"), ("o-4", "refunded")] {
        let delivery = orders.publish(Bytes::from(id), Bytes::from(body)).await?;
        println!("[publish] {id} -> {delivery:?}");
    }

    let handler = HandlerFn::arc(|msg: ConsumerMessage| async move {
        if msg.value == "poison" {
            return Err(HandlerError::fail("cannot parse order"));
        }
        println!(
            "[consume] p{} @{} {}",
            msg.partition,
            msg.offset,
            String::from_utf8_lossy(&msg.value)
        );
        Ok(())
    });

    let token = CancellationToken::new();
    let group = client.consumer_group(handler).await?.with_token(token.clone());

    let stop = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        stop.cancel();
    });
    group.serve(["orders"]).await?;

    println!("[dead-letter] {} record(s)", broker.records("orders.dlq", 0).len());
    client.shutdown().await;
    Ok(())
}
