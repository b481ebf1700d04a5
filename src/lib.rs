//! # txvisor
//!
//! **txvisor** is a transactional publish/subscribe layer over a partitioned,
//! log-style message broker.
//!
//! It provides two building blocks:
//! - a **producer pool** that sends every message in its own transaction and
//!   recovers from failed commits with bounded retry/abort logic;
//! - a **consumer group runner** that rejoins the group after every rebalance,
//!   signals readiness once the first session is set up, and runs one claim
//!   loop per assigned partition.
//!
//! The broker itself is reached through the [`Transport`] traits; the in-process
//! [`MemoryBroker`] implements them for tests and demos.
//!
//! ## Architecture
//! ### Outbound
//! ```text
//!   caller ──► ProducerPool::send(msg)
//!                 │
//!                 ├─► borrow() ─────────► idle handle, or Transport::new_producer
//!                 │                        (txn id "<base>-<n>", bounded backoff)
//!                 │
//!                 ├─► TransactionExecutor::send(handle, msg)
//!                 │      begin_txn ─► send ─► commit_txn
//!                 │                             └─ err ─► recover:
//!                 │                                       FATAL     ─► ProduceError::Fatal
//!                 │                                       ABORTABLE ─► abort ─► Delivery::Aborted
//!                 │                                       otherwise ─► commit again (≤ 3)
//!                 │
//!                 └─► release(handle) ───► Idle and clean ─► back to the pool
//!                                          otherwise       ─► close
//! ```
//!
//! ### Inbound
//! ```text
//!   ConsumerGroup::subscribe(topics)
//!        │ spawn
//!        ▼
//!   supervisor loop ──► GroupClient::consume(token, topics, ConsumerSession)   (one generation)
//!        ▲                   ├─► setup         ─► fire readiness gate ─► subscribe() returns
//!        │                   ├─► consume_claim ─► handle ─► mark        (per partition)
//!        │                   └─► cleanup
//!        └── rebalance: new session, new gate
//!
//!   ConsumerGroup::close() ─► keep-running = false ─► GroupClient::close ─► join loop
//! ```
//!
//! ### Events
//! ```text
//!   ProducerPool / TransactionExecutor / ConsumerSession / ConsumerGroup
//!        └──► Bus ──► listener (Client) ──► SubscriberSet ──► worker per Subscribe
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                                  |
//! |-------------------|--------------------------------------------------------------|-----------------------------------------------------|
//! | **Producing**     | Pooled transactional handles, per-message transactions.      | [`ProducerPool`], [`TransactionExecutor`], [`Delivery`] |
//! | **Publishing**    | Single-topic publisher front.                                | [`Publish`], [`TopicPublisher`]                     |
//! | **Consuming**     | Rebalance-safe group runner, readiness gate, claim loops.    | [`ConsumerGroup`], [`ConsumerSession`], [`MessageHandler`] |
//! | **Policies**      | Construction backoff, handler retry and failure handling.    | [`BackoffPolicy`], [`FailurePolicy`], [`Exhausted`] |
//! | **Transport**     | Broker capabilities the crate depends on.                    | [`Transport`], [`ProducerSession`], [`GroupClient`] |
//! | **Subscriber API**| Observe runtime events (logging, metrics, alerts).           | [`Subscribe`], [`Event`], [`EventKind`]             |
//! | **Errors**        | Typed terminal outcomes.                                     | [`ProduceError`], [`ConsumerError`], [`PoolError`]  |
//! | **Configuration** | Broker list, producer and consumer settings.                 | [`Config`], [`ProducerConfig`], [`ConsumerConfig`]  |
//!
//! ## Optional features
//! - `logging`: exports the built-in [`LogWriter`] subscriber (writes events through `tracing`).
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use txvisor::{Client, Config, ConsumerMessage, HandlerError, HandlerFn, InitialOffset, MemoryBroker, Publish};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = Config::default();
//!     cfg.consumer.group_id = "billing".into();
//!     cfg.consumer.initial_offset = InitialOffset::Oldest;
//!
//!     let client = Client::builder(MemoryBroker::new()).with_config(cfg).build();
//!
//!     let group = client
//!         .consumer_group(HandlerFn::arc(|msg: ConsumerMessage| async move {
//!             println!("got {:?}", msg.value);
//!             Ok::<_, HandlerError>(())
//!         }))
//!         .await?;
//!     group.subscribe(["orders"]).await?;
//!
//!     let orders = client.publisher("orders");
//!     let delivery = orders.publish(Bytes::from("id-1"), Bytes::from("paid")).await?;
//!     assert!(delivery.is_committed());
//!
//!     group.close().await?;
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```
mod config;
mod consumer;
mod core;
mod error;
mod events;
mod policies;
mod producer;
mod subscribers;
pub mod transport;

// ---- Public re-exports ----

pub use crate::core::{Client, ClientBuilder};
pub use config::{Acks, Config, ConsumerConfig, InitialOffset, Partitioner, ProducerConfig};
pub use consumer::{
    ConsumerGroup, ConsumerSession, HandlerFn, MessageHandler, ReadyGate, ReadyWaiter, ready_gate,
};
pub use error::{ConsumerError, HandlerError, PoolError, ProduceError, TransportError};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, Exhausted, FailurePolicy, JitterPolicy};
pub use producer::{
    Delivery, ProducerHandle, ProducerPool, Publish, TopicPublisher, TransactionExecutor, TxnState,
};
pub use subscribers::{Subscribe, SubscriberSet};
pub use transport::memory::MemoryBroker;
pub use transport::{
    Claim, ConsumerMessage, GroupClient, GroupHandler, GroupSession, Message, ProducerSession,
    ProducerSettings, Transport, TxnStatus,
};

// Optional: expose the built-in tracing subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
