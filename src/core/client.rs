//! # Client: entry point wiring transport, configuration and events.
//!
//! ```text
//!            ┌──────────────────────── Client ────────────────────────┐
//!            │  Config   Bus ──► listener ──► SubscriberSet ──► subs  │
//!            └───┬──────────────┬──────────────────┬──────────────────┘
//!                ▼              ▼                  ▼
//!          ProducerPool   TopicPublisher     ConsumerGroup
//!                └──────────────┴──────────────────┴──► Transport
//! ```
//!
//! ## Example
//! ```rust
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use bytes::Bytes;
//! use txvisor::{Client, Config, MemoryBroker, Publish};
//!
//! let client = Client::builder(MemoryBroker::new())
//!     .with_config(Config::default())
//!     .build();
//!
//! let orders = client.publisher("orders");
//! orders.publish(Bytes::from("k"), Bytes::from("v")).await?;
//!
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ConsumerConfig, ProducerConfig};
use crate::consumer::{ConsumerGroup, MessageHandler};
use crate::core::ClientBuilder;
use crate::error::ConsumerError;
use crate::events::Bus;
use crate::policies::Exhausted;
use crate::producer::{ProducerPool, TopicPublisher};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::transport::Transport;

/// Shared entry point. Creates pools, publishers and consumer groups.
pub struct Client {
    transport: Arc<dyn Transport>,
    cfg: Config,
    bus: Bus,
    default_pool: OnceLock<Arc<ProducerPool>>,
    pools: Mutex<Vec<Arc<ProducerPool>>>,
    stop: CancellationToken,
    listener: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    pub fn builder<T: Transport>(transport: T) -> ClientBuilder {
        ClientBuilder::new(Arc::new(transport))
    }

    pub(crate) fn new_internal(
        transport: Arc<dyn Transport>,
        cfg: Config,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let stop = CancellationToken::new();
        let set = SubscriberSet::new(subscribers, bus.clone());
        let listener = subscriber_listener(&bus, set, stop.clone());

        Self {
            transport,
            cfg,
            bus,
            default_pool: OnceLock::new(),
            pools: Mutex::new(Vec::new()),
            stop,
            listener: tokio::sync::Mutex::new(Some(listener)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// The event bus every component created by this client publishes on.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// A new pool using the client's producer configuration.
    pub fn producer_pool(&self) -> Arc<ProducerPool> {
        self.producer_pool_with(self.cfg.producer.clone())
    }

    /// A new pool with its own producer configuration.
    pub fn producer_pool_with(&self, cfg: ProducerConfig) -> Arc<ProducerPool> {
        let pool = Arc::new(ProducerPool::new(
            Arc::clone(&self.transport),
            self.cfg.brokers.clone(),
            cfg,
            self.bus.clone(),
        ));
        self.pools
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(Arc::clone(&pool));
        pool
    }

    /// The pool shared by publishers and dead-letter routing, created on first use.
    pub fn shared_pool(&self) -> Arc<ProducerPool> {
        Arc::clone(self.default_pool.get_or_init(|| self.producer_pool()))
    }

    /// A publisher for `topic` backed by the shared pool.
    pub fn publisher(&self, topic: impl Into<String>) -> TopicPublisher {
        TopicPublisher::new(self.shared_pool(), topic)
    }

    /// A consumer group using the client's consumer configuration.
    pub async fn consumer_group(
        &self,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<ConsumerGroup, ConsumerError> {
        self.consumer_group_with(self.cfg.consumer.clone(), handler)
            .await
    }

    /// A consumer group with its own configuration.
    ///
    /// Groups whose failure policy dead-letters get the shared pool attached.
    pub async fn consumer_group_with(
        &self,
        cfg: ConsumerConfig,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<ConsumerGroup, ConsumerError> {
        let dead_letters = matches!(cfg.on_failure.then, Exhausted::DeadLetter { .. });
        let group = ConsumerGroup::new(
            Arc::clone(&self.transport),
            &self.cfg.brokers,
            cfg,
            handler,
            self.bus.clone(),
        )
        .await?;
        Ok(if dead_letters {
            group.with_dead_letter(self.shared_pool())
        } else {
            group
        })
    }

    /// Clears every pool created by this client and drains subscriber queues.
    ///
    /// Consumer groups are closed by their owners.
    pub async fn shutdown(&self) {
        let pools: Vec<Arc<ProducerPool>> = self
            .pools
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        for pool in pools {
            pool.clear().await;
        }

        self.stop.cancel();
        if let Some(listener) = self.listener.lock().await.take() {
            let _ = listener.await;
        }
    }
}

/// Forwards bus events to the subscriber set until `stop`, then drains both.
fn subscriber_listener(bus: &Bus, set: SubscriberSet, stop: CancellationToken) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                ev = rx.recv() => match ev {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        while let Ok(ev) = rx.try_recv() {
            set.emit(&ev);
        }
        set.shutdown().await;
    })
}
