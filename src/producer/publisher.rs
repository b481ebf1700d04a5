//! # Single-topic publishing.
//!
//! [`Publish`] is the narrow interface application code depends on;
//! [`TopicPublisher`] implements it on top of a shared [`ProducerPool`].
//!
//! ## Example
//! ```rust
//! # async fn demo() -> Result<(), txvisor::ProduceError> {
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use txvisor::{Bus, MemoryBroker, ProducerConfig, ProducerPool, Publish, TopicPublisher};
//!
//! let pool = Arc::new(ProducerPool::new(
//!     Arc::new(MemoryBroker::new()),
//!     vec!["127.0.0.1:9092".into()],
//!     ProducerConfig::default(),
//!     Bus::default(),
//! ));
//! let orders = TopicPublisher::new(pool, "orders");
//! let delivery = orders.publish(Bytes::from("id-1"), Bytes::from("{}")).await?;
//! assert!(delivery.is_committed());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ProduceError;
use crate::producer::{Delivery, ProducerPool};
use crate::transport::Message;

/// Publishes key/value records to a destination fixed at construction.
#[async_trait]
pub trait Publish: Send + Sync {
    async fn publish(&self, key: Bytes, value: Bytes) -> Result<Delivery, ProduceError>;
}

/// [`Publish`] bound to one topic.
#[derive(Clone)]
pub struct TopicPublisher {
    topic: String,
    pool: Arc<ProducerPool>,
}

impl TopicPublisher {
    pub fn new(pool: Arc<ProducerPool>, topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            pool,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn pool(&self) -> &Arc<ProducerPool> {
        &self.pool
    }
}

#[async_trait]
impl Publish for TopicPublisher {
    async fn publish(&self, key: Bytes, value: Bytes) -> Result<Delivery, ProduceError> {
        self.pool
            .send(Message::new(self.topic.clone(), key, value))
            .await
    }
}
