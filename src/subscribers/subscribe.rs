//! # Subscriber trait
//!
//! `Subscribe` is the extension point for observing runtime events (metrics,
//! audit, alerting). Each subscriber gets its own bounded queue and worker inside
//! the [`SubscriberSet`](crate::SubscriberSet), so a slow subscriber never
//! delays producers, claim loops or other subscribers.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use async_trait::async_trait;
//! use txvisor::{Event, EventKind, Subscribe};
//!
//! #[derive(Default)]
//! struct AbortCounter(AtomicU64);
//!
//! #[async_trait]
//! impl Subscribe for AbortCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::TxnAborted {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!     fn name(&self) -> &'static str { "abort-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Contract for event subscribers.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event. Called sequentially, in queue order.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue capacity; events beyond it are dropped for this subscriber.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
