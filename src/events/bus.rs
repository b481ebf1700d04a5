//! # Event bus.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`]. The pool, the transaction executor,
//! the consumer sessions and the group runner publish; the client's listener
//! forwards everything to the [`SubscriberSet`](crate::SubscriberSet).
//!
//! ```text
//! ProducerPool ────────┐
//! TransactionExecutor ─┼──► Bus ──► listener (Client) ──► SubscriberSet
//! ConsumerSession ─────┤
//! ConsumerGroup ───────┘
//! ```
//!
//! ## Rules
//! - `publish()` never blocks and never fails; without receivers the event is dropped.
//! - The ring buffer is shared; a lagging receiver skips the oldest events (`Lagged`).

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus holding at most `capacity` undelivered events (min 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes to every current receiver.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// New receiver observing events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_receivers_see_events_in_publish_order() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::HandleCreated).with_attempt(1));
        bus.publish(Event::new(EventKind::TxnCommitted).with_attempt(2));

        let a = rx.recv().await.unwrap();
        let b = rx.recv().await.unwrap();
        assert_eq!(a.kind, EventKind::HandleCreated);
        assert_eq!(b.kind, EventKind::TxnCommitted);
        assert!(a.seq < b.seq);
    }

    #[test]
    fn test_publish_without_receivers_is_silent() {
        Bus::new(1).publish(Event::new(EventKind::PoolCleared));
    }
}
