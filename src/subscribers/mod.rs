//! # Event subscribers.
//!
//! ```text
//!   ProducerPool / TransactionExecutor / ConsumerSession / ConsumerGroup
//!        │ publish(Event)
//!        ▼
//!       Bus ──► listener (in Client) ──► SubscriberSet
//!                                          ├──► worker ──► LogWriter::on_event
//!                                          ├──► worker ──► Metrics::on_event
//!                                          └──► worker ──► Custom::on_event
//! ```
//!
//! Implement [`Subscribe`] and pass instances to
//! [`ClientBuilder::with_subscribers`](crate::ClientBuilder::with_subscribers).

mod set;
mod subscribe;

#[cfg(feature = "logging")]
mod log;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
