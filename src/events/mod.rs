//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Publishers
//! - `ProducerPool`: handle construction, backoff, discard, clear
//! - `TransactionExecutor`: begin/commit/abort outcomes
//! - `ConsumerSession`: setup/cleanup, claim start/stop, handler failures
//! - `ConsumerGroup`: transport failures, close
//! - `SubscriberSet` workers: overflow and panics

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
