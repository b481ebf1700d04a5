//! # Producer side.
//!
//! - [`ProducerPool`] lends [`ProducerHandle`]s and decides on release whether
//!   they are recycled or closed.
//! - [`TransactionExecutor`] runs the per-message transaction protocol and its
//!   bounded commit/abort recovery.
//! - [`TopicPublisher`] is a single-topic [`Publish`] front for a pool.
//!
//! ```text
//! caller ─► ProducerPool::send(msg)
//!              ├─► borrow()                        (idle handle or new session)
//!              ├─► TransactionExecutor::send()     (begin ─► enqueue ─► commit / recover)
//!              └─► release()                       (recycle or close)
//! ```

mod executor;
mod handle;
mod pool;
mod publisher;

pub use executor::{Delivery, TransactionExecutor};
pub use handle::{ProducerHandle, TxnState};
pub use pool::ProducerPool;
pub use publisher::{Publish, TopicPublisher};
