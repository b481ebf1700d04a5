//! # Consumer side.
//!
//! - [`ConsumerGroup`] owns the group client and the supervisor loop that
//!   rejoins the group after every rebalance until closed.
//! - [`ConsumerSession`] is the per-generation [`GroupHandler`](crate::GroupHandler):
//!   it fires the readiness gate in `setup` and runs one claim loop per partition.
//! - [`MessageHandler`] is the user callback; [`HandlerFn`] wraps a closure.

mod gate;
mod group;
mod handler;
mod session;

pub use gate::{ReadyGate, ReadyWaiter, ready_gate};
pub use group::ConsumerGroup;
pub use handler::{HandlerFn, MessageHandler};
pub use session::ConsumerSession;
